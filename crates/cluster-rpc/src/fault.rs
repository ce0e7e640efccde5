//! A simple `FaultInjector` implementation for tests: arms a single rank
//! to drop probes after a delay computed from its observed one-way
//! latency (§4.1.6, §6.4).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use cluster_types::Rank;

use crate::swim_transport::{parse_fault_args, FaultInjector};

#[derive(Debug, Default)]
struct Armed {
    delay: Duration,
}

/// Test/demo fault injector driven by `SWIM_FAIL_DROP_RPC`-style
/// arguments. Feature-gated at the call site rather than via a process
/// global, per §9's design note.
#[derive(Debug, Default)]
pub struct DropRpcFaultInjector {
    armed: Mutex<HashMap<Rank, Armed>>,
}

impl DropRpcFaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the injector from a `"rank=<id>,delay=<sec>"` argument string.
    pub fn arm_from_args(&self, args: &str) -> bool {
        match parse_fault_args(args) {
            Some((rank, delay_sec)) => {
                self.armed.lock().unwrap().insert(
                    rank,
                    Armed {
                        delay: Duration::from_secs(delay_sec),
                    },
                );
                true
            }
            None => false,
        }
    }

    pub fn disarm(&self, rank: Rank) {
        self.armed.lock().unwrap().remove(&rank);
    }
}

impl FaultInjector for DropRpcFaultInjector {
    fn should_drop(&self, rank: Rank) -> Option<Duration> {
        self.armed.lock().unwrap().get(&rank).map(|a| a.delay)
    }
}
