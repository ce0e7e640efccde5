//! In-process mock transports, used by unit tests and the `cluster-cli`
//! demo commands in place of a real RPC/pool-map/IV collaborator.
//!
//! This mirrors how the teacher's consensus crate tests protocol logic
//! against an in-memory stand-in rather than real sockets: a shared
//! registry of nodes, each one reachable by rank, with per-link drop
//! control for exercising partition/outage scenarios.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cluster_types::{Hlc, HlcClock, Rank};

use crate::swim_transport::{ProbeError, SwimTransport};
use crate::swim_wire::{SwimReply, SwimRequest};

/// A shared registry of mock nodes, addressable by rank.
#[derive(Default)]
pub struct MockNetwork {
    nodes: Mutex<HashMap<Rank, Arc<MockSwimNode>>>,
    /// Links explicitly blocked for fault-injection scenarios:
    /// `(from, to)` pairs whose probes always fail.
    blocked: Mutex<std::collections::HashSet<(Rank, Rank)>>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new node and returns its transport handle.
    pub fn register(self: &Arc<Self>, rank: Rank) -> Arc<MockSwimNode> {
        let node = Arc::new(MockSwimNode {
            rank,
            clock: HlcClock::new(),
            network: Arc::clone(self),
            inbox: Mutex::new(Vec::new()),
        });
        self.nodes.lock().unwrap().insert(rank, Arc::clone(&node));
        node
    }

    /// Blocks traffic on a directed link, used to simulate a partition
    /// (§8 scenario 2).
    pub fn block(&self, from: Rank, to: Rank) {
        self.blocked.lock().unwrap().insert((from, to));
    }

    pub fn unblock(&self, from: Rank, to: Rank) {
        self.blocked.lock().unwrap().remove(&(from, to));
    }

    pub fn is_blocked(&self, from: Rank, to: Rank) -> bool {
        self.blocked.lock().unwrap().contains(&(from, to))
    }

    fn get(&self, rank: Rank) -> Option<Arc<MockSwimNode>> {
        self.nodes.lock().unwrap().get(&rank).cloned()
    }
}

/// A mock SWIM transport endpoint, always replying immediately (no
/// real network delay) unless the link is blocked.
pub struct MockSwimNode {
    rank: Rank,
    clock: HlcClock,
    network: Arc<MockNetwork>,
    /// Updates received via PING/IREQ, retained for test assertions.
    inbox: Mutex<Vec<SwimRequest>>,
}

impl MockSwimNode {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn received(&self) -> Vec<SwimRequest> {
        self.inbox.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwimTransport for MockSwimNode {
    fn self_rank(&self) -> Rank {
        self.rank
    }

    fn now_hlc(&self) -> Hlc {
        self.clock.now()
    }

    async fn ping(&self, dest: Rank, req: SwimRequest, _timeout: Duration) -> Result<SwimReply, ProbeError> {
        if self.network.is_blocked(self.rank, dest) {
            return Err(ProbeError::TimedOut);
        }
        let target = self.network.get(dest).ok_or(ProbeError::SendFailed)?;
        target.inbox.lock().unwrap().push(req.clone());
        target.clock.observe(self.clock.now());
        Ok(SwimReply::ok(Vec::new()))
    }

    async fn ireq(&self, relay: Rank, req: SwimRequest, timeout: Duration) -> Result<SwimReply, ProbeError> {
        if self.network.is_blocked(self.rank, relay) {
            return Err(ProbeError::TimedOut);
        }
        let relay_node = self.network.get(relay).ok_or(ProbeError::SendFailed)?;
        // The relay pings the real target on our behalf.
        relay_node.ping(req.swim_id, req, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_delivers_to_the_target_inbox() {
        let net = MockNetwork::new();
        let a = net.register(1);
        let b = net.register(2);

        a.ping(
            2,
            SwimRequest {
                swim_id: 2,
                updates: Vec::new(),
            },
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(b.received().len(), 1);
    }

    #[tokio::test]
    async fn blocked_link_fails_the_ping() {
        let net = MockNetwork::new();
        let a = net.register(1);
        let _b = net.register(2);
        net.block(1, 2);

        let result = a
            .ping(
                2,
                SwimRequest {
                    swim_id: 2,
                    updates: Vec::new(),
                },
                Duration::from_millis(100),
            )
            .await;
        assert!(matches!(result, Err(ProbeError::TimedOut)));
    }

    #[tokio::test]
    async fn ireq_relays_the_ping() {
        let net = MockNetwork::new();
        let a = net.register(1);
        let _relay = net.register(2);
        let target = net.register(3);

        a.ireq(
            2,
            SwimRequest {
                swim_id: 3,
                updates: Vec::new(),
            },
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(target.received().len(), 1);
    }
}
