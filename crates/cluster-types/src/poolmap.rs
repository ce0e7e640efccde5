//! Minimal view of the pool-map collaborator's topology snapshot.
//!
//! The real pool-map representation and its Raft-backed persistence are
//! out of scope (§1); this module is just enough of an interface for the
//! rebuild coordinator to read target states and versions from it, and to
//! request the transitions it is allowed to request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::member::Rank;
use crate::rebuild::PoolId;

/// A target's state in the pool map, as observed by the rebuild
/// coordinator. `DownOut`/`UpIn` are terminal states reached only through
/// a successful finalize (§4.2.3 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetState {
    Up,
    New,
    Down,
    Drain,
    DownOut,
    UpIn,
}

impl TargetState {
    /// The rebuild op a target in this state should generate, per §4.4,
    /// or `None` if the state requires no rebuild action.
    pub fn rebuild_op(self) -> Option<crate::rebuild::RebuildOp> {
        use crate::rebuild::RebuildOp;
        match self {
            TargetState::Down => Some(RebuildOp::Fail),
            TargetState::Drain => Some(RebuildOp::Drain),
            TargetState::Up => Some(RebuildOp::Reint),
            TargetState::New => Some(RebuildOp::Extend),
            TargetState::DownOut | TargetState::UpIn => None,
        }
    }
}

/// A read-only snapshot of one pool's topology as seen by the rebuild
/// coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMapSnapshot {
    pub pool_id: PoolId,
    pub version: u64,
    /// Per-target state and the map version at which that state was
    /// entered (the "failure sequence" for `Down`/`Drain`, the
    /// "in-version" for `Up`/`New`, per §4.4).
    pub targets: BTreeMap<Rank, (TargetState, u64)>,
    /// Whether self-healing is enabled for this pool; when `false`,
    /// `Down`/`Drain` regeneration is skipped (§4.4).
    pub self_heal_enabled: bool,
}

impl PoolMapSnapshot {
    /// All ranks whose current state is `Down` or `Drain` (used by the
    /// status-check loop to pre-mark failed ranks as done, §4.2.3 step 6).
    pub fn failed_ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.targets
            .iter()
            .filter(|(_, (state, _))| matches!(state, TargetState::Down | TargetState::Drain))
            .map(|(&rank, _)| rank)
    }
}

/// Outcome the leader requests from the pool-map service at finalize
/// (§4.2.3 step 7). The pool-map service (out of scope) is the only thing
/// that actually performs the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetTransitionRequest {
    DownToDownOut,
    UpOrNewToUpIn,
}
