//! Rebuild task data model: the unit the leader queues, dispatches, and
//! tracks to completion.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::member::Rank;

/// A pool identifier. Kept opaque (just a wrapped integer) since pool
/// identity, representation, and persistence are the pool-map service's
/// concern, out of scope here.
pub type PoolId = u64;

/// The operation a rebuild task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RebuildOp {
    /// A target went down; reconstruct its data elsewhere.
    Fail,
    /// A target is being drained intentionally (planned decommission).
    Drain,
    /// A previously down/drained target is rejoining.
    Reint,
    /// New capacity is being added to the pool.
    Extend,
    /// Reclaim space freed by a completed `Reint`/`Extend`.
    Reclaim,
}

/// Lifecycle status of a queued or running rebuild task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Running,
    Completed { errno: i32 },
    Aborted,
}

/// A rebuild task, owned by the leader's queue/running list.
///
/// Invariant: within one pool, tasks execute in ascending `map_version`
/// order, and only one task per pool runs at a time (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildTask {
    pub pool_id: PoolId,
    pub map_version: u64,
    pub op: RebuildOp,
    pub targets: BTreeSet<Rank>,
    /// Milliseconds since epoch at which the task-driver should wake and
    /// begin (§4.2.3 step 1).
    pub scheduled_at_ms: u64,
    pub status: TaskStatus,
}

impl RebuildTask {
    /// Creates a freshly queued task.
    pub fn new(
        pool_id: PoolId,
        map_version: u64,
        op: RebuildOp,
        targets: impl IntoIterator<Item = Rank>,
        scheduled_at_ms: u64,
    ) -> Self {
        RebuildTask {
            pool_id,
            map_version,
            op,
            targets: targets.into_iter().collect(),
            scheduled_at_ms,
            status: TaskStatus::Queued,
        }
    }

    /// Merges `other`'s targets into this task and raises `map_version`
    /// to the max of the two (§4.2.1 step 1). Caller is responsible for
    /// having already checked that merging is legal (same pool, same op,
    /// no differing-op task queued between them).
    pub fn merge_in(&mut self, other: &RebuildTask) {
        debug_assert_eq!(self.pool_id, other.pool_id);
        debug_assert_eq!(self.op, other.op);
        self.targets.extend(other.targets.iter().copied());
        self.map_version = self.map_version.max(other.map_version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_in_unions_targets_and_raises_version() {
        let mut t = RebuildTask::new(1, 10, RebuildOp::Fail, [3], 0);
        let later = RebuildTask::new(1, 12, RebuildOp::Fail, [4], 0);
        t.merge_in(&later);
        assert_eq!(t.map_version, 12);
        assert_eq!(t.targets, BTreeSet::from([3, 4]));
    }
}
