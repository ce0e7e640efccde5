//! The leader's per-process rebuild task queue: scheduling with merge
//! (§4.2.1) and dispatch-order dequeue (§4.2.2).

use std::collections::HashSet;

use cluster_types::{PoolId, RebuildTask};

/// FIFO-ish queue of not-yet-dispatched `RebuildTask`s.
///
/// Tasks are appended in schedule order and never globally re-sorted:
/// the per-pool ascending-`map_version` invariant (§3) falls out for
/// free because `schedule` only ever merges into or appends after the
/// most recently queued task for a pool, and real callers only ever
/// schedule monotonically increasing versions for a given pool.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queued: Vec<RebuildTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a task, merging it into the most recently queued task
    /// for the same pool if that task's op matches (§4.2.1 step 1);
    /// otherwise appends a new entry (step 2).
    ///
    /// The "no later task of a different op queued between them" rule
    /// from §4.2.1 reduces to comparing against the *single* most recent
    /// queued task for the pool: if that one's op differs, merging with
    /// an even older same-op task would reorder it ahead of the
    /// differing-op task still queued between them, which is exactly
    /// what the rule forbids (§8 scenario 5).
    pub fn schedule(&mut self, task: RebuildTask) {
        let most_recent = self
            .queued
            .iter_mut()
            .filter(|t| t.pool_id == task.pool_id)
            .max_by_key(|t| t.map_version);

        if let Some(existing) = most_recent {
            if existing.op == task.op {
                existing.merge_in(&task);
                return;
            }
        }
        self.queued.push(task);
    }

    /// Removes and returns the first queued task whose pool is not in
    /// `running_pools` (§4.2.2). Callers enforce `MAX_INFLIGHT` by
    /// checking `running_pools.len()` before calling.
    pub fn dequeue_next(&mut self, running_pools: &HashSet<PoolId>) -> Option<RebuildTask> {
        let idx = self.queued.iter().position(|t| !running_pools.contains(&t.pool_id))?;
        Some(self.queued.remove(idx))
    }

    /// Removes every queued task for `pool` at or below `version`,
    /// returning them (`leader_stop`, §5 cancellation).
    pub fn remove_for_pool(&mut self, pool: PoolId, version: u64) -> Vec<RebuildTask> {
        let (removed, kept) = std::mem::take(&mut self.queued)
            .into_iter()
            .partition(|t| t.pool_id == pool && t.map_version <= version);
        self.queued = kept;
        removed
    }

    /// Drops every queued task (`stop_all`, §5).
    pub fn clear(&mut self) -> Vec<RebuildTask> {
        std::mem::take(&mut self.queued)
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_types::RebuildOp;

    #[test]
    fn schedule_merges_same_op_same_pool() {
        let mut q = TaskQueue::new();
        q.schedule(RebuildTask::new(1, 10, RebuildOp::Fail, [3], 0));
        q.schedule(RebuildTask::new(1, 12, RebuildOp::Fail, [4], 0));
        assert_eq!(q.len(), 1);
        let task = &q.queued[0];
        assert_eq!(task.map_version, 12);
        assert_eq!(task.targets, std::collections::BTreeSet::from([3, 4]));
    }

    #[test]
    fn schedule_does_not_merge_across_a_differing_op() {
        let mut q = TaskQueue::new();
        q.schedule(RebuildTask::new(1, 10, RebuildOp::Fail, [3], 0));
        q.schedule(RebuildTask::new(1, 11, RebuildOp::Reint, [9], 0));
        q.schedule(RebuildTask::new(1, 12, RebuildOp::Fail, [4], 0));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn dequeue_skips_pools_with_a_running_task() {
        let mut q = TaskQueue::new();
        q.schedule(RebuildTask::new(1, 10, RebuildOp::Fail, [3], 0));
        q.schedule(RebuildTask::new(2, 5, RebuildOp::Extend, [9], 0));

        let mut running = HashSet::new();
        running.insert(1u64);
        let next = q.dequeue_next(&running).unwrap();
        assert_eq!(next.pool_id, 2);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_for_pool_only_removes_matching_entries() {
        let mut q = TaskQueue::new();
        q.schedule(RebuildTask::new(1, 10, RebuildOp::Fail, [3], 0));
        q.schedule(RebuildTask::new(2, 5, RebuildOp::Extend, [9], 0));
        let removed = q.remove_for_pool(1, 10);
        assert_eq!(removed.len(), 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.queued[0].pool_id, 2);
    }
}
