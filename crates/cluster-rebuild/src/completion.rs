//! Bounded per-pool completion history so a late `query(pool)` after a
//! tracker has been torn down still returns a meaningful result (§4.2.5).

use std::collections::{HashMap, VecDeque};

use cluster_types::{PoolId, RebuildOp};

/// One retained completed-task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedTask {
    pub map_version: u64,
    pub op: RebuildOp,
    pub errno: i32,
}

/// Outcome of `CompletionLog::query` / `RebuildCoordinator::query`: either
/// a running task is in progress, or the most recent record applies, or
/// (absent both) the pool is considered done with no error (§4.2.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResult {
    pub done: bool,
    pub errno: i32,
}

/// Per-pool ring buffer of completed tasks.
#[derive(Debug)]
pub struct CompletionLog {
    per_pool: HashMap<PoolId, VecDeque<CompletedTask>>,
    capacity_per_pool: usize,
}

impl CompletionLog {
    pub fn new(capacity_per_pool: usize) -> Self {
        CompletionLog {
            per_pool: HashMap::new(),
            capacity_per_pool: capacity_per_pool.max(1),
        }
    }

    /// Records a finished task, evicting the oldest entry for the pool
    /// if at capacity.
    pub fn record(&mut self, pool: PoolId, entry: CompletedTask) {
        let ring = self.per_pool.entry(pool).or_default();
        ring.push_back(entry);
        while ring.len() > self.capacity_per_pool {
            ring.pop_front();
        }
    }

    /// The most recently completed task for `pool`, if any is retained.
    pub fn most_recent(&self, pool: PoolId) -> Option<CompletedTask> {
        self.per_pool.get(&pool).and_then(|ring| ring.back().copied())
    }

    /// `query(pool)` absent a running tracker: the most recent completed
    /// record if one is retained, else `done=true, errno=0` (§4.2.5).
    pub fn query(&self, pool: PoolId) -> QueryResult {
        match self.most_recent(pool) {
            Some(task) => QueryResult {
                done: true,
                errno: task.errno,
            },
            None => QueryResult { done: true, errno: 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_with_no_history_reports_done_with_no_error() {
        let log = CompletionLog::new(4);
        assert_eq!(log.query(1), QueryResult { done: true, errno: 0 });
    }

    #[test]
    fn query_returns_the_most_recent_record() {
        let mut log = CompletionLog::new(4);
        log.record(1, CompletedTask { map_version: 10, op: RebuildOp::Fail, errno: 0 });
        log.record(1, CompletedTask { map_version: 12, op: RebuildOp::Fail, errno: 7 });
        assert_eq!(log.query(1), QueryResult { done: true, errno: 7 });
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut log = CompletionLog::new(2);
        for v in 0..5 {
            log.record(1, CompletedTask { map_version: v, op: RebuildOp::Fail, errno: 0 });
        }
        assert_eq!(log.per_pool[&1].len(), 2);
        assert_eq!(log.per_pool[&1].front().unwrap().map_version, 3);
    }
}
