//! Shared, lock-guarded handles around the pure tracker state in
//! `cluster_types::tracker`, plus the completion signal a waiter blocks
//! on (§9 design note, §4.2.3, §4.3.3, §5).
//!
//! §9 models `GlobalTracker`/`LocalTracker` as refcounted values whose
//! destruction condition-signals a waiter stuck on "refcount reaches
//! zero". `Arc`'s own drop glue already reclaims the value once every
//! handle is gone, so there is nothing left to leak; what the rest of
//! the system actually waits *on* is "this task's work is finished",
//! which is a plain completion event. We model that directly with a
//! `Notify` fired once, rather than reproducing C's wait-for-refcount-1
//! dance.

use std::sync::Arc;

use cluster_types::{GlobalTrackerState, LocalTrackerState};
use tokio::sync::{Mutex, Notify};

/// A running task's leader-side tracker, shared between the task-driver
/// and the status-check loop's report-application path.
pub struct GlobalTracker {
    pub state: Mutex<GlobalTrackerState>,
    /// Set by the task-driver once finalization (success or error) has
    /// run; `leader_stop` and `stop_all` wait on this (§5).
    pub finished: Notify,
    /// Cooperative abort flag; the status-check loop polls it each tick.
    pub abort: std::sync::atomic::AtomicBool,
}

impl GlobalTracker {
    pub fn new(state: GlobalTrackerState) -> Arc<Self> {
        Arc::new(GlobalTracker {
            state: Mutex::new(state),
            finished: Notify::new(),
            abort: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn request_abort(&self) {
        self.abort.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn mark_finished(&self) {
        self.finished.notify_waiters();
    }
}

/// A running task's target-side tracker.
pub struct LocalTracker {
    pub state: Mutex<LocalTrackerState>,
    pub drained: Notify,
}

impl LocalTracker {
    pub fn new(state: LocalTrackerState) -> Arc<Self> {
        Arc::new(LocalTracker {
            state: Mutex::new(state),
            drained: Notify::new(),
        })
    }

    pub fn mark_drained(&self) {
        self.drained.notify_waiters();
    }
}
