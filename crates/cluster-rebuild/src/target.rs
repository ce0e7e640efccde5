//! The rebuild coordinator's target path (§4.3): scan-start handling,
//! the per-pool status-check loop that reports progress upward, and
//! finalization.
//!
//! Actually walking local storage to find objects that need rebuilding
//! is the out-of-scope scan engine's job (§1 Non-goals); this module
//! owns the tracker lifecycle and reporting around it, and exposes
//! `mark_scan_done`/`record_progress` as the seam that engine would call
//! through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cluster_types::{AggregateCounters, Hlc, HlcClock, LocalTrackerState, PoolId, Rank, RankReport};
use cluster_rpc::{IvSyncMode, IvSyncPayload, IvTree, ObjectsScanReply, ObjectsScanRequest};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::RebuildConfig;
use crate::tracker::LocalTracker;

/// Owns every pool this process is currently a rebuild target for.
pub struct TargetDriver {
    self_rank: Rank,
    iv: Arc<dyn IvTree>,
    clock: Arc<HlcClock>,
    config: RebuildConfig,
    running: Mutex<HashMap<PoolId, Arc<LocalTracker>>>,
}

impl TargetDriver {
    pub fn new(self_rank: Rank, iv: Arc<dyn IvTree>, clock: Arc<HlcClock>, config: RebuildConfig) -> Arc<Self> {
        Arc::new(TargetDriver {
            self_rank,
            iv,
            clock,
            config,
            running: Mutex::new(HashMap::new()),
        })
    }

    /// Handles an `OBJECTS_SCAN` addressed to this rank (§4.3.1): fences
    /// aggregation at the current HLC and starts the status-check loop.
    /// A request carrying a leader term no fresher than an already
    /// running tracker's is a stale duplicate and is acknowledged without
    /// disturbing the running tracker.
    pub async fn handle_objects_scan(self: &Arc<Self>, req: &ObjectsScanRequest) -> ObjectsScanReply {
        let now = self.clock.now();
        {
            let running = self.running.lock().await;
            if let Some(existing) = running.get(&req.pool_id) {
                let current_term = existing.state.lock().await.leader_term;
                if req.leader_term <= current_term {
                    return ObjectsScanReply { status: 0, stable_epoch: now };
                }
            }
        }

        let tracker = LocalTracker::new(LocalTrackerState::new(req.pool_id, req.map_version, req.op, req.leader_term, now));
        self.running.lock().await.insert(req.pool_id, Arc::clone(&tracker));
        self.spawn_status_check_loop(req.pool_id, tracker);
        ObjectsScanReply { status: 0, stable_epoch: now }
    }

    fn spawn_status_check_loop(self: &Arc<Self>, pool: PoolId, tracker: Arc<LocalTracker>) {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            driver.run_status_check_loop(pool, tracker).await;
        });
    }

    /// The per-pool status-check loop (§4.3.2): on each tick, sends this
    /// rank's delta (or absolute, on `re_report`) progress upward, and
    /// exits once the leader has signaled `global_done` or this rank's
    /// rebuild has been aborted (§4.3.3).
    async fn run_status_check_loop(self: Arc<Self>, pool: PoolId, tracker: Arc<LocalTracker>) {
        loop {
            tokio::time::sleep(Duration::from_millis(self.config.check_interval_ms)).await;

            let (abort, global_done) = {
                let state = tracker.state.lock().await;
                (state.abort, state.global_done)
            };
            if abort || global_done {
                break;
            }

            let report = {
                let mut state = tracker.state.lock().await;
                RankReport {
                    rank: self.self_rank,
                    scan_done: state.scan_done,
                    pull_done: state.pull_done,
                    errno: state.errno,
                    re_report: state.re_report,
                    counters: state.counters_to_send(),
                }
            };
            // A non-zero error is reported via the shortcut-to-root IV
            // path so the leader learns of it without waiting on the
            // tree's ordinary lazy-sync latency (§4.3.2 step 4).
            let mode = if report.errno != 0 { IvSyncMode::ShortcutToRoot } else { IvSyncMode::SyncNone };
            if let Err(e) = self.iv.send_report(pool, report, mode).await {
                warn!(pool, error = %e, "failed to send rebuild progress report");
            }
        }

        tracker.state.lock().await.finalize(self.clock.now());
        self.running.lock().await.remove(&pool);
        tracker.mark_drained();
    }

    /// Applies a leader→target IV sync (§4.3.1, §4.3.2 step 4): a sync
    /// carrying a leader term older than this tracker's is stale and
    /// ignored.
    pub async fn receive_sync(&self, pool: PoolId, payload: IvSyncPayload) {
        let running = self.running.lock().await;
        if let Some(tracker) = running.get(&pool) {
            let mut state = tracker.state.lock().await;
            if payload.leader_term >= state.leader_term {
                state.global_scan_done = payload.global_scan_done;
                state.global_done = payload.global_done;
            }
        }
    }

    /// Marks this rank's own scan phase done; called by the (out of
    /// scope) local scan engine once it has enumerated every object that
    /// needs rebuilding.
    pub async fn mark_scan_done(&self, pool: PoolId) {
        if let Some(tracker) = self.running.lock().await.get(&pool) {
            tracker.state.lock().await.scan_done = true;
        }
    }

    /// Marks this rank's own pull phase (data transfer) done; called by
    /// the (out of scope) local pull engine once every object it owns has
    /// been rebuilt. This is what the next status-check tick reports
    /// upward as `RankReport::pull_done` (§4.3.2).
    pub async fn mark_pull_done(&self, pool: PoolId) {
        if let Some(tracker) = self.running.lock().await.get(&pool) {
            tracker.state.lock().await.pull_done = true;
        }
    }

    /// Folds newly observed progress into this rank's counters; called
    /// by the local scan/pull engine as objects are rebuilt.
    pub async fn record_progress(&self, pool: PoolId, delta: AggregateCounters) {
        if let Some(tracker) = self.running.lock().await.get(&pool) {
            let mut state = tracker.state.lock().await;
            state.counters.to_rebuild_objs += delta.to_rebuild_objs;
            state.counters.rebuilt_objs += delta.rebuilt_objs;
            state.counters.records += delta.records;
            state.counters.bytes += delta.bytes;
            state.counters.seconds += delta.seconds;
        }
    }

    /// Records the first non-zero error this rank's local rebuild has
    /// hit; called by the (out of scope) local scan/pull engine. Once
    /// set, this rank's next status-check report carries it, making its
    /// `pull_done` trustworthy to the leader even before the global scan
    /// finishes (§3 GlobalTracker invariant).
    pub async fn report_error(&self, pool: PoolId, errno: i32) {
        if let Some(tracker) = self.running.lock().await.get(&pool) {
            let mut state = tracker.state.lock().await;
            if state.errno == 0 {
                state.errno = errno;
            }
        }
    }

    /// Requests this rank's own tracker to restart its reporting cycle
    /// from an absolute snapshot rather than a delta, e.g. after this
    /// rank was briefly excluded and lost its in-memory watermark.
    pub async fn request_re_report(&self, pool: PoolId) {
        if let Some(tracker) = self.running.lock().await.get(&pool) {
            tracker.state.lock().await.re_report = true;
        }
    }

    /// Aborts this rank's in-flight rebuild for `pool`, if any (§5).
    pub async fn abort(&self, pool: PoolId) {
        if let Some(tracker) = self.running.lock().await.get(&pool) {
            tracker.state.lock().await.abort = true;
        }
    }

    /// The HLC fence installed for `pool`'s running tracker, if any: the
    /// container's aggregation must suspend updates below this value for
    /// the duration of the task (§3, §4.3.1, §4.3.3).
    pub async fn rebuild_fence(&self, pool: PoolId) -> Option<Hlc> {
        let running = self.running.lock().await;
        match running.get(&pool) {
            Some(tracker) => Some(tracker.state.lock().await.rebuild_fence_hlc),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockCollaborators;
    use cluster_types::RebuildOp;

    fn harness() -> (Arc<TargetDriver>, Arc<MockCollaborators>) {
        let collaborators = MockCollaborators::new();
        let config = RebuildConfig {
            check_interval_ms: 5,
            ..RebuildConfig::default()
        };
        let driver = TargetDriver::new(7, collaborators.clone(), Arc::new(HlcClock::new()), config);
        (driver, collaborators)
    }

    fn scan_req(pool: PoolId, leader_term: u64) -> ObjectsScanRequest {
        ObjectsScanRequest {
            pool_id: pool,
            iv_ns_id: 1,
            leader_term,
            map_version: 5,
            target_ids: vec![7],
            op: RebuildOp::Fail,
            master_rank: 0,
        }
    }

    #[tokio::test]
    async fn handle_objects_scan_installs_a_fresh_fence() {
        let (driver, _collab) = harness();
        let reply = driver.handle_objects_scan(&scan_req(1, 1)).await;
        assert_eq!(reply.status, 0);
        assert!(driver.rebuild_fence(1).await.is_some());
    }

    #[tokio::test]
    async fn a_stale_leader_term_does_not_disturb_a_running_tracker() {
        let (driver, _collab) = harness();
        driver.handle_objects_scan(&scan_req(1, 5)).await;
        let fence_before = driver.rebuild_fence(1).await;

        driver.handle_objects_scan(&scan_req(1, 2)).await;
        let fence_after = driver.rebuild_fence(1).await;
        assert_eq!(fence_before, fence_after);
    }

    #[tokio::test]
    async fn status_check_loop_exits_and_clears_tracker_once_global_done() {
        let (driver, _collab) = harness();
        driver.handle_objects_scan(&scan_req(1, 1)).await;
        driver.mark_scan_done(1).await;
        driver.receive_sync(1, IvSyncPayload { stable_epoch: Hlc::ZERO, global_scan_done: true, global_done: true, leader_term: 1 }).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(driver.rebuild_fence(1).await.is_none());
    }

    #[tokio::test]
    async fn status_reports_carry_this_ranks_own_pull_done_and_errno() {
        let (driver, collab) = harness();
        driver.handle_objects_scan(&scan_req(1, 1)).await;
        driver.mark_scan_done(1).await;
        driver.mark_pull_done(1).await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        let reports = collab.sent_reports();
        assert!(!reports.is_empty());
        let last = reports.last().unwrap();
        assert!(last.scan_done);
        assert!(last.pull_done);
        assert_eq!(last.errno, 0);
    }

    #[tokio::test]
    async fn a_reported_error_is_sticky_and_shortcut_synced() {
        let (driver, collab) = harness();
        driver.handle_objects_scan(&scan_req(1, 1)).await;
        driver.report_error(1, -5).await;
        driver.report_error(1, -9).await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        let reports = collab.sent_reports();
        let last = reports.last().unwrap();
        assert_eq!(last.errno, -5);
        assert!(!last.pull_done);
    }
}
