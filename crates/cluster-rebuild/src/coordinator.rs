//! The rebuild coordinator's leader path (§4.2): queue, dispatcher,
//! per-task driver, and the completion lookup table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cluster_types::{
    Error, GlobalTrackerState, HlcClock, PoolId, Rank, RankReport, RebuildOp, RebuildTask,
    TargetTransitionRequest, TaskStatus,
};
use cluster_rpc::{IvSyncPayload, IvTree, ObjectsScanRequest, PoolMapService, RebuildTransport};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::completion::{CompletedTask, CompletionLog, QueryResult};
use crate::config::RebuildConfig;
use crate::queue::TaskQueue;
use crate::tracker::GlobalTracker;

/// Owns the leader-side queue, running-task table, and completion
/// history for every pool this process leads a rebuild for.
pub struct RebuildCoordinator {
    self_rank: Rank,
    iv_ns_id: u64,
    config: RebuildConfig,
    transport: Arc<dyn RebuildTransport>,
    pool_service: Arc<dyn PoolMapService>,
    iv: Arc<dyn IvTree>,
    clock: Arc<HlcClock>,
    queue: Mutex<TaskQueue>,
    running: Mutex<HashMap<PoolId, Arc<GlobalTracker>>>,
    completions: Mutex<CompletionLog>,
}

/// Why a task-driver stopped short of a clean, topology-promoting finish.
enum DriveOutcome {
    Completed,
    Aborted,
    Failed(i32),
    LeadershipLost,
}

impl RebuildCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_rank: Rank,
        iv_ns_id: u64,
        config: RebuildConfig,
        transport: Arc<dyn RebuildTransport>,
        pool_service: Arc<dyn PoolMapService>,
        iv: Arc<dyn IvTree>,
        clock: Arc<HlcClock>,
    ) -> Arc<Self> {
        Arc::new(RebuildCoordinator {
            self_rank,
            iv_ns_id,
            config,
            transport,
            pool_service,
            iv,
            clock,
            queue: Mutex::new(TaskQueue::new()),
            running: Mutex::new(HashMap::new()),
            completions: Mutex::new(CompletionLog::new(config.completion_log_capacity)),
        })
    }

    /// Schedules a rebuild task, merging with an already-queued task for
    /// the same pool and op where legal (§4.2.1).
    pub async fn schedule(&self, pool_id: PoolId, map_version: u64, targets: impl IntoIterator<Item = Rank>, op: RebuildOp, delay_ms: u64) {
        let scheduled_at_ms = self.clock.now().physical_ms() + delay_ms;
        let task = RebuildTask::new(pool_id, map_version, op, targets, scheduled_at_ms);
        self.queue.lock().await.schedule(task);
    }

    /// Applies a per-rank progress report to the running tracker for
    /// `pool`, if any (§4.2.4). A report for a pool with no running task
    /// is silently dropped (the target is reporting against a task this
    /// leader has already finalized or never started).
    pub async fn apply_report(&self, pool: PoolId, report: RankReport) {
        let running = self.running.lock().await;
        if let Some(tracker) = running.get(&pool) {
            tracker.state.lock().await.apply_report(report);
        }
    }

    /// Current status for `pool`: the running tracker's live state if a
    /// task is in flight, else the completion log, else `done=true`
    /// (§4.2.5).
    pub async fn query(&self, pool: PoolId) -> QueryResult {
        let running = self.running.lock().await;
        if let Some(tracker) = running.get(&pool) {
            let state = tracker.state.lock().await;
            return QueryResult {
                done: state.is_global_done(),
                errno: state.errno,
            };
        }
        drop(running);
        self.completions.lock().await.query(pool)
    }

    /// Removes queued tasks for `pool` at or below `version` and, if a
    /// task for `pool` is running, requests its abort and waits for the
    /// driver to finish (§5).
    pub async fn leader_stop(&self, pool: PoolId, version: u64) {
        self.queue.lock().await.remove_for_pool(pool, version);

        let tracker = self.running.lock().await.get(&pool).cloned();
        if let Some(tracker) = tracker {
            tracker.request_abort();
            tracker.finished.notified().await;
        }
    }

    /// Drops every queued task and requests abort on every running
    /// driver without waiting; running work is not interrupted, so a new
    /// leader can resume it (§5).
    pub async fn stop_all(&self) {
        self.queue.lock().await.clear();
        let running = self.running.lock().await;
        for tracker in running.values() {
            tracker.request_abort();
        }
    }

    /// Runs the dispatcher forever: whenever a running-task slot frees up
    /// under `max_inflight`, pulls the next eligible queued task and
    /// spawns its driver (§4.2.2). Intended to be spawned once via
    /// `tokio::spawn`.
    pub async fn run_dispatcher(self: Arc<Self>) {
        loop {
            tokio::time::sleep(Duration::from_millis(self.config.check_interval_ms)).await;
            self.dispatch_ready_tasks().await;
        }
    }

    /// Number of not-yet-dispatched queued tasks; exposed crate-internally
    /// for `poolmap_glue`'s tests.
    #[cfg(test)]
    pub(crate) async fn queued_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    async fn dispatch_ready_tasks(self: &Arc<Self>) {
        loop {
            let task = {
                let mut queue = self.queue.lock().await;
                let running = self.running.lock().await;
                if running.len() >= self.config.max_inflight {
                    return;
                }
                let running_pools = running.keys().copied().collect();
                queue.dequeue_next(&running_pools)
            };
            let Some(task) = task else { return };
            self.spawn_driver(task);
        }
    }

    fn spawn_driver(self: &Arc<Self>, task: RebuildTask) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.drive(task).await;
        });
    }

    /// One running task's full lifecycle (§4.2.3).
    async fn drive(self: Arc<Self>, mut task: RebuildTask) {
        let now = self.clock.now().physical_ms();
        if task.scheduled_at_ms > now {
            tokio::time::sleep(Duration::from_millis(task.scheduled_at_ms - now)).await;
        }
        task.status = TaskStatus::Running;

        let tracker = match self.start_tracker(&task).await {
            Ok(tracker) => tracker,
            Err(DriveOutcome::LeadershipLost) => return,
            Err(DriveOutcome::Failed(errno)) => {
                self.finalize_failed(&task, errno).await;
                return;
            }
            Err(_) => return,
        };

        self.running.lock().await.insert(task.pool_id, Arc::clone(&tracker));

        let outcome = self.run_status_check_loop(&task, &tracker).await;

        self.running.lock().await.remove(&task.pool_id);
        tracker.mark_finished();

        match outcome {
            DriveOutcome::Completed => self.finalize_success(&task, &tracker).await,
            DriveOutcome::Aborted => self.finalize_aborted(&task).await,
            DriveOutcome::Failed(errno) => self.finalize_failed(&task, errno).await,
            DriveOutcome::LeadershipLost => {}
        }
    }

    /// Resolves the leader term, seeds the tracker, broadcasts pool map +
    /// properties, and runs the initial scan (§4.2.3 steps 2-5).
    async fn start_tracker(&self, task: &RebuildTask) -> std::result::Result<Arc<GlobalTracker>, DriveOutcome> {
        let leader_term = self.pool_service.leader_term(task.pool_id).await.map_err(classify)?;
        let snapshot = self.pool_service.snapshot(task.pool_id).await.map_err(classify)?;
        let ranks: Vec<Rank> = snapshot.targets.keys().copied().collect();

        loop {
            match self.pool_service.broadcast_pool_map(task.pool_id, task.map_version).await {
                Ok(()) => break,
                Err(Error::StaleGroupVersion) => {
                    tokio::time::sleep(Duration::from_millis(self.config.stale_retry_delay_ms)).await;
                }
                Err(e) => return Err(classify(e)),
            }
        }
        self.pool_service.broadcast_pool_properties(task.pool_id).await.map_err(classify)?;

        let tracker = GlobalTracker::new(GlobalTrackerState::new(task.pool_id, task.map_version, task.op, leader_term, ranks));

        let req = ObjectsScanRequest {
            pool_id: task.pool_id,
            iv_ns_id: self.iv_ns_id,
            leader_term,
            map_version: task.map_version,
            target_ids: task.targets.iter().copied().collect(),
            op: task.op,
            master_rank: self.self_rank,
        };
        let reply = self.transport.objects_scan(req).await.map_err(classify)?;
        if reply.status != 0 {
            return Err(DriveOutcome::Failed(reply.status));
        }
        tracker.state.lock().await.stable_epoch = reply.stable_epoch;
        Ok(tracker)
    }

    /// The status-check loop (§4.2.3 step 6). Re-checks leadership every
    /// tick: a `NotLeader`/`Canceled` error from the pool service, or a
    /// leader term that has moved on from the one this task started
    /// with, means another node now leads this pool, so the driver exits
    /// without promoting topology and lets the new leader restart
    /// tracking (§4.2.3 step 8, §8 scenario 6).
    async fn run_status_check_loop(&self, task: &RebuildTask, tracker: &Arc<GlobalTracker>) -> DriveOutcome {
        let mut last_logged_ms = 0u64;
        let mut last_done = false;
        loop {
            tokio::time::sleep(Duration::from_millis(self.config.check_interval_ms)).await;

            if tracker.is_abort_requested() {
                return DriveOutcome::Aborted;
            }

            let leader_term = tracker.state.lock().await.leader_term;
            match self.pool_service.leader_term(task.pool_id).await {
                Ok(term) if term != leader_term => {
                    info!(pool = task.pool_id, leader_term, current_term = term, "leader term changed mid-rebuild, dropping task");
                    return DriveOutcome::LeadershipLost;
                }
                Ok(_) => {}
                Err(e) if e.is_leadership_loss() => return DriveOutcome::LeadershipLost,
                Err(e) => warn!(pool = task.pool_id, error = %e, "failed to re-check leader term"),
            }

            match self.pool_service.snapshot(task.pool_id).await {
                Ok(snapshot) => {
                    let mut state = tracker.state.lock().await;
                    state.premark_failed(snapshot.failed_ranks());
                }
                Err(e) if e.is_leadership_loss() => return DriveOutcome::LeadershipLost,
                Err(e) => warn!(pool = task.pool_id, error = %e, "failed to read pool map during status check"),
            }

            let (scan_done, done, errno) = {
                let mut state = tracker.state.lock().await;
                let scan_done = state.is_global_scan_done();
                if scan_done && !state.stable_epoch_notified {
                    state.stable_epoch_notified = true;
                    let payload = IvSyncPayload {
                        stable_epoch: state.stable_epoch,
                        global_scan_done: true,
                        global_done: false,
                        leader_term: state.leader_term,
                    };
                    drop(state);
                    if let Err(e) = self.iv.broadcast_sync(task.pool_id, payload).await {
                        if e.is_leadership_loss() {
                            return DriveOutcome::LeadershipLost;
                        }
                        warn!(pool = task.pool_id, error = %e, "failed to sync global_scan_done");
                    }
                    state = tracker.state.lock().await;
                }
                (scan_done, state.is_global_done(), state.errno)
            };

            let now_ms = self.clock.now().physical_ms();
            if done != last_done || now_ms.saturating_sub(last_logged_ms) >= self.config.status_log_interval_ms {
                info!(pool = task.pool_id, map_version = task.map_version, scan_done, done, errno, "rebuild status");
                last_logged_ms = now_ms;
                last_done = done;
            }

            if done {
                return if errno == 0 { DriveOutcome::Completed } else { DriveOutcome::Failed(errno) };
            }
        }
    }

    async fn finalize_success(&self, task: &RebuildTask, tracker: &Arc<GlobalTracker>) {
        let (stable_epoch, leader_term) = {
            let state = tracker.state.lock().await;
            (state.stable_epoch, state.leader_term)
        };
        let payload = IvSyncPayload {
            stable_epoch,
            global_scan_done: true,
            global_done: true,
            leader_term,
        };
        if let Err(e) = self.iv.broadcast_sync(task.pool_id, payload).await {
            warn!(pool = task.pool_id, error = %e, "failed to sync global_done");
        }

        match task.op {
            RebuildOp::Fail | RebuildOp::Drain => {
                for &target in &task.targets {
                    let _ = self
                        .pool_service
                        .request_transition(task.pool_id, target, TargetTransitionRequest::DownToDownOut)
                        .await;
                }
            }
            RebuildOp::Reint | RebuildOp::Extend => {
                for &target in &task.targets {
                    let _ = self
                        .pool_service
                        .request_transition(task.pool_id, target, TargetTransitionRequest::UpOrNewToUpIn)
                        .await;
                }
                self.schedule(task.pool_id, task.map_version, task.targets.iter().copied(), RebuildOp::Reclaim, 0)
                    .await;
            }
            RebuildOp::Reclaim => {}
        }

        self.completions.lock().await.record(
            task.pool_id,
            CompletedTask {
                map_version: task.map_version,
                op: task.op,
                errno: 0,
            },
        );
    }

    async fn finalize_aborted(&self, task: &RebuildTask) {
        self.completions.lock().await.record(
            task.pool_id,
            CompletedTask {
                map_version: task.map_version,
                op: task.op,
                errno: 0,
            },
        );
    }

    /// Non-fatal task error: reschedule after `reschedule_delay_ms` with
    /// the same op/targets (§4.2.3 step 8). No completion record is
    /// written here: the task is not finished, only deferred, so a
    /// `query(pool)` in the gap before the retry dispatches should not
    /// report the stale error as the task's final outcome (§4.2.5).
    async fn finalize_failed(&self, task: &RebuildTask, errno: i32) {
        warn!(pool = task.pool_id, map_version = task.map_version, errno, "rebuild task failed, rescheduling");
        self.schedule(
            task.pool_id,
            task.map_version,
            task.targets.iter().copied(),
            task.op,
            self.config.reschedule_delay_ms,
        )
        .await;
    }
}

/// Classifies a collaborator error as leadership loss (drop silently,
/// §4.2.3 step 8) or a task-fatal failure recorded with a synthetic
/// negative errno (§7).
fn classify(err: Error) -> DriveOutcome {
    if err.is_leadership_loss() {
        DriveOutcome::LeadershipLost
    } else {
        DriveOutcome::Failed(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;
    use cluster_types::TargetState;
    use std::collections::HashSet;

    #[tokio::test]
    async fn query_with_no_history_reports_done() {
        let harness = TestHarness::new();
        let result = harness.coordinator.query(1).await;
        assert_eq!(result, QueryResult { done: true, errno: 0 });
    }

    #[tokio::test]
    async fn single_node_failure_completes_and_transitions_down_out() {
        let harness = TestHarness::new();
        harness.collaborators.seed_pool(1, [(3u64, TargetState::Down, 5)], true);

        harness.coordinator.schedule(1, 5, [3], RebuildOp::Fail, 0).await;
        let task = harness
            .coordinator
            .queue
            .lock()
            .await
            .dequeue_next(&HashSet::new())
            .unwrap();
        harness.coordinator.clone().drive(task).await;

        let result = harness.coordinator.query(1).await;
        assert_eq!(result, QueryResult { done: true, errno: 0 });
        assert!(harness.collaborators.was_transitioned(3, TargetTransitionRequest::DownToDownOut));
    }

    #[tokio::test]
    async fn successful_reint_schedules_a_reclaim_follow_up() {
        let harness = TestHarness::new();
        harness.collaborators.seed_pool(1, [(3u64, TargetState::Up, 5)], true);

        harness.coordinator.schedule(1, 5, [3], RebuildOp::Reint, 0).await;
        let task = harness
            .coordinator
            .queue
            .lock()
            .await
            .dequeue_next(&HashSet::new())
            .unwrap();
        harness.coordinator.clone().drive(task).await;

        assert!(harness.collaborators.was_transitioned(3, TargetTransitionRequest::UpOrNewToUpIn));
        let queued = harness.coordinator.queue.lock().await.len();
        assert_eq!(queued, 1);
    }

    #[tokio::test]
    async fn merging_two_schedules_for_the_same_pool_and_op_leaves_one_queued_task() {
        let harness = TestHarness::new();
        harness
            .collaborators
            .seed_pool(1, [(3u64, TargetState::Down, 10), (4u64, TargetState::Down, 12)], true);

        harness.coordinator.schedule(1, 10, [3], RebuildOp::Fail, 0).await;
        harness.coordinator.schedule(1, 12, [4], RebuildOp::Fail, 0).await;
        assert_eq!(harness.coordinator.queue.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn a_scan_error_reschedules_without_recording_a_stale_completion() {
        let harness = TestHarness::new();
        harness.collaborators.seed_pool(1, [(3u64, TargetState::Down, 5)], true);
        harness.collaborators.fail_next_scan(9);

        harness.coordinator.schedule(1, 5, [3], RebuildOp::Fail, 0).await;
        let task = harness
            .coordinator
            .queue
            .lock()
            .await
            .dequeue_next(&HashSet::new())
            .unwrap();
        harness.coordinator.clone().drive(task).await;

        // No tracker is running and no completion was recorded for the
        // failed-and-rescheduled attempt, so query falls through to the
        // "no history" default rather than reporting the stale errno.
        let result = harness.coordinator.query(1).await;
        assert_eq!(result, QueryResult { done: true, errno: 0 });
        assert_eq!(harness.coordinator.queue.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn a_leader_term_change_mid_rebuild_drops_the_task_without_promoting_topology() {
        let harness = TestHarness::new();
        // `Up` is not pre-marked done by `premark_failed`, so the task
        // never reaches `is_global_done` on its own; the only way the
        // status-check loop exits is the leader-term recheck below.
        harness.collaborators.seed_pool(1, [(3u64, TargetState::Up, 5)], true);

        harness.coordinator.schedule(1, 5, [3], RebuildOp::Reint, 0).await;
        let task = harness
            .coordinator
            .queue
            .lock()
            .await
            .dequeue_next(&HashSet::new())
            .unwrap();

        let coordinator = harness.coordinator.clone();
        let driver = tokio::spawn(async move { coordinator.drive(task).await });

        // Let `start_tracker` capture the original leader term before a
        // demotion bumps it; the next status-check tick observes the
        // mismatch (§4.2.3 step 8, §8 scenario 6).
        tokio::time::sleep(Duration::from_millis(10)).await;
        harness.collaborators.bump_leader_term(2);

        tokio::time::timeout(Duration::from_millis(500), driver)
            .await
            .expect("driver should exit promptly on leader-term mismatch")
            .unwrap();

        assert!(!harness.collaborators.was_transitioned(3, TargetTransitionRequest::UpOrNewToUpIn));
        // Dropped silently: no completion record, no requeued follow-up.
        assert_eq!(harness.coordinator.query(1).await, QueryResult { done: true, errno: 0 });
        assert_eq!(harness.coordinator.queue.lock().await.len(), 0);
    }
}
