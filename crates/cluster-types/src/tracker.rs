//! Progress-tracking state for one running rebuild task, on the leader
//! (`GlobalTrackerState`) and on a target (`LocalTrackerState`).
//!
//! Both are plain data here: the reference-counted, lock-guarded, and
//! condvar-signaled wrapper around them (`Arc<Mutex<..>>` plus a
//! `Notify`/`watch`, per §9's design note) lives in `cluster-rebuild`,
//! which is where the async runtime and the refcount-to-zero teardown
//! dance belong.

use std::collections::BTreeMap;

use crate::hlc::Hlc;
use crate::member::Rank;
use crate::rebuild::{PoolId, RebuildOp};

/// Per-rank progress as seen by the leader.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankProgress {
    pub scan_done: bool,
    pub pull_done: bool,
    /// First non-zero error reported by this rank, if any.
    pub errno: i32,
}

impl RankProgress {
    /// A rank reported `pull_done` is only trustworthy once the global
    /// scan is done, unless the report itself carries a non-zero error
    /// (§3 GlobalTracker invariant).
    pub fn pull_is_final(self, global_scan_done: bool) -> bool {
        self.pull_done && (global_scan_done || self.errno != 0)
    }
}

/// Aggregate counters accumulated across all ranks of a running task.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateCounters {
    pub to_rebuild_objs: u64,
    pub rebuilt_objs: u64,
    pub records: u64,
    pub bytes: u64,
    pub seconds: u64,
}

impl AggregateCounters {
    /// Folds a target's report into the aggregate. `re_report` full
    /// snapshots replace this rank's prior contribution rather than
    /// accumulating on top of it; the caller (the leader's per-rank
    /// aggregation) is expected to track each rank's last-applied
    /// snapshot and diff it, which is what `RankReport` below models.
    fn add(&mut self, delta: &AggregateCounters) {
        self.to_rebuild_objs += delta.to_rebuild_objs;
        self.rebuilt_objs += delta.rebuilt_objs;
        self.records += delta.records;
        self.bytes += delta.bytes;
        self.seconds += delta.seconds;
    }
}

/// A report pushed by a target, either as a delta since its last ack or
/// as an absolute snapshot when `re_report` is set (the target restarted
/// its reporting cycle, e.g. after an exclusion/rejoin).
#[derive(Debug, Clone, Copy)]
pub struct RankReport {
    pub rank: Rank,
    pub scan_done: bool,
    pub pull_done: bool,
    pub errno: i32,
    pub re_report: bool,
    pub counters: AggregateCounters,
}

/// Per-task progress state owned by the leader.
#[derive(Debug, Clone)]
pub struct GlobalTrackerState {
    pub pool_id: PoolId,
    pub map_version: u64,
    pub op: RebuildOp,
    pub leader_term: u64,
    /// Aggregated max of per-target local HLC fences, installed once all
    /// initial scan replies are in (§4.2.3 step 5).
    pub stable_epoch: Hlc,
    /// Whether the `{stable_epoch, global_scan_done=true}` sync has
    /// already been sent to targets (§4.2.3 step 6).
    pub stable_epoch_notified: bool,
    pub abort: bool,
    pub progress: BTreeMap<Rank, RankProgress>,
    pub counters: AggregateCounters,
    /// First non-zero per-target error observed; becomes the task's
    /// final error (§7).
    pub errno: i32,
    /// Last absolute counters received per rank, to diff non-`re_report`
    /// deltas correctly when a rank later sends `re_report = true`.
    last_absolute: BTreeMap<Rank, AggregateCounters>,
}

impl GlobalTrackerState {
    /// Seeds a tracker with every rank currently in the pool (§4.2.3
    /// step 2).
    pub fn new(pool_id: PoolId, map_version: u64, op: RebuildOp, leader_term: u64, ranks: impl IntoIterator<Item = Rank>) -> Self {
        let progress = ranks.into_iter().map(|r| (r, RankProgress::default())).collect();
        GlobalTrackerState {
            pool_id,
            map_version,
            op,
            leader_term,
            stable_epoch: Hlc::ZERO,
            stable_epoch_notified: false,
            abort: false,
            progress,
            counters: AggregateCounters::default(),
            errno: 0,
            last_absolute: BTreeMap::new(),
        }
    }

    /// Pre-marks a set of ranks (those observed `Down`/`Drain` in the
    /// current pool map) as `scan_done | pull_done` since they will never
    /// report (§4.2.3 step 6).
    pub fn premark_failed(&mut self, failed: impl IntoIterator<Item = Rank>) {
        for rank in failed {
            let entry = self.progress.entry(rank).or_default();
            entry.scan_done = true;
            entry.pull_done = true;
        }
    }

    /// Applies a report from a target, per the aggregation rule (§4.2.4):
    /// `scan_done` is set unconditionally on first receipt; `pull_done`
    /// is accepted only after the global scan is done, or immediately if
    /// the report carries a non-zero error.
    pub fn apply_report(&mut self, report: RankReport) {
        let entry = self.progress.entry(report.rank).or_default();
        entry.scan_done = entry.scan_done || report.scan_done;
        if self.is_global_scan_done() || report.errno != 0 {
            entry.pull_done = entry.pull_done || report.pull_done;
        }
        if entry.errno == 0 && report.errno != 0 {
            entry.errno = report.errno;
            if self.errno == 0 {
                self.errno = report.errno;
            }
        }

        let delta = if report.re_report {
            let prior = self.last_absolute.get(&report.rank).copied().unwrap_or_default();
            let d = AggregateCounters {
                to_rebuild_objs: report.counters.to_rebuild_objs.saturating_sub(prior.to_rebuild_objs),
                rebuilt_objs: report.counters.rebuilt_objs.saturating_sub(prior.rebuilt_objs),
                records: report.counters.records.saturating_sub(prior.records),
                bytes: report.counters.bytes.saturating_sub(prior.bytes),
                seconds: report.counters.seconds.saturating_sub(prior.seconds),
            };
            self.last_absolute.insert(report.rank, report.counters);
            d
        } else {
            let prior = self.last_absolute.entry(report.rank).or_default();
            prior.add(&report.counters);
            report.counters
        };
        self.counters.add(&delta);
    }

    /// True once every tracked rank (excluding none; pre-marked ranks
    /// count) has reported `scan_done`.
    pub fn is_global_scan_done(&self) -> bool {
        !self.progress.is_empty() && self.progress.values().all(|p| p.scan_done)
    }

    /// True once every tracked rank's `pull_done` is trustworthy, per
    /// `RankProgress::pull_is_final` (§8 invariant 5).
    pub fn is_global_pull_done(&self) -> bool {
        !self.progress.is_empty()
            && self
                .progress
                .values()
                .all(|p| p.pull_is_final(self.is_global_scan_done()))
    }

    /// True once both phases are globally done (§4.2.3 exit condition).
    pub fn is_global_done(&self) -> bool {
        self.is_global_scan_done() && self.is_global_pull_done()
    }

    /// §8 invariant 5: pull-done count never exceeds scan-done count,
    /// except for ranks that reported with an error.
    pub fn pull_le_scan_invariant_holds(&self) -> bool {
        let scan_done_count = self.progress.values().filter(|p| p.scan_done).count();
        let pull_done_trusted = self
            .progress
            .values()
            .filter(|p| p.pull_done && (self.is_global_scan_done() || p.errno != 0))
            .count();
        pull_done_trusted <= scan_done_count
    }
}

/// Per-task progress state owned by a target.
#[derive(Debug, Clone)]
pub struct LocalTrackerState {
    pub pool_id: PoolId,
    pub map_version: u64,
    pub op: RebuildOp,
    /// Fencing value: a broadcast carrying a lower leader term than an
    /// in-flight tracker's is stale and must not override it (§4.3.1).
    pub leader_term: u64,
    pub scan_done: bool,
    /// This rank's own pull phase (data transfer), as determined by the
    /// local scan/pull engine (out of scope here) — what gets reported
    /// upward as `RankReport::pull_done`. Distinct from `global_done`,
    /// which is the leader's aggregate verdict received back via IV.
    pub pull_done: bool,
    /// Received from the leader via IV (§3 LocalTracker).
    pub global_scan_done: bool,
    pub global_done: bool,
    /// Per-container HLC epoch below which aggregation is suspended for
    /// the duration of this task (§3, §4.3.1, §4.3.3).
    pub rebuild_fence_hlc: Hlc,
    /// Stamped by `finalize` once this rank's rebuild has drained: the
    /// epoch at which background aggregation may resume (§4.3.3). `None`
    /// while the task is still running.
    pub rebuild_end_hlc: Option<Hlc>,
    pub abort: bool,
    pub re_report: bool,
    /// First non-zero error this rank's local rebuild has hit. Once set,
    /// this rank's `pull_done` report is final even if the global scan
    /// has not finished (§3 GlobalTracker invariant, §4.2.4).
    pub errno: i32,
    pub counters: AggregateCounters,
    last_acked: AggregateCounters,
}

impl LocalTrackerState {
    /// Creates a tracker on receipt of a scan-start broadcast, fencing
    /// aggregation at `now` (§4.3.1).
    pub fn new(pool_id: PoolId, map_version: u64, op: RebuildOp, leader_term: u64, now: Hlc) -> Self {
        LocalTrackerState {
            pool_id,
            map_version,
            op,
            leader_term,
            scan_done: false,
            pull_done: false,
            global_scan_done: false,
            global_done: false,
            rebuild_fence_hlc: now,
            rebuild_end_hlc: None,
            abort: false,
            re_report: false,
            errno: 0,
            counters: AggregateCounters::default(),
            last_acked: AggregateCounters::default(),
        }
    }

    /// Accepts a newer broadcast's leader term, taking precedence over
    /// this tracker if the incoming term is fresher (§4.3.1).
    pub fn adopt_if_fresher(&mut self, leader_term: u64) -> bool {
        if leader_term > self.leader_term {
            self.leader_term = leader_term;
            true
        } else {
            false
        }
    }

    /// Builds the delta (or, if `re_report` is set, the absolute value)
    /// to send upward, and advances the local "last acked" watermark for
    /// non-`re_report` sends (§4.3.2 step 3).
    pub fn counters_to_send(&mut self) -> AggregateCounters {
        if self.re_report {
            self.re_report = false;
            self.last_acked = self.counters;
            self.counters
        } else {
            let delta = AggregateCounters {
                to_rebuild_objs: self.counters.to_rebuild_objs.saturating_sub(self.last_acked.to_rebuild_objs),
                rebuilt_objs: self.counters.rebuilt_objs.saturating_sub(self.last_acked.rebuilt_objs),
                records: self.counters.records.saturating_sub(self.last_acked.records),
                bytes: self.counters.bytes.saturating_sub(self.last_acked.bytes),
                seconds: self.counters.seconds.saturating_sub(self.last_acked.seconds),
            };
            self.last_acked = self.counters;
            delta
        }
    }

    /// Clamps a freshly observed counter value to be non-decreasing,
    /// compensating for worker-local counter loss on target exclusion
    /// (§4.3.2 step 2).
    pub fn clamp_non_decreasing(previous: u64, observed: u64) -> u64 {
        previous.max(observed)
    }

    /// Clears the per-container fence back to zero and stamps the epoch
    /// at which aggregation of this epoch range may resume, once every
    /// child work-unit reference has drained (§3 LocalTracker, §4.3.3).
    pub fn finalize(&mut self, now: Hlc) {
        self.rebuild_fence_hlc = Hlc::ZERO;
        self.rebuild_end_hlc = Some(now);
    }
}
