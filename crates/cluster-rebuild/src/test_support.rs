//! In-memory collaborator mocks for `cluster-rebuild`'s own tests, in the
//! same spirit as `cluster_rpc::mock`'s `MockNetwork` for the membership
//! engine's tests.

#![cfg(test)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cluster_types::{Error, Hlc, HlcClock, PoolId, PoolMapSnapshot, Rank, RankReport, Result, TargetState, TargetTransitionRequest};
use cluster_rpc::{IvSyncMode, IvSyncPayload, IvTree, ObjectsScanReply, ObjectsScanRequest, PoolMapService, RebuildTransport};

use crate::config::RebuildConfig;
use crate::coordinator::RebuildCoordinator;

struct Inner {
    pools: BTreeMap<PoolId, PoolMapSnapshot>,
    transitions: Vec<(Rank, TargetTransitionRequest)>,
    next_scan_status: i32,
    reports: Vec<RankReport>,
    leader_term: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            pools: BTreeMap::new(),
            transitions: Vec::new(),
            next_scan_status: 0,
            reports: Vec::new(),
            leader_term: 1,
        }
    }
}

/// Shared mock state backing `PoolMapService`, `RebuildTransport`, and
/// `IvTree` for one test.
pub struct MockCollaborators {
    inner: Mutex<Inner>,
}

impl MockCollaborators {
    pub fn new() -> Arc<Self> {
        Arc::new(MockCollaborators {
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Seeds `pool`'s snapshot with the given `(rank, state, version)`
    /// targets.
    pub fn seed_pool(&self, pool: PoolId, targets: impl IntoIterator<Item = (Rank, TargetState, u64)>, self_heal_enabled: bool) {
        let snapshot = PoolMapSnapshot {
            pool_id: pool,
            version: 1,
            targets: targets.into_iter().map(|(r, s, v)| (r, (s, v))).collect(),
            self_heal_enabled,
        };
        self.inner.lock().unwrap().pools.insert(pool, snapshot);
    }

    /// Makes the next `objects_scan` call return this non-zero status.
    pub fn fail_next_scan(&self, status: i32) {
        self.inner.lock().unwrap().next_scan_status = status;
    }

    /// Changes the term `leader_term` reports from now on, simulating a
    /// leadership change observed mid-rebuild.
    pub fn bump_leader_term(&self, term: u64) {
        self.inner.lock().unwrap().leader_term = term;
    }

    pub fn was_transitioned(&self, rank: Rank, request: TargetTransitionRequest) -> bool {
        self.inner.lock().unwrap().transitions.contains(&(rank, request))
    }

    /// Every `RankReport` sent via `IvTree::send_report`, in send order.
    pub fn sent_reports(&self) -> Vec<RankReport> {
        self.inner.lock().unwrap().reports.clone()
    }
}

#[async_trait]
impl PoolMapService for MockCollaborators {
    async fn leader_term(&self, _pool: PoolId) -> Result<u64> {
        Ok(self.inner.lock().unwrap().leader_term)
    }

    async fn snapshot(&self, pool: PoolId) -> Result<PoolMapSnapshot> {
        self.inner.lock().unwrap().pools.get(&pool).cloned().ok_or(Error::NonExistent)
    }

    async fn request_transition(&self, _pool: PoolId, target: Rank, request: TargetTransitionRequest) -> Result<()> {
        self.inner.lock().unwrap().transitions.push((target, request));
        Ok(())
    }

    async fn broadcast_pool_map(&self, _pool: PoolId, _version: u64) -> Result<()> {
        Ok(())
    }

    async fn broadcast_pool_properties(&self, _pool: PoolId) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RebuildTransport for MockCollaborators {
    async fn objects_scan(&self, _req: ObjectsScanRequest) -> Result<ObjectsScanReply> {
        let mut inner = self.inner.lock().unwrap();
        let status = inner.next_scan_status;
        inner.next_scan_status = 0;
        Ok(ObjectsScanReply {
            status,
            stable_epoch: Hlc::from_raw(1),
        })
    }
}

#[async_trait]
impl IvTree for MockCollaborators {
    async fn broadcast_sync(&self, _pool: PoolId, _payload: IvSyncPayload) -> Result<()> {
        Ok(())
    }

    async fn send_report(&self, _pool: PoolId, report: RankReport, _mode: IvSyncMode) -> Result<()> {
        self.inner.lock().unwrap().reports.push(report);
        Ok(())
    }
}

/// A coordinator wired to `MockCollaborators`, with fast intervals so
/// tests don't wait on real-world timeouts.
pub struct TestHarness {
    pub coordinator: Arc<RebuildCoordinator>,
    pub collaborators: Arc<MockCollaborators>,
}

impl TestHarness {
    pub fn new() -> Self {
        let collaborators = MockCollaborators::new();
        let config = RebuildConfig {
            check_interval_ms: 5,
            stale_retry_delay_ms: 5,
            status_log_interval_ms: 1_000,
            ..RebuildConfig::default()
        };
        let coordinator = RebuildCoordinator::new(
            0,
            1,
            config,
            collaborators.clone(),
            collaborators.clone(),
            collaborators.clone(),
            Arc::new(HlcClock::new()),
        );
        TestHarness { coordinator, collaborators }
    }
}
