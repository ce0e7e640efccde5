//! Process-level facade: one `MembershipEngine`, one `RebuildCoordinator`,
//! and one `TargetDriver`, wired so that a membership transition pokes
//! the rebuild side to re-read the pool map it cares about (§9).
//!
//! Everything else this crate touches — the RPC transport, the pool-map
//! service, the IV tree — is the caller's collaborator, injected at
//! `ClusterRuntime::init`.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use cluster_membership::{CtxIdx, MembershipEngine};
use cluster_rebuild::{reconcile_pool_map, RebuildCoordinator, TargetDriver};
use cluster_rpc::{FaultInjector, IvTree, PoolMapService, RebuildTransport, SwimTransport};
use cluster_types::{EventKind, HlcClock, PoolId, PoolMapSnapshot, Rank};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

pub use config::RuntimeConfig;

/// A running process's view of the cluster: membership plus rebuild,
/// sharing one HLC and wired together.
pub struct ClusterRuntime {
    pub membership: Arc<MembershipEngine>,
    pub rebuild: Arc<RebuildCoordinator>,
    pub target: Arc<TargetDriver>,
    pool_service: Arc<dyn PoolMapService>,
    tracked_pools: Mutex<Vec<PoolId>>,
    last_snapshot: Mutex<HashMap<PoolId, PoolMapSnapshot>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterRuntime {
    /// Wires up a fresh runtime: seeds the membership engine at
    /// `self_rank`, builds the rebuild coordinator and target driver, and
    /// subscribes the rebuild side to membership `Dead` transitions so a
    /// peer's failure is promptly reconciled against the pool map.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        self_rank: Rank,
        iv_ns_id: u64,
        config: RuntimeConfig,
        swim_transport: Arc<dyn SwimTransport>,
        rebuild_transport: Arc<dyn RebuildTransport>,
        pool_service: Arc<dyn PoolMapService>,
        iv: Arc<dyn IvTree>,
    ) -> Arc<Self> {
        let clock = Arc::new(HlcClock::new());
        let membership = MembershipEngine::init(self_rank, swim_transport, config.membership);
        let rebuild = RebuildCoordinator::new(
            self_rank,
            iv_ns_id,
            config.rebuild,
            rebuild_transport,
            Arc::clone(&pool_service),
            Arc::clone(&iv),
            Arc::clone(&clock),
        );
        let target = TargetDriver::new(self_rank, iv, clock, config.rebuild);

        let runtime = Arc::new(ClusterRuntime {
            membership,
            rebuild,
            target,
            pool_service,
            tracked_pools: Mutex::new(Vec::new()),
            last_snapshot: Mutex::new(HashMap::new()),
            dispatcher: Mutex::new(None),
        });

        let wired = Arc::clone(&runtime);
        runtime.membership.subscribe(move |event| {
            if event.kind != EventKind::Dead {
                return;
            }
            let runtime = Arc::clone(&wired);
            tokio::spawn(async move {
                runtime.reconcile_all().await;
            });
        });

        runtime
    }

    /// Enables the membership tick on `ctx` and starts the rebuild
    /// dispatcher loop, both as background tasks (§4.1.4 `enable`,
    /// §4.2.2).
    pub async fn start(self: &Arc<Self>, ctx: CtxIdx) -> cluster_types::Result<()> {
        self.membership.enable(ctx)?;
        let rebuild = Arc::clone(&self.rebuild);
        *self.dispatcher.lock().await = Some(tokio::spawn(rebuild.run_dispatcher()));
        Ok(())
    }

    /// Installs a fault injector on the membership engine (§4.1.6, §6.4).
    pub async fn set_fault_injector(&self, fault: Arc<dyn FaultInjector>) {
        self.membership.set_fault_injector(fault).await;
    }

    /// Registers `pool` for reconciliation against pool-map changes and
    /// membership `Dead` transitions (§4.4).
    pub async fn track_pool(&self, pool: PoolId) {
        self.tracked_pools.lock().await.push(pool);
    }

    /// Re-reads every tracked pool's current snapshot and schedules any
    /// rebuild tasks a changed target state implies (§4.4).
    pub async fn reconcile_all(&self) {
        let pools = self.tracked_pools.lock().await.clone();
        for pool in pools {
            let snapshot = match self.pool_service.snapshot(pool).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(pool, error = %e, "failed to read pool map during reconciliation");
                    continue;
                }
            };
            let mut cache = self.last_snapshot.lock().await;
            let previous = cache.get(&pool).cloned();
            reconcile_pool_map(&self.rebuild, previous.as_ref(), &snapshot).await;
            cache.insert(pool, snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use cluster_rpc::mock::MockNetwork;
    use cluster_rpc::{IvSyncMode, IvSyncPayload, ObjectsScanReply, ObjectsScanRequest};
    use cluster_types::{Hlc, RankReport, Result, TargetState, TargetTransitionRequest};

    struct FakeCollaborators {
        pool: StdMutex<PoolMapSnapshot>,
        transitions: StdMutex<Vec<(Rank, TargetTransitionRequest)>>,
    }

    #[async_trait]
    impl PoolMapService for FakeCollaborators {
        async fn leader_term(&self, _pool: PoolId) -> Result<u64> {
            Ok(1)
        }

        async fn snapshot(&self, pool: PoolId) -> Result<PoolMapSnapshot> {
            let snapshot = self.pool.lock().unwrap();
            if snapshot.pool_id == pool {
                Ok(snapshot.clone())
            } else {
                Err(cluster_types::Error::NonExistent)
            }
        }

        async fn request_transition(&self, _pool: PoolId, target: Rank, request: TargetTransitionRequest) -> Result<()> {
            self.transitions.lock().unwrap().push((target, request));
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
    impl RebuildTransport for FakeCollaborators {
        async fn objects_scan(&self, _req: ObjectsScanRequest) -> Result<ObjectsScanReply> {
            Ok(ObjectsScanReply { status: 0, stable_epoch: Hlc::from_raw(1) })
        }
    }

    #[async_trait]
    impl IvTree for FakeCollaborators {
        async fn broadcast_sync(&self, _pool: PoolId, _payload: IvSyncPayload) -> Result<()> {
            Ok(())
        }

        async fn send_report(&self, _pool: PoolId, _report: RankReport, _mode: IvSyncMode) -> Result<()> {
            Ok(())
        }
    }

    /// End-to-end per §8 scenario 1, scaled to a single peer: once SWIM
    /// itself (not a test-injected call) declares peer 1 `Dead`, the
    /// subscription wired in `init` re-reads the pool map — already
    /// updated to `Down` by the (out-of-scope) leader-election service
    /// reacting to the same failure — and schedules a `Fail` task that
    /// the dispatcher started by `start` carries through to a
    /// `DownToDownOut` transition request, with no explicit caller
    /// action beyond the initial wiring (§9, §4.4).
    #[tokio::test]
    async fn a_swim_detected_failure_reconciles_into_a_completed_fail_task() {
        const POOL: PoolId = 1;
        let net = MockNetwork::new();
        let self_transport = net.register(0);
        net.register(1);
        net.register(2);

        // Only peer 1 is a pool target: `GlobalTracker` considers every
        // rank in the pool snapshot, so keeping ranks 0/2 (relay
        // scaffolding for the failure-detection side, not rebuild
        // targets) out of it lets the task reach `is_global_done` the
        // same way the coordinator's own single-target tests do. `UpIn`
        // is the steady-state baseline (§4.4 schedules nothing for it),
        // so the very first `reconcile_all` call below queues no task of
        // its own before the failure is injected.
        let mut targets = BTreeMap::new();
        targets.insert(1u64, (TargetState::UpIn, 1));
        let collaborators = Arc::new(FakeCollaborators {
            pool: StdMutex::new(PoolMapSnapshot {
                pool_id: POOL,
                version: 1,
                targets,
                self_heal_enabled: true,
            }),
            transitions: StdMutex::new(Vec::new()),
        });

        let mut config = RuntimeConfig::default();
        config.membership.default_ping_timeout_ms = 10;
        config.membership.suspect_timeout_ms = 60;
        config.rebuild.check_interval_ms = 5;

        let runtime = ClusterRuntime::init(
            0,
            1,
            config,
            self_transport,
            collaborators.clone(),
            collaborators.clone(),
            collaborators.clone(),
        );
        runtime.membership.rank_add(1).await.unwrap();
        runtime.membership.rank_add(2).await.unwrap();
        runtime.track_pool(POOL).await;

        // Establish the `UpIn` baseline so the later `Dead`-triggered
        // reconcile sees a genuine state change rather than treating the
        // first-ever snapshot as one.
        runtime.reconcile_all().await;
        assert_eq!(runtime.rebuild.query(POOL).await, cluster_rebuild::QueryResult { done: true, errno: 0 });

        // The external pool-map service marks the target `Down` ahead of
        // SWIM detecting the same failure, same as a real deployment
        // where that service reacts to other signals too.
        collaborators.pool.lock().unwrap().targets.insert(1, (TargetState::Down, 2));

        // Block every path to peer 1, direct and indirect, so it can't be
        // saved by a successful relay the way §8 scenario 2 covers; peer
        // 2 stays fully reachable so probes to it keep succeeding and no
        // network-outage suppression kicks in.
        net.block(0, 1);
        net.block(2, 1);
        runtime.start(0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(runtime.membership.state_get(1).await.unwrap().status, cluster_types::MemberStatus::Dead);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let result = runtime.rebuild.query(POOL).await;
        assert_eq!(result, cluster_rebuild::QueryResult { done: true, errno: 0 });
        assert!(collaborators
            .transitions
            .lock()
            .unwrap()
            .contains(&(1, TargetTransitionRequest::DownToDownOut)));
    }
}
