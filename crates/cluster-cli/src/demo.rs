//! An in-process demo cluster: a single `ClusterRuntime` wired to
//! trivial in-memory collaborators, so the CLI has something to
//! operate on without a real deployment behind it.
//!
//! This plays the same role for `cluster-cli` that `kimberlite-sim`
//! plays for `kimberlite-cli`: a stand-in world the commands below can
//! poke at, not a production collaborator implementation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cluster_rpc::mock::MockNetwork;
use cluster_rpc::{IvSyncMode, IvSyncPayload, IvTree, ObjectsScanReply, ObjectsScanRequest, PoolMapService, RebuildTransport};
use cluster_runtime::{ClusterRuntime, RuntimeConfig};
use cluster_types::{Hlc, PoolId, PoolMapSnapshot, Rank, RankReport, Result, TargetState, TargetTransitionRequest};

/// The demo pool this CLI seeds: five targets, one already down.
const DEMO_POOL: PoolId = 1;
const SELF_RANK: Rank = 0;
const PEER_RANKS: [Rank; 3] = [1, 2, 3];

/// A fixed topology snapshot plus a log of every transition request and
/// rebuild report the demo has observed, in place of a real pool
/// service / IV tree.
#[derive(Default)]
struct DemoState {
    pool: PoolMapSnapshot,
    transitions: Vec<(Rank, TargetTransitionRequest)>,
    reports: Vec<RankReport>,
}

struct DemoCollaborators {
    state: Mutex<DemoState>,
}

#[async_trait]
impl PoolMapService for DemoCollaborators {
    async fn leader_term(&self, _pool: PoolId) -> Result<u64> {
        Ok(1)
    }

    async fn snapshot(&self, pool: PoolId) -> Result<PoolMapSnapshot> {
        let state = self.state.lock().unwrap();
        if pool == state.pool.pool_id {
            Ok(state.pool.clone())
        } else {
            Err(cluster_types::Error::NonExistent)
        }
    }

    async fn request_transition(&self, _pool: PoolId, target: Rank, request: TargetTransitionRequest) -> Result<()> {
        self.state.lock().unwrap().transitions.push((target, request));
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
impl RebuildTransport for DemoCollaborators {
    async fn objects_scan(&self, _req: ObjectsScanRequest) -> Result<ObjectsScanReply> {
        Ok(ObjectsScanReply { status: 0, stable_epoch: Hlc::from_raw(1) })
    }
}

#[async_trait]
impl IvTree for DemoCollaborators {
    async fn broadcast_sync(&self, _pool: PoolId, _payload: IvSyncPayload) -> Result<()> {
        Ok(())
    }

    async fn send_report(&self, _pool: PoolId, report: RankReport, _mode: IvSyncMode) -> Result<()> {
        self.state.lock().unwrap().reports.push(report);
        Ok(())
    }
}

/// Builds and starts a demo `ClusterRuntime`: self plus three peers on a
/// `MockNetwork`, one pool with a failed target already queued for a
/// rebuild.
pub async fn spawn() -> anyhow::Result<std::sync::Arc<ClusterRuntime>> {
    let net = MockNetwork::new();
    let transport = net.register(SELF_RANK);
    for peer in PEER_RANKS {
        net.register(peer);
    }

    let mut targets = BTreeMap::new();
    targets.insert(SELF_RANK, (TargetState::Up, 1));
    targets.insert(PEER_RANKS[0], (TargetState::Up, 1));
    targets.insert(PEER_RANKS[1], (TargetState::Down, 1));
    targets.insert(PEER_RANKS[2], (TargetState::Up, 1));

    let collaborators = std::sync::Arc::new(DemoCollaborators {
        state: Mutex::new(DemoState {
            pool: PoolMapSnapshot {
                pool_id: DEMO_POOL,
                version: 1,
                targets,
                self_heal_enabled: true,
            },
            transitions: Vec::new(),
            reports: Vec::new(),
        }),
    });

    let runtime = ClusterRuntime::init(
        SELF_RANK,
        1,
        RuntimeConfig::default(),
        transport,
        collaborators.clone(),
        collaborators.clone(),
        collaborators,
    );
    runtime.start(0).await?;
    for peer in PEER_RANKS {
        runtime.membership.rank_add(peer).await?;
    }
    runtime.track_pool(DEMO_POOL).await;
    runtime.reconcile_all().await;

    Ok(runtime)
}
