//! The rebuild coordinator's three external collaborators (§1, §2): the
//! RPC transport (broadcast/unicast), the pool-map/leader-term service,
//! and the IV dissemination tree. All three are out of scope in the
//! sense that their internals aren't modeled here; these traits are the
//! seams the coordinator invokes through.

use async_trait::async_trait;
use cluster_types::{Error, PoolId, PoolMapSnapshot, Rank, Result, TargetTransitionRequest};

use crate::rebuild_wire::{ObjectsScanReply, ObjectsScanRequest};

/// Broadcast/unicast RPC used by the leader to start a scan and by
/// targets to reply.
#[async_trait]
pub trait RebuildTransport: Send + Sync {
    /// Broadcasts `OBJECTS_SCAN` to every id in `req.target_ids` and
    /// returns the aggregated reply (§6.2, §4.2.3 step 5).
    async fn objects_scan(&self, req: ObjectsScanRequest) -> Result<ObjectsScanReply>;
}

/// The external pool-service collaborator: leader-term lookup and the
/// topology transitions the coordinator requests at finalize.
#[async_trait]
pub trait PoolMapService: Send + Sync {
    /// Resolves the current leader term for `pool` (§4.2.3 step 2).
    async fn leader_term(&self, pool: PoolId) -> Result<u64>;

    /// Reads the current topology snapshot for `pool`.
    async fn snapshot(&self, pool: PoolId) -> Result<PoolMapSnapshot>;

    /// Requests a target transition at task finalize (§4.2.3 step 7).
    /// The pool-service performs the actual state change; this call only
    /// requests it.
    async fn request_transition(&self, pool: PoolId, target: Rank, request: TargetTransitionRequest) -> Result<()>;

    /// Broadcasts the latest pool map by version, used before dispatch
    /// (§4.2.3 step 3). Returns `Error::StaleGroupVersion` on a stale
    /// group version, which the caller retries after a delay; any other
    /// error is fatal to the task.
    async fn broadcast_pool_map(&self, pool: PoolId, version: u64) -> Result<()>;

    /// Fetches and broadcasts pool properties, including whether
    /// self-healing is enabled (§4.2.3 step 4, §4.4).
    async fn broadcast_pool_properties(&self, pool: PoolId) -> Result<()>;
}

/// A structured payload sent leader→targets or target→leader through the
/// IV tree, carrying just the fields the coordinator needs (§4.2.3,
/// §4.2.4, §4.3.2). The IV tree's own delivery/sync semantics
/// (shortcut-to-root, lazy-sync) are a delivery option on the send call,
/// not part of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvSyncPayload {
    pub stable_epoch: cluster_types::Hlc,
    pub global_scan_done: bool,
    pub global_done: bool,
    pub leader_term: u64,
}

/// Delivery options on an IV send, named after the teacher's IV tree
/// vocabulary (§4.3.2 step 4, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvSyncMode {
    /// Deliver straight to the tree root (the leader) rather than
    /// fanning out along the tree.
    ShortcutToRoot,
    /// No extra synchronization beyond normal delivery.
    SyncNone,
}

/// The IV dissemination tree: eventual delivery of leader→targets and
/// targets→leader structured updates.
#[async_trait]
pub trait IvTree: Send + Sync {
    /// Leader→targets: sync the current stable epoch / global-done state.
    async fn broadcast_sync(&self, pool: PoolId, payload: IvSyncPayload) -> Result<()>;

    /// Target→leader: push this rank's progress report.
    async fn send_report(&self, pool: PoolId, report: cluster_types::RankReport, mode: IvSyncMode) -> Result<()>;
}

/// Maps a collaborator failure that the coordinator must treat as fatal
/// vs. retryable, per §7's error table.
pub fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::StaleGroupVersion)
}
