//! OBJECTS_SCAN RPC: the collective broadcast the leader uses to start a
//! rebuild task on every member of a pool (§6.2).

use cluster_types::{Hlc, PoolId, Rank, RebuildOp};

/// Request broadcast to every member of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectsScanRequest {
    pub pool_id: PoolId,
    pub iv_ns_id: u64,
    pub leader_term: u64,
    pub map_version: u64,
    pub target_ids: Vec<Rank>,
    pub op: RebuildOp,
    pub master_rank: Rank,
}

/// Per-child reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectsScanReply {
    pub status: i32,
    pub stable_epoch: Hlc,
}

/// Aggregates per-child replies into one collective result: status is the
/// first non-zero status observed, `stable_epoch` is the max across
/// children (§6.2).
pub fn aggregate_scan_replies(replies: &[ObjectsScanReply]) -> ObjectsScanReply {
    let status = replies.iter().map(|r| r.status).find(|&s| s != 0).unwrap_or(0);
    let stable_epoch = replies
        .iter()
        .map(|r| r.stable_epoch)
        .max()
        .unwrap_or(Hlc::ZERO);
    ObjectsScanReply { status, stable_epoch }
}
