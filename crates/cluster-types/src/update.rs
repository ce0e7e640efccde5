//! Gossip payload unit and the dissemination queue that bounds its
//! retransmission.

use serde::{Deserialize, Serialize};

use crate::member::{MemberStatus, Rank};

/// Unit of gossip payload, piggybacked on PING/IREQ traffic.
///
/// Serialized as a fixed-width record on the wire (§6.1): `cluster-rpc`
/// owns the raw byte layout, this type is the in-memory counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub id: Rank,
    pub incarnation: u64,
    pub status: MemberStatus,
    pub delay_ms: u32,
}

/// A dissemination-queue entry: an update plus the number of times it has
/// already been piggybacked.
#[derive(Debug, Clone)]
struct QueuedUpdate {
    record: UpdateRecord,
    retransmits: u32,
}

/// Bounded gossip dissemination queue.
///
/// Each update is retransmitted at most `k * log2(n)` times (rounded up),
/// per the design's "K·log(N) bounded" retransmit counter, after which it
/// is dropped: by then it has, with high probability, reached every live
/// member through some path.
#[derive(Debug)]
pub struct DisseminationQueue {
    entries: Vec<QueuedUpdate>,
    k: u32,
}

impl DisseminationQueue {
    /// Creates an empty queue. `k` is the retransmit multiplier (the `K`
    /// in `K·log(N)`).
    pub fn new(k: u32) -> Self {
        Self {
            entries: Vec::new(),
            k,
        }
    }

    fn retransmit_limit(&self, member_count: usize) -> u32 {
        let log_n = (member_count.max(2) as f64).log2().ceil() as u32;
        self.k.saturating_mul(log_n.max(1))
    }

    /// Enqueues a fresh update (or replaces a stale one for the same id
    /// carrying a lower incarnation), resetting its retransmit counter.
    pub fn push(&mut self, record: UpdateRecord) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.record.id == record.id) {
            if record.incarnation >= existing.record.incarnation {
                existing.record = record;
                existing.retransmits = 0;
            }
            return;
        }
        self.entries.push(QueuedUpdate {
            record,
            retransmits: 0,
        });
    }

    /// Draws up to `max_count` updates to piggyback on an outgoing
    /// PING/IREQ, bumping their retransmit counters and dropping any that
    /// have reached the retransmit limit for the given cluster size.
    pub fn drain_for_piggyback(&mut self, max_count: usize, member_count: usize) -> Vec<UpdateRecord> {
        let limit = self.retransmit_limit(member_count);
        let mut picked = Vec::new();
        for entry in &mut self.entries {
            if picked.len() >= max_count {
                break;
            }
            entry.retransmits += 1;
            picked.push(entry.record);
        }
        self.entries.retain(|e| e.retransmits < limit);
        picked
    }

    /// Number of updates still pending dissemination.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no updates are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
