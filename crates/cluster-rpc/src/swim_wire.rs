//! SWIM RPC wire format: protocol "swim", version 2, opcodes PING (0) and
//! IREQ (1) (§6.1).
//!
//! Both opcodes share the same request/reply shape. `UpdateRecord` is
//! serialized as a fixed-width raw byte copy so the wire layout equals the
//! in-memory struct layout; every participant must agree on record size
//! and byte order, which is why the layout is pinned down explicitly here
//! rather than left to a general-purpose serializer.

use cluster_types::{MemberStatus, Rank, UpdateRecord};

/// Opcode distinguishing a direct ping from an indirect-ping request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SwimOpcode {
    Ping = 0,
    Ireq = 1,
}

/// Fixed width of one `UpdateRecord` on the wire: id(8) + incarnation(8) +
/// status(1) + delay_ms(4) + 3 reserved bytes = 24 bytes, a multiple of 8
/// so arrays of records stay naturally aligned.
pub const WIRE_RECORD_SIZE: usize = 24;

/// Encodes a record into its fixed-width wire representation.
pub fn encode_update_record(record: &UpdateRecord) -> [u8; WIRE_RECORD_SIZE] {
    let mut buf = [0u8; WIRE_RECORD_SIZE];
    buf[0..8].copy_from_slice(&record.id.to_le_bytes());
    buf[8..16].copy_from_slice(&record.incarnation.to_le_bytes());
    buf[16] = record.status as u8;
    buf[17..21].copy_from_slice(&record.delay_ms.to_le_bytes());
    // buf[21..24] reserved, left zeroed.
    buf
}

/// Decodes a fixed-width wire record back into an `UpdateRecord`.
///
/// Returns `None` if the status byte does not correspond to a known
/// `MemberStatus` discriminant.
pub fn decode_update_record(buf: &[u8; WIRE_RECORD_SIZE]) -> Option<UpdateRecord> {
    let id = Rank::from_le_bytes(buf[0..8].try_into().ok()?);
    let incarnation = u64::from_le_bytes(buf[8..16].try_into().ok()?);
    let status = match buf[16] {
        0 => MemberStatus::Inactive,
        1 => MemberStatus::Alive,
        2 => MemberStatus::Suspect,
        3 => MemberStatus::Dead,
        _ => return None,
    };
    let delay_ms = u32::from_le_bytes(buf[17..21].try_into().ok()?);
    Some(UpdateRecord {
        id,
        incarnation,
        status,
        delay_ms,
    })
}

/// Request body shared by PING and IREQ.
///
/// For PING, `swim_id` is unused (echoes the destination). For IREQ,
/// `swim_id` names the indirect target the relay should ping on the
/// initiator's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwimRequest {
    pub swim_id: Rank,
    pub updates: Vec<UpdateRecord>,
}

/// Reply body shared by PING and IREQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwimReply {
    pub rc: i32,
    pub pad: i32,
    pub updates: Vec<UpdateRecord>,
}

impl SwimReply {
    /// A reply indicating success with the given piggyback set.
    pub fn ok(updates: Vec<UpdateRecord>) -> Self {
        SwimReply { rc: 0, pad: 0, updates }
    }

    /// A reply indicating a duplicate IREQ was absorbed (§4.1.1, §7
    /// `ALREADY`).
    pub fn already() -> Self {
        SwimReply {
            rc: cluster_types::Error::Already.as_rc(),
            pad: 0,
            updates: Vec::new(),
        }
    }
}

/// RPC header fields relevant to delay measurement: source/destination
/// rank and the sender's HLC at send time, used by the receiver to
/// compute one-way delay as `local_hlc - sender_hlc` when positive
/// (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwimHeader {
    pub src_rank: Rank,
    pub dst_rank: Rank,
    pub sender_hlc: cluster_types::Hlc,
}

trait ErrnoCode {
    fn as_rc(&self) -> i32;
}

impl ErrnoCode for cluster_types::Error {
    fn as_rc(&self) -> i32 {
        use cluster_types::Error::*;
        match self {
            Uninit => -1,
            Shutdown => -2,
            TimedOut => -3,
            NoPerm => -4,
            NoHandle => -5,
            Already => -6,
            NonExistent => -7,
            NoMem => -8,
            Invalid(_) => -9,
            StaleGroupVersion => -10,
            NotLeader => -11,
            Canceled => -12,
            RedundancyFactorBreach => -13,
            Collaborator(_) => -14,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_record_round_trips_through_wire_bytes() {
        let record = UpdateRecord {
            id: 42,
            incarnation: 7,
            status: MemberStatus::Suspect,
            delay_ms: 1234,
        };
        let encoded = encode_update_record(&record);
        assert_eq!(encoded.len(), WIRE_RECORD_SIZE);
        let decoded = decode_update_record(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn unknown_status_byte_decodes_to_none() {
        let mut buf = [0u8; WIRE_RECORD_SIZE];
        buf[16] = 0xFF;
        assert!(decode_update_record(&buf).is_none());
    }
}
