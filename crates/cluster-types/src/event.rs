//! Membership state-change events.

use crate::member::Rank;

/// Source of an emitted event. Only one source exists today, but the
/// field mirrors the wire-level `source=SWIM` tag called out in §6.3 so a
/// future non-SWIM detector could share the same event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Swim,
}

/// The kind of transition that produced an event. Only `Alive` and `Dead`
/// transitions are externally visible; `Suspect` is internal bookkeeping
/// (§4.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Alive,
    Dead,
}

/// An externally-visible membership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipEvent {
    pub rank: Rank,
    pub incarnation: u64,
    pub source: EventSource,
    pub kind: EventKind,
}
