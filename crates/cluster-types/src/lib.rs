//! Shared data model for the membership engine and the rebuild
//! coordinator: members, the cyclic membership list, gossip update
//! records, the hybrid logical clock, rebuild tasks, and per-task
//! progress trackers.
//!
//! This crate has no networking and no async runtime dependency; it is
//! pure state plus the invariant-preserving operations on that state.
//! `cluster-rpc` defines the wire format and collaborator traits built on
//! top of these types, and `cluster-membership`/`cluster-rebuild` own the
//! concurrency (locks, tokio tasks) around them.

pub mod error;
pub mod event;
pub mod hlc;
pub mod member;
pub mod membership_list;
pub mod poolmap;
pub mod rebuild;
pub mod tracker;
pub mod update;

pub use error::{Error, Result};
pub use event::{EventKind, EventSource, MembershipEvent};
pub use hlc::{Hlc, HlcClock};
pub use member::{Member, MemberStatus, Rank};
pub use membership_list::MembershipList;
pub use poolmap::{PoolMapSnapshot, TargetState, TargetTransitionRequest};
pub use rebuild::{PoolId, RebuildOp, RebuildTask, TaskStatus};
pub use tracker::{AggregateCounters, GlobalTrackerState, LocalTrackerState, RankProgress, RankReport};
pub use update::{DisseminationQueue, UpdateRecord};
