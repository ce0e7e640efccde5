//! SWIM-style gossip membership engine (§4.1): failure detection with
//! direct/indirect probing, piggybacked dissemination, and an adaptive
//! ping timeout.
//!
//! The wire format and the RPC/fault-injection collaborators this engine
//! invokes through live in `cluster-rpc`; this crate owns only the
//! protocol state machine and its concurrency.

pub mod config;
pub mod delay;
pub mod engine;
pub mod events;
pub mod protocol;

use cluster_types::{Error, Result};

pub use config::MembershipConfig;
pub use engine::{CtxIdx, MembershipEngine};
pub use events::EventSubscribers;
