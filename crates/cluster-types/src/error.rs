//! Error kinds shared by the membership engine and the rebuild coordinator.
//!
//! Mirrors the error table of the failure-detection/rebuild core: each
//! variant names a kind from the design's error-handling table, together
//! with the policy callers are expected to apply (retry, surface, drop
//! silently). The policy itself lives with the caller; this enum only
//! carries the classification.

use thiserror::Error;

/// Errors produced by the membership engine and the rebuild coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Engine or tracker used before initialization.
    #[error("not initialized")]
    Uninit,

    /// Self was removed from membership; engine is shutting down.
    #[error("shutdown")]
    Shutdown,

    /// RPC deadline elapsed; counted as a probe failure only, never
    /// surfaced past the probe state machine.
    #[error("timed out")]
    TimedOut,

    /// Caller lacks permission for the requested operation.
    #[error("not permitted")]
    NoPerm,

    /// A referenced handle (context, tracker, RPC) no longer exists.
    #[error("invalid handle")]
    NoHandle,

    /// Operation already in progress (e.g. duplicate init, duplicate IREQ
    /// for the same indirect-ping target).
    #[error("already in progress")]
    Already,

    /// Lookup miss (unknown rank, unknown pool, unknown task).
    #[error("does not exist")]
    NonExistent,

    /// Out of memory (membership list at capacity).
    #[error("out of memory")]
    NoMem,

    /// Bad opcode or argument; never retried.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// Stale pool-map group version observed on a broadcast; retry after
    /// a short delay.
    #[error("stale group version")]
    StaleGroupVersion,

    /// The calling rank lost (or never held) leadership.
    #[error("not leader")]
    NotLeader,

    /// The reconfiguration/rebuild was canceled by an explicit stop.
    #[error("canceled")]
    Canceled,

    /// Pool redundancy factor breached beyond the configured threshold.
    #[error("redundancy factor breached")]
    RedundancyFactorBreach,

    /// Underlying collaborator (RPC, pool-map service, IV tree) failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Result type used throughout the membership/rebuild core.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors that only ever feed a probe/state machine and must
    /// never be surfaced to an external caller (§7).
    pub fn is_probe_failure_only(&self) -> bool {
        matches!(self, Error::TimedOut)
    }

    /// True for errors that mean "drop the task silently, a new leader
    /// will restart it" rather than recording a failure (§4.2.3, §7).
    pub fn is_leadership_loss(&self) -> bool {
        matches!(self, Error::NotLeader | Error::Canceled)
    }
}
