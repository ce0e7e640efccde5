//! The membership engine's RPC collaborator: sending PING/IREQ and
//! learning the local HLC. The transport itself (framing, timeouts,
//! broadcast trees) is out of scope (§1); this trait is the seam the
//! engine invokes through.

use async_trait::async_trait;
use cluster_types::{Hlc, Rank};

use crate::swim_wire::{SwimReply, SwimRequest};

/// RPC send failures surface as this engine-local error; the membership
/// state machine treats every variant as a probe failure (§4.1.6) and
/// never propagates it to an external caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    TimedOut,
    #[error("probe send failed")]
    SendFailed,
    #[error("fault injected")]
    Injected,
}

/// Both opcodes use the transport's queue-front flag so membership
/// traffic bypasses ordinary request queuing (§6.1); the trait exposes a
/// single send method per opcode and leaves queue-front framing to the
/// implementation.
#[async_trait]
pub trait SwimTransport: Send + Sync {
    /// This process's own rank.
    fn self_rank(&self) -> Rank;

    /// Current HLC reading, stamped into the RPC header on send and used
    /// to compute one-way delay on receive (§6.1).
    fn now_hlc(&self) -> Hlc;

    /// Sends a direct PING to `dest` and awaits its reply, bounded by
    /// `timeout`.
    async fn ping(&self, dest: Rank, req: SwimRequest, timeout: std::time::Duration) -> Result<SwimReply, ProbeError>;

    /// Sends an IREQ to `relay`, asking it to ping `req.swim_id` on this
    /// node's behalf, bounded by `timeout` (conventionally `2 *
    /// ping_timeout`, §5).
    async fn ireq(&self, relay: Rank, req: SwimRequest, timeout: std::time::Duration) -> Result<SwimReply, ProbeError>;
}

/// Fault-injection hook (§4.1.6, §6.4): `SWIM_FAIL_DROP_RPC` with
/// argument string `"rank=<id>,delay=<sec>"`. Implemented as a trait so
/// it composes with any `SwimTransport` rather than living behind a
/// global variable, per §9's design note.
pub trait FaultInjector: Send + Sync {
    /// Returns `Some(delay)` if probes to `rank` should be dropped after
    /// `delay` has elapsed since it was armed, computed from the observed
    /// one-way latency so the simulated failure aligns with delay-based
    /// timeout expiry.
    fn should_drop(&self, rank: Rank) -> Option<std::time::Duration>;
}

/// Parses the `"rank=<id>,delay=<sec>"` argument string from
/// `SWIM_FAIL_DROP_RPC` (§6.4).
pub fn parse_fault_args(args: &str) -> Option<(Rank, u64)> {
    let mut rank = None;
    let mut delay = None;
    for part in args.split(',') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("rank=") {
            rank = v.parse().ok();
        } else if let Some(v) = part.strip_prefix("delay=") {
            delay = v.parse().ok();
        }
    }
    Some((rank?, delay?))
}
