//! Hybrid logical clock.
//!
//! A monotonic, loosely-synchronized timestamp used throughout the core for
//! three unrelated purposes that all want the same primitive:
//!
//! - seeding and bumping a member's `incarnation` on rejoin or
//!   self-suspicion,
//! - fencing a container's rebuild aggregation window (`rebuild_fence`),
//! - measuring one-way probe delay (`local_hlc - sender_hlc`).
//!
//! The clock never goes backwards: `now()` always returns a value strictly
//! greater than the last value it returned, and `observe()` folds in a
//! peer's timestamp without losing that property.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A hybrid logical clock reading.
///
/// Packs a millisecond wall-clock component in the high bits and a logical
/// counter in the low bits so that `Hlc` values remain totally ordered and
/// `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hlc(u64);

const LOGICAL_BITS: u32 = 16;
const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

impl Hlc {
    /// The zero value, used as a sentinel ("no fence installed").
    pub const ZERO: Hlc = Hlc(0);

    /// Builds a reading directly from a packed `u64`, e.g. after receiving
    /// one over the wire.
    pub const fn from_raw(raw: u64) -> Self {
        Hlc(raw)
    }

    /// Returns the packed representation for wire transmission.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// The millisecond wall-clock component.
    pub const fn physical_ms(self) -> u64 {
        self.0 >> LOGICAL_BITS
    }

    /// The logical tie-breaking component.
    pub const fn logical(self) -> u32 {
        (self.0 & LOGICAL_MASK) as u32
    }

    fn pack(physical_ms: u64, logical: u32) -> Self {
        Hlc((physical_ms << LOGICAL_BITS) | u64::from(logical & LOGICAL_MASK as u32))
    }

    /// Saturating difference in milliseconds, used to compute one-way
    /// probe delay: `local_hlc - sender_hlc` when positive, zero otherwise.
    pub fn saturating_delay_ms(self, earlier: Hlc) -> u64 {
        self.physical_ms().saturating_sub(earlier.physical_ms())
    }

    /// Adds a millisecond offset, used by the net-glitch adjustment to
    /// shift a suspicion deadline forward.
    pub fn add_ms(self, ms: u64) -> Hlc {
        Hlc::pack(self.physical_ms() + ms, self.logical())
    }
}

/// Process-wide HLC generator.
///
/// Mirrors the teacher's cluster-wide synchronized clock in spirit (a
/// single authority producing monotonic timestamps) but scoped to a single
/// process, since cross-node clock synchronization is the RPC/pool-map
/// collaborators' concern, out of scope here.
#[derive(Debug, Default)]
pub struct HlcClock {
    last: AtomicU64,
}

impl HlcClock {
    /// Creates a new clock with no prior readings.
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    fn wall_clock_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Returns a fresh reading, strictly greater than every prior reading
    /// this clock has produced or observed.
    pub fn now(&self) -> Hlc {
        let wall = Self::wall_clock_ms();
        loop {
            let prev = self.last.load(Ordering::Acquire);
            let prev_hlc = Hlc(prev);
            let next = if wall > prev_hlc.physical_ms() {
                Hlc::pack(wall, 0)
            } else {
                Hlc::pack(prev_hlc.physical_ms(), prev_hlc.logical() + 1)
            };
            if self
                .last
                .compare_exchange(prev, next.0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Folds a peer's timestamp into the clock so that a subsequent
    /// `now()` is guaranteed greater than `peer`, without regressing the
    /// physical component below the local wall clock.
    pub fn observe(&self, peer: Hlc) {
        loop {
            let prev = self.last.load(Ordering::Acquire);
            let prev_hlc = Hlc(prev);
            if peer <= prev_hlc {
                return;
            }
            let bumped = Hlc::pack(peer.physical_ms(), peer.logical() + 1);
            if self
                .last
                .compare_exchange(prev, bumped.0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_strictly_increasing() {
        let clock = HlcClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn observe_never_regresses() {
        let clock = HlcClock::new();
        let t0 = clock.now();
        let future = Hlc::from_raw(t0.as_raw()).add_ms(10_000);
        clock.observe(future);
        let t1 = clock.now();
        assert!(t1 > future);
    }

    #[test]
    fn saturating_delay_is_zero_when_negative() {
        let later = Hlc::pack(100, 0);
        let earlier = Hlc::pack(50, 0);
        assert_eq!(later.saturating_delay_ms(earlier), 50);
        assert_eq!(earlier.saturating_delay_ms(later), 0);
    }
}
