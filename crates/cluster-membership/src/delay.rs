//! Delay tracking and adaptive ping timeout (§4.1.3).

use cluster_types::MembershipList;

use crate::config::MembershipConfig;

/// Folds a newly observed delay into the EWMA for one member:
/// `L ← L ? (L + x) / 2 : x`.
pub fn ewma_update(existing: u32, observed: u32) -> u32 {
    if existing == 0 {
        observed
    } else {
        (existing + observed) / 2
    }
}

/// Recomputes the adaptive ping timeout from the current membership list:
/// average non-zero delay across members, scaled by 2, clamped to
/// `[default_ping_timeout, suspect_timeout/3]` (§4.1.3 "accommodate").
pub fn accommodate(list: &MembershipList, config: &MembershipConfig) -> u64 {
    let (sum, count) = list
        .iter()
        .map(|m| m.delay_ms)
        .filter(|&d| d != 0)
        .fold((0u64, 0u64), |(sum, count), d| (sum + u64::from(d), count + 1));

    let average = if count == 0 { 0 } else { sum / count };
    let scaled = average.saturating_mul(2);
    let (lo, hi) = config.ping_timeout_bounds();
    scaled.clamp(lo, hi.max(lo))
}

/// Net-glitch adjustment (§4.1.3): if an observed one-way delay exceeds
/// `2 * ping_timeout / 3`, returns the excess to apply as a forward shift
/// on the corresponding endpoint's suspicion deadline. Returns `0` if the
/// delay is within tolerance.
pub fn net_glitch_excess(observed_one_way_delay_ms: u64, ping_timeout_ms: u64) -> u64 {
    let threshold = (2 * ping_timeout_ms) / 3;
    observed_one_way_delay_ms.saturating_sub(threshold)
}

/// Network-outage detection (§4.1.3): true once the interval since the
/// last successful probe exceeds `2 * suspect_timeout / 3`.
pub fn is_network_outage(ms_since_last_success: u64, suspect_timeout_ms: u64) -> bool {
    ms_since_last_success > (2 * suspect_timeout_ms) / 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewma_seeds_from_first_observation() {
        assert_eq!(ewma_update(0, 100), 100);
    }

    #[test]
    fn ewma_averages_subsequent_observations() {
        assert_eq!(ewma_update(100, 200), 150);
    }

    #[test]
    fn accommodate_stays_within_bounds() {
        let cfg = MembershipConfig::default();
        let mut list = MembershipList::new();
        list.insert(cluster_types::Member {
            id: 1,
            incarnation: 0,
            status: cluster_types::MemberStatus::Alive,
            delay_ms: 1_000_000,
            last_heard_hlc: cluster_types::Hlc::ZERO,
        });
        let timeout = accommodate(&list, &cfg);
        let (lo, hi) = cfg.ping_timeout_bounds();
        assert!(timeout >= lo && timeout <= hi);
    }

    #[test]
    fn accommodate_with_no_observations_is_the_floor() {
        let cfg = MembershipConfig::default();
        let list = MembershipList::new();
        assert_eq!(accommodate(&list, &cfg), cfg.ping_timeout_bounds().0);
    }

    #[test]
    fn net_glitch_is_zero_within_tolerance() {
        assert_eq!(net_glitch_excess(100, 500), 0);
    }

    #[test]
    fn net_glitch_returns_excess_beyond_threshold() {
        // threshold = 2*500/3 = 333
        assert_eq!(net_glitch_excess(400, 500), 67);
    }

    #[test]
    fn outage_detected_past_two_thirds_suspect_timeout() {
        assert!(is_network_outage(4_001, 6_000));
        assert!(!is_network_outage(3_999, 6_000));
    }
}
