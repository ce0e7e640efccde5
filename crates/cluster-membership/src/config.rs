//! Tunables for the membership engine, following the
//! `kimberlite-cluster::config` new/load/save-to-TOML shape.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Membership engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Floor of the adaptive ping timeout, in milliseconds.
    pub default_ping_timeout_ms: u64,
    /// Grace period from `Suspect` entry to `Dead` declaration.
    pub suspect_timeout_ms: u64,
    /// Number of peers used for indirect probing (`k` in §4.1.1).
    pub indirect_probe_fanout: usize,
    /// Retransmit multiplier for the dissemination queue (`K` in
    /// `K·log(N)`, §4.1.1).
    pub piggyback_retransmit_k: u32,
    /// Maximum number of update records piggybacked per PING/IREQ.
    pub piggyback_batch_size: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        MembershipConfig {
            default_ping_timeout_ms: 500,
            suspect_timeout_ms: 5_000,
            indirect_probe_fanout: 3,
            piggyback_retransmit_k: 3,
            piggyback_batch_size: 8,
        }
    }
}

impl MembershipConfig {
    /// Clamp bound for the adaptive ping timeout: `[default_ping_timeout,
    /// suspect_timeout / 3]` (§4.1.3, §8 invariant 3).
    pub fn ping_timeout_bounds(&self) -> (u64, u64) {
        (self.default_ping_timeout_ms, self.suspect_timeout_ms / 3)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Collaborator(e.to_string()))?;
        toml::from_str(&content).map_err(|e| Error::Invalid(e.to_string()))
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Invalid(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| Error::Collaborator(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_bounds_are_well_formed() {
        let cfg = MembershipConfig::default();
        let (lo, hi) = cfg.ping_timeout_bounds();
        assert!(lo < hi);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("membership.toml");
        let cfg = MembershipConfig {
            indirect_probe_fanout: 5,
            ..MembershipConfig::default()
        };
        cfg.save(&path).unwrap();
        let loaded = MembershipConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }
}
