//! Combined configuration for the two engines `ClusterRuntime` wires
//! together, loaded from a single TOML file with `[membership]` and
//! `[rebuild]` tables.

use std::path::Path;

use cluster_membership::MembershipConfig;
use cluster_rebuild::RebuildConfig;
use cluster_types::{Error, Result};
use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    pub membership: MembershipConfig,
    pub rebuild: RebuildConfig,
}

impl RuntimeConfig {
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
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runtime.toml");
        let cfg = RuntimeConfig::default();
        cfg.save(&path).unwrap();
        assert_eq!(RuntimeConfig::load(&path).unwrap(), cfg);
    }
}
