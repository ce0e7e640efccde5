//! Tunables for the rebuild coordinator, following the same new/load/save
//! TOML shape as `cluster_membership::MembershipConfig`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use cluster_types::{Error, Result};

/// Rebuild coordinator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Cap on concurrently running task-drivers across all pools (§4.2.2).
    pub max_inflight: usize,
    /// Status-check loop period (§4.2.3 step 6, §4.3.2).
    pub check_interval_ms: u64,
    /// Minimum interval between printed status lines absent a state
    /// change (§4.2.3 step 6).
    pub status_log_interval_ms: u64,
    /// Retry delay after a stale group-version broadcast (§4.2.3 step 3).
    pub stale_retry_delay_ms: u64,
    /// Delay before rescheduling a task that failed non-fatally (§4.2.3
    /// step 8).
    pub reschedule_delay_ms: u64,
    /// Number of completed tasks retained per pool for late `query` calls
    /// (§4.2.5).
    pub completion_log_capacity: usize,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        RebuildConfig {
            max_inflight: 10,
            check_interval_ms: 2_000,
            status_log_interval_ms: 10_000,
            stale_retry_delay_ms: 1_000,
            reschedule_delay_ms: 5_000,
            completion_log_capacity: 8,
        }
    }
}

impl RebuildConfig {
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
