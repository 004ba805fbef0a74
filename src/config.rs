//! Configuration for facility-triage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facility-triage")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the online and offline databases
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Facilities within this distance of a failure become at risk
    #[serde(default = "default_cascade_radius")]
    pub cascade_radius_km: f64,

    /// Maximum distance for a power/water provider connection
    #[serde(default = "default_connection_cap")]
    pub connection_cap_km: f64,

    /// Write-then-verify attempts for status changes
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,

    /// Settle delay between verify attempts
    #[serde(default = "default_verify_delay")]
    pub verify_delay_ms: u64,

    /// Background sync interval in seconds
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Minimum severity for a report to affect ranking
    #[serde(default = "default_report_threshold")]
    pub report_threshold: f64,

    /// Cap on the point adjustment a single report may contribute
    #[serde(default = "default_adjustment_cap")]
    pub report_adjustment_cap: f64,

    /// Connectivity assumed at startup
    #[serde(default = "default_true")]
    pub start_online: bool,

    /// Ingest the simulated dataset when a store is empty at startup
    #[serde(default = "default_true")]
    pub seed_on_empty: bool,
}

fn default_cascade_radius() -> f64 {
    50.0
}

fn default_connection_cap() -> f64 {
    200.0
}

fn default_verify_attempts() -> u32 {
    5
}

fn default_verify_delay() -> u64 {
    150
}

fn default_sync_interval() -> u64 {
    30
}

fn default_report_threshold() -> f64 {
    3.0
}

fn default_adjustment_cap() -> f64 {
    50.0
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            cascade_radius_km: default_cascade_radius(),
            connection_cap_km: default_connection_cap(),
            verify_attempts: default_verify_attempts(),
            verify_delay_ms: default_verify_delay(),
            sync_interval_secs: default_sync_interval(),
            report_threshold: default_report_threshold(),
            report_adjustment_cap: default_adjustment_cap(),
            start_online: true,
            seed_on_empty: true,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get online database path
    pub fn online_db_path(&self) -> PathBuf {
        self.storage_dir.join("online.db")
    }

    /// Get offline database path
    pub fn offline_db_path(&self) -> PathBuf {
        self.storage_dir.join("offline.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    /// Settings for tests: no settle delays, nothing seeded.
    pub fn for_tests() -> Self {
        Self {
            storage_dir: PathBuf::from("."),
            verify_delay_ms: 0,
            seed_on_empty: false,
            ..Self::default()
        }
    }
}
