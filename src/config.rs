//! Configuration loading and management
//!
//! Handles parsing of `.backlog.toml` at the project root. Every key
//! is optional; defaults match the thresholds the health heuristics
//! were tuned against.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file name at the project root
pub const CONFIG_FILE: &str = ".backlog.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Health heuristics thresholds
    #[serde(default)]
    pub health: HealthConfig,

    /// Auto-remediation configuration
    #[serde(default)]
    pub remedy: RemedyConfig,
}

impl Config {
    /// Load configuration from `<root>/.backlog.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.remedy.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "remedy.confidence_threshold must be within 0.0..=1.0, got {}",
                self.remedy.confidence_threshold
            )));
        }
        if self.health.baseline_effort_hours <= 0.0 {
            return Err(Error::InvalidConfig(
                "health.baseline_effort_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Store-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Milliseconds to wait for the store lock before failing
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    crate::lock::DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Thresholds for the health scorer and monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Hours of inactivity before an in-progress task counts as stuck
    #[serde(default = "default_stuck_hours")]
    pub stuck_hours: f64,

    /// Hours of inactivity before a task counts as stale
    #[serde(default = "default_stale_hours")]
    pub stale_hours: f64,

    /// Hours an in-progress task may sit at 0% before it is flagged
    #[serde(default = "default_no_progress_hours")]
    pub no_progress_hours: f64,

    /// Assumed effort when a task carries no estimate
    #[serde(default = "default_baseline_effort_hours")]
    pub baseline_effort_hours: f64,
}

fn default_stuck_hours() -> f64 {
    2.0
}

fn default_stale_hours() -> f64 {
    72.0
}

fn default_no_progress_hours() -> f64 {
    24.0
}

fn default_baseline_effort_hours() -> f64 {
    8.0
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stuck_hours: default_stuck_hours(),
            stale_hours: default_stale_hours(),
            no_progress_hours: default_no_progress_hours(),
            baseline_effort_hours: default_baseline_effort_hours(),
        }
    }
}

/// Auto-remediation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemedyConfig {
    /// Maximum corrective actions applied per task per invocation
    #[serde(default = "default_max_auto_fixes")]
    pub max_auto_fixes: usize,

    /// Minimum issue confidence for a fix to apply in safe mode
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Skip low-confidence fixes instead of applying them
    #[serde(default = "default_safe_mode")]
    pub safe_mode: bool,
}

fn default_max_auto_fixes() -> usize {
    3
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_safe_mode() -> bool {
    true
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            max_auto_fixes: default_max_auto_fixes(),
            confidence_threshold: default_confidence_threshold(),
            safe_mode: default_safe_mode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.store.lock_timeout_ms, 5000);
        assert_eq!(config.health.stuck_hours, 2.0);
        assert_eq!(config.remedy.max_auto_fixes, 3);
        assert!(config.remedy.safe_mode);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "[health]\nstuck_hours = 6.0\n",
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.health.stuck_hours, 6.0);
        assert_eq!(config.health.stale_hours, 72.0);
        assert_eq!(config.remedy.confidence_threshold, 0.7);
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "[remedy]\nconfidence_threshold = 1.5\n",
        )
        .unwrap();

        let err = Config::load(temp.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
