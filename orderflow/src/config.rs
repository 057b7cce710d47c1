//! Pipeline configuration.
//!
//! Values come from serde defaults, optionally overlaid by a JSON document and
//! then by `ORDERFLOW_*` environment variables.

use crate::errors::{OrderflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding [`PipelineConfig::test_level`].
pub const ENV_TEST_LEVEL: &str = "ORDERFLOW_TEST_LEVEL";
/// Environment variable overriding [`PipelineConfig::work_dir`].
pub const ENV_WORK_DIR: &str = "ORDERFLOW_WORK_DIR";
/// Environment variable overriding [`PipelineConfig::remote_folder`].
pub const ENV_REMOTE_FOLDER: &str = "ORDERFLOW_REMOTE_FOLDER";
/// Environment variable overriding [`PipelineConfig::step_timeout_secs`].
pub const ENV_STEP_TIMEOUT: &str = "ORDERFLOW_STEP_TIMEOUT_SECS";

/// `CommonCode` group driving the main pipeline.
pub const MAIN_STEP_GROUP: &str = "PG_PROC";
/// `CommonCode` group driving the sales sub-pipeline.
pub const SALES_STEP_GROUP: &str = "PG_SALES";

/// Configuration for pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Default number of ordered steps a run executes.
    #[serde(default = "default_test_level")]
    pub test_level: usize,
    /// `CommonCode` group for the main pipeline.
    #[serde(default = "default_main_group")]
    pub step_group: String,
    /// `CommonCode` group for the sales sub-pipeline.
    #[serde(default = "default_sales_group")]
    pub sales_step_group: String,
    /// Cadence of `TimeUpdated` events in seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Optional time budget for a single step.
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    /// Local directory for exported invoice files.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Remote folder prefix for uploads.
    #[serde(default = "default_remote_folder")]
    pub remote_folder: String,
}

fn default_test_level() -> usize {
    1
}

fn default_main_group() -> String {
    MAIN_STEP_GROUP.to_string()
}

fn default_sales_group() -> String {
    SALES_STEP_GROUP.to_string()
}

fn default_tick_interval() -> u64 {
    10
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("orderflow")
}

fn default_remote_folder() -> String {
    "invoices".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_level: default_test_level(),
            step_group: default_main_group(),
            sales_step_group: default_sales_group(),
            tick_interval_secs: default_tick_interval(),
            step_timeout_secs: None,
            work_dir: default_work_dir(),
            remote_folder: default_remote_folder(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a config error if the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OrderflowError::config(format!("invalid pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a key lookup (the process environment in
    /// production, a map in tests).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TEST_LEVEL) {
            self.test_level = raw.trim().parse().map_err(|_| {
                OrderflowError::config(format!("{ENV_TEST_LEVEL} must be a positive integer, got '{raw}'"))
            })?;
        }
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(folder) = lookup(ENV_REMOTE_FOLDER) {
            self.remote_folder = folder;
        }
        if let Some(raw) = lookup(ENV_STEP_TIMEOUT) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                OrderflowError::config(format!("{ENV_STEP_TIMEOUT} must be seconds, got '{raw}'"))
            })?;
            self.step_timeout_secs = (secs > 0).then_some(secs);
        }
        self.validate()?;
        Ok(self)
    }

    /// Sets the default test level.
    #[must_use]
    pub fn with_test_level(mut self, test_level: usize) -> Self {
        self.test_level = test_level;
        self
    }

    /// Sets the tick interval in seconds.
    #[must_use]
    pub fn with_tick_interval_secs(mut self, secs: u64) -> Self {
        self.tick_interval_secs = secs;
        self
    }

    /// Sets the per-step timeout. Zero disables it.
    #[must_use]
    pub fn with_step_timeout_secs(mut self, secs: u64) -> Self {
        self.step_timeout_secs = (secs > 0).then_some(secs);
        self
    }

    /// Sets the work directory.
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Tick interval as a `Duration`.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Step timeout as a `Duration`, if configured. A zero budget counts as
    /// unset.
    #[must_use]
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.filter(|secs| *secs > 0).map(Duration::from_secs)
    }

    /// Checks invariants between fields.
    pub fn validate(&self) -> Result<()> {
        if self.test_level == 0 {
            return Err(OrderflowError::config("test_level must be at least 1"));
        }
        if self.tick_interval_secs == 0 {
            return Err(OrderflowError::config("tick_interval_secs must be at least 1"));
        }
        if self.step_group.trim().is_empty() || self.sales_step_group.trim().is_empty() {
            return Err(OrderflowError::config("step groups cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.test_level, 1);
        assert_eq!(config.step_group, "PG_PROC");
        assert_eq!(config.tick_interval(), Duration::from_secs(10));
        assert!(config.step_timeout().is_none());
    }

    #[test]
    fn test_from_json_partial() {
        let config = PipelineConfig::from_json_str(r#"{"test_level": 14, "remote_folder": "out"}"#).unwrap();
        assert_eq!(config.test_level, 14);
        assert_eq!(config.remote_folder, "out");
        assert_eq!(config.sales_step_group, "PG_SALES");
    }

    #[test]
    fn test_from_json_rejects_zero_level() {
        assert!(PipelineConfig::from_json_str(r#"{"test_level": 0}"#).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::default()
            .with_env_overrides(lookup(&[
                (ENV_TEST_LEVEL, "5"),
                (ENV_STEP_TIMEOUT, "30"),
                (ENV_WORK_DIR, "/var/tmp/of"),
            ]))
            .unwrap();

        assert_eq!(config.test_level, 5);
        assert_eq!(config.step_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/of"));
    }

    #[test]
    fn test_env_override_invalid_level() {
        let err = PipelineConfig::default()
            .with_env_overrides(lookup(&[(ENV_TEST_LEVEL, "many")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TEST_LEVEL));
    }

    #[test]
    fn test_zero_timeout_disables_budget() {
        let config = PipelineConfig::default()
            .with_env_overrides(lookup(&[(ENV_STEP_TIMEOUT, "0")]))
            .unwrap();
        assert!(config.step_timeout_secs.is_none());
    }

    #[test]
    fn test_zero_timeout_from_json_or_builder_is_unset() {
        let from_json = PipelineConfig::from_json_str(r#"{"step_timeout_secs": 0}"#).unwrap();
        assert_eq!(from_json.step_timeout(), None);

        let built = PipelineConfig::default().with_step_timeout_secs(0);
        assert_eq!(built.step_timeout_secs, None);
        assert_eq!(
            PipelineConfig::default().with_step_timeout_secs(3).step_timeout(),
            Some(Duration::from_secs(3))
        );
    }
}
