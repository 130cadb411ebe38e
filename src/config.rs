//! Manager configuration

use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Priority;

/// Tunables for one TaskManager instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Concurrent workers in the pool
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queue bound; None means unbounded. With a bound set, `submit`
    /// fails fast with `QueueFullError` rather than blocking.
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Ceiling on any single retry backoff delay, in seconds
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// Re-queue delay while a task's dependencies are still live, in
    /// milliseconds
    #[serde(default = "default_dependency_poll_ms")]
    pub dependency_poll_ms: u64,

    /// Priority assumed when a submission carries no config
    #[serde(default)]
    pub default_priority: Priority,
}

fn default_workers() -> usize {
    4
}

fn default_backoff_cap_secs() -> u64 {
    60
}

fn default_dependency_poll_ms() -> u64 {
    25
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            backoff_cap_secs: default_backoff_cap_secs(),
            dependency_poll_ms: default_dependency_poll_ms(),
            default_priority: Priority::Normal,
        }
    }
}

impl ManagerConfig {
    /// Get the backoff ceiling as a Duration
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }

    /// Get the dependency re-queue delay as a Duration
    pub fn dependency_poll(&self) -> Duration {
        Duration::from_millis(self.dependency_poll_ms)
    }

    /// Load configuration from a YAML file; `None` uses defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display())),
            None => {
                tracing::info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, None);
        assert_eq!(config.backoff_cap(), Duration::from_secs(60));
        assert_eq!(config.dependency_poll(), Duration::from_millis(25));
        assert_eq!(config.default_priority, Priority::Normal);
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = ManagerConfig::load(None).unwrap();
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_load_from_yaml_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers: 8\nqueue_capacity: 128\ndefault_priority: high").unwrap();

        let config = ManagerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.queue_capacity, Some(128));
        assert_eq!(config.default_priority, Priority::High);
        // Unspecified fields keep their defaults
        assert_eq!(config.backoff_cap_secs, 60);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = ManagerConfig::load(Some(Path::new("/nonexistent/taskpool.yml")));
        assert!(result.is_err());
    }
}
