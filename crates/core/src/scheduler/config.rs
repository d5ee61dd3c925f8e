//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the job scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum pipelines running at once.
    /// Further jobs queue in `pending` until a slot frees up.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_max_concurrent_jobs() -> usize {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 3);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_concurrent_jobs, 3);

        let config: SchedulerConfig = toml::from_str("max_concurrent_jobs = 1").unwrap();
        assert_eq!(config.max_concurrent_jobs, 1);
    }
}
