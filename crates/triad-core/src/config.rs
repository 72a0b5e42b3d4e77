//! Configuration surface consumed by the Triad subsystems.
//!
//! Every section and field carries a default so a partial TOML file
//! (containing only the knobs the operator wants to tweak) is accepted.

use serde::{Deserialize, Serialize};

use crate::{TriadError, TriadResult};

/// Worker pool sizing and auto-scaling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Lower bound on pool size; the scaler never drains below this.
    pub min_workers: usize,
    /// Upper bound on pool size; the scaler never spawns above this.
    pub max_workers: usize,
    /// Auto-scaling sample interval in milliseconds.
    pub sample_interval_ms: u64,
    /// Queue-depth-per-worker above which a sample counts as over-threshold.
    pub high_watermark: f64,
    /// Queue-depth-per-worker below which a sample counts as under-threshold.
    pub low_watermark: f64,
    /// Consecutive over-threshold samples required before scaling up.
    pub scale_up_samples: u32,
    /// Consecutive under-threshold samples required before scaling down.
    pub scale_down_samples: u32,
    /// Missed-heartbeat grace period in milliseconds before a worker is dead.
    pub heartbeat_grace_ms: u64,
    /// Heartbeat emission interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Maximum worker-death requeues per task before `max_retries_exceeded`.
    pub max_retries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 8,
            sample_interval_ms: 250,
            high_watermark: 2.0,
            low_watermark: 0.5,
            scale_up_samples: 2,
            scale_down_samples: 4,
            heartbeat_grace_ms: 2_000,
            heartbeat_interval_ms: 250,
            max_retries: 3,
        }
    }
}

/// Recall store knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Search latency budget in milliseconds; beyond it, results degrade.
    pub search_budget_ms: u64,
    /// Optional JSONL path for the durable store; `None` keeps it in memory.
    pub data_path: Option<std::path::PathBuf>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            search_budget_ms: 100,
            data_path: None,
        }
    }
}

/// Solution generator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreativeConfig {
    /// Default number of ranked candidates returned per request.
    pub default_candidates: usize,
    /// Token-similarity threshold above which two candidates are duplicates.
    pub dedup_threshold: f32,
    /// Weight of the quality score in the composite ranking.
    pub quality_weight: f32,
    /// Weight of the novelty score in the composite ranking.
    pub novelty_weight: f32,
}

impl Default for CreativeConfig {
    fn default() -> Self {
        Self {
            default_candidates: 3,
            dedup_threshold: 0.85,
            quality_weight: 0.7,
            novelty_weight: 0.3,
        }
    }
}

/// Engine coordinator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Overall deadline applied when the intake omits one, in milliseconds.
    pub default_deadline_ms: u64,
    /// Default priority applied when the intake omits one.
    pub default_priority: u8,
    /// Upper bound for any single engine dispatch, in milliseconds.
    pub engine_timeout_cap_ms: u64,
    /// Fraction of the task deadline granted to each engine dispatch.
    pub engine_timeout_fraction: f32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: 5_000,
            default_priority: 5,
            engine_timeout_cap_ms: 30_000,
            engine_timeout_fraction: 0.9,
        }
    }
}

/// Status broadcaster knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Size of the replay ring served to new subscribers.
    pub replay_capacity: usize,
    /// Bounded queue size per subscriber; overflow drops oldest plus a gap.
    pub subscriber_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            replay_capacity: 64,
            subscriber_capacity: 256,
        }
    }
}

/// HTTP/WebSocket server knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the gateway binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8085".into(),
        }
    }
}

/// The full configuration tree, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriadConfig {
    /// Gateway server section.
    pub server: ServerConfig,
    /// Worker pool section.
    pub pool: PoolConfig,
    /// Recall store section.
    pub recall: RecallConfig,
    /// Solution generator section.
    pub creative: CreativeConfig,
    /// Coordinator section.
    pub coordinator: CoordinatorConfig,
    /// Status broadcaster section.
    pub status: StatusConfig,
}

impl TriadConfig {
    /// Parse a TOML document into a config tree.
    pub fn from_toml(content: &str) -> TriadResult<Self> {
        let config: TriadConfig = toml::from_str(content)
            .map_err(|e| TriadError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> TriadResult<()> {
        if self.pool.min_workers == 0 {
            return Err(TriadError::Config("pool.min_workers must be >= 1".into()));
        }
        if self.pool.max_workers < self.pool.min_workers {
            return Err(TriadError::Config(format!(
                "pool.max_workers ({}) must be >= pool.min_workers ({})",
                self.pool.max_workers, self.pool.min_workers
            )));
        }
        if self.pool.high_watermark <= self.pool.low_watermark {
            return Err(TriadError::Config(
                "pool.high_watermark must exceed pool.low_watermark".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.coordinator.engine_timeout_fraction) {
            return Err(TriadError::Config(
                "coordinator.engine_timeout_fraction must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TriadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.min_workers, 2);
        assert_eq!(config.pool.max_workers, 8);
        assert_eq!(config.recall.search_budget_ms, 100);
    }

    #[test]
    fn test_partial_toml_accepted() {
        let config = TriadConfig::from_toml(
            r#"
[pool]
min_workers = 1
max_workers = 4

[status]
replay_capacity = 16
"#,
        )
        .unwrap();
        assert_eq!(config.pool.min_workers, 1);
        assert_eq!(config.pool.max_workers, 4);
        assert_eq!(config.status.replay_capacity, 16);
        // Untouched sections keep their defaults.
        assert_eq!(config.coordinator.default_deadline_ms, 5_000);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = TriadConfig::from_toml("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8085");
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let result = TriadConfig::from_toml(
            r#"
[pool]
min_workers = 6
max_workers = 2
"#,
        );
        assert!(result.is_err());

        let result = TriadConfig::from_toml(
            r#"
[pool]
high_watermark = 0.2
low_watermark = 0.5
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let result = TriadConfig::from_toml("{{{{not toml");
        assert!(matches!(result, Err(TriadError::Config(_))));
    }
}
