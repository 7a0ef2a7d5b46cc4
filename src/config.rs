//! Configuration management for CrabStream
//!
//! Provides loading, saving, layering and validation of the engine
//! configuration: the strategy list, metrics smoothing, selection weights,
//! backoff timing and per-network-condition adjustments.

use crate::errors::DeliveryError;
use crate::types::{Capability, NetworkCondition, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for layered overrides, e.g.
/// `CRABSTREAM_METRICS__ALPHA=0.2`
pub const ENV_PREFIX: &str = "CRABSTREAM";

/// Largest accepted attempt history
pub const MAX_HISTORY_SIZE: usize = 100_000;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategies: Vec<Strategy>,
    pub metrics: MetricsConfig,
    pub selector: SelectorConfig,
    pub executor: ExecutorConfig,
    pub network: NetworkConfig,
}

/// Attempt history and success-rate smoothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// EMA smoothing factor (0.0-1.0]
    pub alpha: f64,
    /// Maximum number of attempt records kept
    pub history_size: usize,
    /// Number of recent records included in snapshots
    pub snapshot_window: usize,
    /// Default window for error-rate inspection
    pub error_rate_window: usize,
}

/// Ordering weights and the slow-network override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub success_weight: f64,
    pub priority_weight: f64,
    /// Strategy names tried first, in this order, on slow networks
    pub lightweight_order: Vec<String>,
}

/// Retry pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Backoff before retry n is `base_backoff_ms * n`
    pub base_backoff_ms: u64,
    /// Upper bound for a single backoff delay
    pub max_backoff_ms: u64,
}

/// Network classification and per-condition budget adjustments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NetworkConfig {
    pub thresholds: NetworkThresholds,
    pub adjustments: ConditionAdjustments,
}

/// Mbps boundaries used by the threshold classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkThresholds {
    /// Below this is slow
    pub slow_below_mbps: f64,
    /// At or above this is fast
    pub fast_from_mbps: f64,
}

/// Timeout/retry adjustment applied to every plan entry for one condition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adjustment {
    pub timeout_multiplier: f64,
    /// Added to `max_retries`; the result is floored at 1
    pub retry_delta: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionAdjustments {
    pub slow: Adjustment,
    pub medium: Adjustment,
    pub fast: Adjustment,
    pub unknown: Adjustment,
}

impl ConditionAdjustments {
    pub fn for_condition(&self, condition: NetworkCondition) -> Adjustment {
        match condition {
            NetworkCondition::Slow => self.slow,
            NetworkCondition::Medium => self.medium,
            NetworkCondition::Fast => self.fast,
            NetworkCondition::Unknown => self.unknown,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            history_size: 50,
            snapshot_window: 20,
            error_rate_window: 20,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            success_weight: 0.7,
            priority_weight: 0.3,
            lightweight_order: ["direct", "proxy", "transcode", "webrtc"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl Default for NetworkThresholds {
    fn default() -> Self {
        Self {
            slow_below_mbps: 1.5,
            fast_from_mbps: 5.0,
        }
    }
}

impl Default for Adjustment {
    fn default() -> Self {
        Self {
            timeout_multiplier: 1.0,
            retry_delta: 0,
        }
    }
}

impl Default for ConditionAdjustments {
    fn default() -> Self {
        Self {
            slow: Adjustment {
                timeout_multiplier: 2.0,
                retry_delta: 1,
            },
            medium: Adjustment {
                timeout_multiplier: 1.5,
                retry_delta: 0,
            },
            fast: Adjustment {
                timeout_multiplier: 0.8,
                retry_delta: 0,
            },
            unknown: Adjustment::default(),
        }
    }
}

/// Built-in media delivery strategies
pub fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new("webrtc", 1, 10_000, 2)
            .requires(Capability::WebRtc)
            .requires(Capability::WebCodecs),
        Strategy::new("proxy", 2, 8_000, 2)
            .requires(Capability::Fetch)
            .requires(Capability::MediaSource),
        Strategy::new("transcode", 3, 15_000, 1)
            .requires(Capability::Fetch)
            .requires(Capability::VideoElement),
        Strategy::new("direct", 4, 5_000, 3).requires(Capability::VideoElement),
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            metrics: MetricsConfig::default(),
            selector: SelectorConfig::default(),
            executor: ExecutorConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DeliveryError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            DeliveryError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, DeliveryError> {
        toml::from_str(contents).map_err(|e| {
            DeliveryError::Configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Load a TOML file (optional) layered under `CRABSTREAM_*` environment
    /// overrides. Nested keys use a double underscore separator.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, DeliveryError> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DeliveryError::Configuration(format!("Failed to layer config: {}", e)))?;

        let config: EngineConfig = settings.try_deserialize().map_err(|e| {
            DeliveryError::Configuration(format!("Failed to deserialize config: {}", e))
        })?;
        log::debug!("Loaded layered configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DeliveryError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    DeliveryError::Configuration(format!(
                        "Failed to create config directory: {}",
                        e
                    ))
                })?;
            }
        }

        fs::write(path, self.to_toml_string()?).map_err(|e| {
            DeliveryError::Configuration(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, DeliveryError> {
        toml::to_string_pretty(self).map_err(|e| {
            DeliveryError::Configuration(format!("Failed to serialize config: {}", e))
        })
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabstream.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.strategies.is_empty() {
            return Err("At least one strategy must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            strategy
                .validate()
                .map_err(|e| format!("Strategy '{}': {}", strategy.name, e))?;
            if !seen.insert(strategy.name.as_str()) {
                return Err(format!("Duplicate strategy name: {}", strategy.name));
            }
        }

        if !(self.metrics.alpha > 0.0 && self.metrics.alpha <= 1.0) {
            return Err("EMA alpha must be in (0.0, 1.0]".to_string());
        }
        if self.metrics.history_size == 0 || self.metrics.history_size > MAX_HISTORY_SIZE {
            return Err(format!("History size must be between 1 and {}", MAX_HISTORY_SIZE));
        }
        if self.metrics.snapshot_window == 0 {
            return Err("Snapshot window must be at least 1".to_string());
        }

        let weights = [self.selector.success_weight, self.selector.priority_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("Selector weights must be finite and non-negative".to_string());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("Selector weights must not both be zero".to_string());
        }
        let mut order_seen = HashSet::new();
        for name in &self.selector.lightweight_order {
            if !order_seen.insert(name.as_str()) {
                return Err(format!("Duplicate entry in lightweight order: {}", name));
            }
            if !seen.contains(name.as_str()) {
                log::warn!("Lightweight order names unknown strategy '{}'", name);
            }
        }

        if self.executor.max_backoff_ms < self.executor.base_backoff_ms {
            return Err("max_backoff_ms must be >= base_backoff_ms".to_string());
        }

        let t = &self.network.thresholds;
        if !(t.slow_below_mbps.is_finite() && t.fast_from_mbps.is_finite()) {
            return Err("Network thresholds must be finite".to_string());
        }
        if t.slow_below_mbps < 0.0 || t.slow_below_mbps > t.fast_from_mbps {
            return Err("Network thresholds must satisfy 0 <= slow_below <= fast_from".to_string());
        }

        let a = &self.network.adjustments;
        for (label, adj) in [
            ("slow", a.slow),
            ("medium", a.medium),
            ("fast", a.fast),
            ("unknown", a.unknown),
        ] {
            if !(adj.timeout_multiplier.is_finite() && adj.timeout_multiplier > 0.0) {
                return Err(format!(
                    "Timeout multiplier for {} must be a positive number",
                    label
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.metrics.alpha, 0.1);
        assert_eq!(config.metrics.history_size, 50);
        assert_eq!(config.selector.success_weight, 0.7);
        assert_eq!(config.selector.priority_weight, 0.3);
        assert_eq!(
            config.selector.lightweight_order,
            vec!["direct", "proxy", "transcode", "webrtc"]
        );
        assert_eq!(config.strategies.len(), 4);
    }

    #[test]
    fn test_config_validation() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_alpha = config.clone();
        bad_alpha.metrics.alpha = 0.0;
        assert!(bad_alpha.validate().is_err());

        let mut bad_history = config.clone();
        bad_history.metrics.history_size = 0;
        assert!(bad_history.validate().is_err());
        bad_history.metrics.history_size = MAX_HISTORY_SIZE + 1;
        assert!(bad_history.validate().is_err());
        bad_history.metrics.history_size = MAX_HISTORY_SIZE;
        assert!(bad_history.validate().is_ok());

        let mut duplicate = config.clone();
        duplicate.strategies.push(Strategy::new("direct", 9, 100, 1));
        assert!(duplicate.validate().unwrap_err().contains("Duplicate"));

        let mut bad_multiplier = config.clone();
        bad_multiplier.network.adjustments.fast.timeout_multiplier = 0.0;
        assert!(bad_multiplier.validate().is_err());

        let mut bad_backoff = config.clone();
        bad_backoff.executor.max_backoff_ms = 1;
        assert!(bad_backoff.validate().is_err());

        let mut no_strategies = config;
        no_strategies.strategies.clear();
        assert!(no_strategies.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("crabstream.toml");

        let mut config = EngineConfig::default();
        config.metrics.alpha = 0.25;
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = EngineConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = EngineConfig::default().to_toml_string().unwrap();

        assert!(toml_string.contains("[[strategies]]"));
        assert!(toml_string.contains("[metrics]"));
        assert!(toml_string.contains("[selector]"));
        assert!(toml_string.contains("[executor]"));
        assert!(toml_string.contains("required_capabilities"));
        assert!(toml_string.contains("web_rtc"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [metrics]
            alpha = 0.3

            [[strategies]]
            name = "direct"
            priority = 1
            timeout_ms = 2000
            max_retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.metrics.alpha, 0.3);
        assert_eq!(config.metrics.history_size, 50);
        assert_eq!(config.strategies.len(), 1);
        assert!(config.strategies[0].required_capabilities.is_empty());
        assert_eq!(config.executor, ExecutorConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = EngineConfig::load_from_file("nonexistent_crabstream.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = EngineConfig::from_toml_str("metrics = [").unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[test]
    fn test_adjustment_lookup() {
        let adjustments = ConditionAdjustments::default();
        assert_eq!(adjustments.for_condition(NetworkCondition::Slow).timeout_multiplier, 2.0);
        assert_eq!(adjustments.for_condition(NetworkCondition::Slow).retry_delta, 1);
        assert_eq!(adjustments.for_condition(NetworkCondition::Medium).timeout_multiplier, 1.5);
        assert_eq!(adjustments.for_condition(NetworkCondition::Fast).timeout_multiplier, 0.8);
        assert_eq!(adjustments.for_condition(NetworkCondition::Unknown), Adjustment::default());
    }
}
