use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub hitl: HitlSettings,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,
}

impl AppConfig {
    /// Rejects values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;
        if o.max_concurrent_tasks == 0 {
            return Err(ConfigError::invalid(
                "orchestrator.max_concurrent_tasks",
                "must be at least 1",
            ));
        }
        if !matches!(
            o.backoff_strategy.as_str(),
            "exponential" | "linear" | "fixed"
        ) {
            return Err(ConfigError::invalid(
                "orchestrator.backoff_strategy",
                format!("unknown strategy '{}'", o.backoff_strategy),
            ));
        }
        if !o.backoff_base.is_finite() || o.backoff_base < 1.0 {
            return Err(ConfigError::invalid(
                "orchestrator.backoff_base",
                format!("must be >= 1.0, got {}", o.backoff_base),
            ));
        }
        if let Some(secs) = o.default_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::invalid(
                    "orchestrator.default_timeout_secs",
                    format!("must be a positive number of seconds, got {secs}"),
                ));
            }
        }
        if self.events_out.enabled && self.events_out.channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "events_out.channel_capacity",
                "must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::invalid(
                "model.temperature",
                format!("must be within 0.0..=2.0, got {}", self.model.temperature),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "taskweave_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Worker pool size, shared by every workflow one orchestrator runs.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// exponential, linear or fixed.
    #[serde(default = "default_backoff_strategy")]
    pub backoff_strategy: String,

    /// Retry `n` waits `backoff_base^n * backoff_unit_ms`.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    #[serde(default)]
    pub max_backoff_ms: Option<u64>,

    /// Applied to definition-file tasks that omit `max_retries`.
    #[serde(default = "crate::model::task::default_max_retries")]
    pub default_max_retries: u32,

    /// Fallback per-attempt timeout for tasks without their own.
    #[serde(default)]
    pub default_timeout_secs: Option<f64>,

    #[serde(default = "default_true")]
    pub state_persistence_enabled: bool,

    #[serde(default = "default_true")]
    pub event_publishing_enabled: bool,
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_backoff_strategy() -> String {
    "exponential".to_string()
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            backoff_strategy: default_backoff_strategy(),
            backoff_base: default_backoff_base(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_backoff_ms: None,
            default_max_retries: crate::model::task::default_max_retries(),
            default_timeout_secs: None,
            state_persistence_enabled: default_true(),
            event_publishing_enabled: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlSettings {
    /// Hold the graph until a decision arrives instead of returning
    /// WAITING_HUMAN immediately.
    #[serde(default)]
    pub wait_for_decision: bool,

    #[serde(default = "default_decision_timeout_secs")]
    pub decision_timeout_secs: u64,
}

fn default_decision_timeout_secs() -> u64 {
    3600
}

impl Default for HitlSettings {
    fn default() -> Self {
        Self {
            wait_for_decision: false,
            decision_timeout_secs: default_decision_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API. Compute tasks are unavailable
    /// when empty.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for workflow snapshots. In-memory only when unset.
    #[serde(default)]
    pub snapshot_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_events_path")]
    pub path: String,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_true")]
    pub drop_when_full: bool,
}

fn default_events_path() -> String {
    "./workflow.events.jsonl".to_string()
}

fn default_channel_capacity() -> usize {
    2048
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_events_path(),
            channel_capacity: default_channel_capacity(),
            drop_when_full: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [orchestrator]
            max_concurrent_tasks = 4

            [model]
            endpoint = "http://localhost:8080/v1"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.orchestrator.max_concurrent_tasks, 4);
        assert_eq!(cfg.orchestrator.backoff_base, 2.0);
        assert_eq!(cfg.orchestrator.default_max_retries, 3);
        assert!(cfg.orchestrator.state_persistence_enabled);
        assert_eq!(cfg.model.model, "gpt-4o-mini");
        assert!(!cfg.hitl.wait_for_decision);
        assert!(!cfg.events_out.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let mut cfg = AppConfig::default();
        cfg.orchestrator.max_concurrent_tasks = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "orchestrator.max_concurrent_tasks",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let mut cfg = AppConfig::default();
        cfg.orchestrator.backoff_base = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_strategy() {
        let mut cfg = AppConfig::default();
        cfg.orchestrator.backoff_strategy = "fibonacci".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "orchestrator.backoff_strategy",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_default_timeout() {
        let mut cfg = AppConfig::default();
        cfg.orchestrator.default_timeout_secs = Some(1e30);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "orchestrator.default_timeout_secs",
                ..
            })
        ));

        cfg.orchestrator.default_timeout_secs = Some(-1.0);
        assert!(cfg.validate().is_err());

        cfg.orchestrator.default_timeout_secs = Some(30.0);
        assert!(cfg.validate().is_ok());
    }
}
