use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use taskweave_core::config::{AppConfig, OrchestratorConfig};
use taskweave_core::hooks::{DecisionStore, EventPublisher, StatePersister};
use taskweave_core::orchestrator::{BackoffStrategy, ExponentialBackoff, OrchestratorBuilder};
use taskweave_core::{ExecutorRegistry, Orchestrator};

use crate::executors::{
    ApprovalMode, ComputeExecutor, HttpModelBackend, HumanApprovalExecutor, ModelDefaults,
    ToolCallExecutor, ToolRegistry,
};
use crate::stores::{
    InMemoryStatePersister, JsonFileStatePersister, JsonlEventPublisher, TracingEventPublisher,
};
use crate::strategies::retry;

pub fn build_backoff(cfg: &OrchestratorConfig) -> Arc<dyn BackoffStrategy> {
    let unit = Duration::from_millis(cfg.backoff_unit_ms);
    let max = cfg
        .max_backoff_ms
        .map(Duration::from_millis)
        .unwrap_or(Duration::MAX);
    match retry::by_name(&cfg.backoff_strategy, unit, max) {
        Some(strategy) => Arc::from(strategy),
        None => Arc::new(ExponentialBackoff::from_config(cfg)),
    }
}

/// Tool and human-approval executors always; compute only when a model
/// endpoint is configured.
pub fn build_registry(
    cfg: &AppConfig,
    tools: ToolRegistry,
    decisions: Arc<dyn DecisionStore>,
) -> Result<ExecutorRegistry> {
    let mut builder = ExecutorRegistry::builder()
        .tool_call(Arc::new(ToolCallExecutor::new(tools)))
        .human_approval(Arc::new(HumanApprovalExecutor::new(
            decisions,
            ApprovalMode::from(&cfg.hitl),
        )));

    if !cfg.model.endpoint.trim().is_empty() {
        let backend = HttpModelBackend::from_config(&cfg.model)?;
        builder = builder.compute(Arc::new(ComputeExecutor::new(
            Arc::new(backend),
            ModelDefaults::from(&cfg.model),
        )));
    }
    Ok(builder.build())
}

pub fn build_persister(cfg: &AppConfig) -> Arc<dyn StatePersister> {
    match cfg.persistence.snapshot_dir.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => Arc::new(JsonFileStatePersister::new(dir)),
        _ => Arc::new(InMemoryStatePersister::new()),
    }
}

/// JSONL output when `events_out` is enabled, tracing records otherwise.
pub async fn build_publisher(cfg: &AppConfig) -> Result<Arc<dyn EventPublisher>> {
    match JsonlEventPublisher::start(&cfg.events_out).await? {
        Some(publisher) => Ok(Arc::new(publisher)),
        None => Ok(Arc::new(TracingEventPublisher)),
    }
}

/// Orchestrator builder with every config-driven collaborator attached.
/// Callers add hooks before `build()`.
pub async fn build_orchestrator(
    cfg: &AppConfig,
    registry: ExecutorRegistry,
) -> Result<OrchestratorBuilder> {
    Ok(Orchestrator::builder(registry)
        .config(&cfg.orchestrator)
        .backoff(build_backoff(&cfg.orchestrator))
        .persister(build_persister(cfg))
        .publisher(build_publisher(cfg).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryDecisionStore;
    use taskweave_core::TaskType;

    #[test]
    fn test_backoff_follows_strategy_name() {
        let mut cfg = OrchestratorConfig {
            backoff_unit_ms: 10,
            max_backoff_ms: Some(25),
            ..OrchestratorConfig::default()
        };
        assert_eq!(build_backoff(&cfg).name(), "exponential");

        cfg.backoff_strategy = "linear".to_string();
        let linear = build_backoff(&cfg);
        assert_eq!(linear.name(), "linear");
        assert_eq!(linear.delay(2), Duration::from_millis(20));
        assert_eq!(linear.delay(5), Duration::from_millis(25));

        cfg.backoff_strategy = "fixed".to_string();
        assert_eq!(build_backoff(&cfg).delay(7), Duration::from_millis(10));
    }

    #[test]
    fn test_registry_without_endpoint_has_no_compute() {
        let cfg = AppConfig::default();
        let registry = build_registry(
            &cfg,
            ToolRegistry::with_builtins(),
            Arc::new(InMemoryDecisionStore::new()),
        )
        .unwrap();

        assert!(registry.has(TaskType::ToolCall));
        assert!(registry.has(TaskType::HumanApproval));
        assert!(!registry.has(TaskType::Compute));
    }

    #[test]
    fn test_registry_with_endpoint_has_compute() {
        let mut cfg = AppConfig::default();
        cfg.model.endpoint = "http://localhost:11434/v1".to_string();
        let registry = build_registry(
            &cfg,
            ToolRegistry::new(),
            Arc::new(InMemoryDecisionStore::new()),
        )
        .unwrap();

        assert!(registry.has(TaskType::Compute));
    }
}
