use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use taskweave_core::config::ModelConfig;
use taskweave_core::{Executor, ExecutorError, ResolvedInputs, TaskInvocation, TaskResult};

/// One model call, already resolved against the executor defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub raw: Value,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Completion capability behind compute tasks.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: ModelRequest) -> anyhow::Result<ModelResponse>;
}

/// Counters shared by every compute task an executor runs.
#[derive(Debug, Default)]
pub struct ModelCallMetrics {
    calls: AtomicU64,
    failures: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelCallSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ModelCallMetrics {
    fn record_success(&self, response: &ModelResponse) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(response.input_tokens, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(response.output_tokens, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ModelCallSnapshot {
        ModelCallSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefaults {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl From<&ModelConfig> for ModelDefaults {
    fn from(cfg: &ModelConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

/// Runs compute tasks against a [`ModelBackend`].
///
/// `executor_config` may set `prompt`, `model`, `temperature` and
/// `max_tokens`. Without a prompt the resolved inputs are rendered as one.
pub struct ComputeExecutor {
    backend: Arc<dyn ModelBackend>,
    defaults: ModelDefaults,
    metrics: Arc<ModelCallMetrics>,
}

impl ComputeExecutor {
    pub fn new(backend: Arc<dyn ModelBackend>, defaults: ModelDefaults) -> Self {
        Self {
            backend,
            defaults,
            metrics: Arc::new(ModelCallMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<ModelCallMetrics> {
        self.metrics.clone()
    }

    fn request_for(&self, inv: &TaskInvocation) -> Result<ModelRequest, ExecutorError> {
        let cfg = &inv.record.executor_config;
        let prompt = match cfg.get("prompt") {
            Some(Value::String(p)) if !p.trim().is_empty() => p.clone(),
            Some(Value::String(_)) | None => render_inputs(&inv.inputs),
            Some(other) => {
                return Err(ExecutorError::Failed(format!(
                    "prompt must be a string, got {other}"
                )))
            }
        };
        if prompt.is_empty() {
            return Err(ExecutorError::Failed(
                "compute task has no prompt and no inputs".to_string(),
            ));
        }

        let max_tokens = match cfg.get("max_tokens").and_then(Value::as_u64) {
            Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
            None => self.defaults.max_tokens,
        };
        Ok(ModelRequest {
            model: inv
                .record
                .config_str("model")
                .unwrap_or(&self.defaults.model)
                .to_string(),
            prompt,
            temperature: cfg
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(self.defaults.temperature),
            max_tokens,
        })
    }
}

/// `key: value` lines in key order; strings are written bare.
fn render_inputs(inputs: &ResolvedInputs) -> String {
    let mut entries: Vec<_> = inputs.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}: {s}"),
            other => format!("{k}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Executor for ComputeExecutor {
    fn name(&self) -> &str {
        "compute"
    }

    async fn execute(&self, inv: TaskInvocation) -> Result<TaskResult, ExecutorError> {
        let request = self.request_for(&inv)?;
        tracing::debug!(
            target: "taskweave.compute",
            stage = "compute.request",
            task_id = %inv.task_id(),
            backend = self.backend.name(),
            model = %request.model,
            prompt_len = request.prompt.len(),
            attempt = inv.attempt
        );

        let response = tokio::select! {
            _ = inv.cancel.cancelled() => return Err(ExecutorError::Cancelled),
            res = self.backend.complete(request) => res,
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.metrics.record_failure();
                return Err(ExecutorError::Backend(format!("{e:#}")));
            }
        };
        self.metrics.record_success(&response);

        tracing::debug!(
            target: "taskweave.compute",
            stage = "compute.response",
            task_id = %inv.task_id(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens
        );

        let outputs = HashMap::from([
            ("result".to_string(), Value::String(response.content)),
            ("raw_response".to_string(), response.raw),
        ]);
        Ok(inv
            .success(outputs)
            .with_metric("input_tokens", json!(response.input_tokens))
            .with_metric("output_tokens", json!(response.output_tokens))
            .with_metric("model", json!(response.model)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::executors::testing::invocation;
    use taskweave_core::{TaskRecord, TaskStatus, TaskType};

    #[derive(Default)]
    struct FakeBackend {
        seen: Mutex<Vec<ModelRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ModelBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, request: ModelRequest) -> anyhow::Result<ModelResponse> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                anyhow::bail!("upstream 503");
            }
            Ok(ModelResponse {
                content: format!("echo: {}", request.prompt),
                raw: json!({"id": "cmpl-1"}),
                model: request.model,
                input_tokens: 12,
                output_tokens: 5,
            })
        }
    }

    #[tokio::test]
    async fn test_compute_uses_config_prompt_and_overrides() {
        let backend = Arc::new(FakeBackend::default());
        let exec = ComputeExecutor::new(backend.clone(), ModelDefaults::default());
        let record = TaskRecord::new("summarize", TaskType::Compute)
            .with_config("prompt", json!("Summarize the report"))
            .with_config("model", json!("gpt-4o"))
            .with_config("max_tokens", json!(256));

        let result = exec.execute(invocation(record, HashMap::new())).await.unwrap();

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.outputs["result"], json!("echo: Summarize the report"));
        assert_eq!(result.outputs["raw_response"], json!({"id": "cmpl-1"}));
        assert_eq!(result.metrics["model"], json!("gpt-4o"));
        assert_eq!(result.metrics["input_tokens"], json!(12));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, 256);
        assert_eq!(seen[0].temperature, 0.7);
        assert_eq!(exec.metrics().snapshot().output_tokens, 5);
    }

    #[tokio::test]
    async fn test_compute_renders_inputs_without_prompt() {
        let backend = Arc::new(FakeBackend::default());
        let exec = ComputeExecutor::new(backend.clone(), ModelDefaults::default());
        let record = TaskRecord::new("t", TaskType::Compute);
        let inputs = HashMap::from([
            ("topic".to_string(), json!("rust")),
            ("limit".to_string(), json!(3)),
        ]);

        exec.execute(invocation(record, inputs)).await.unwrap();

        assert_eq!(backend.seen.lock().unwrap()[0].prompt, "limit: 3\ntopic: rust");
    }

    #[tokio::test]
    async fn test_compute_without_prompt_or_inputs_fails() {
        let exec = ComputeExecutor::new(Arc::new(FakeBackend::default()), ModelDefaults::default());
        let record = TaskRecord::new("t", TaskType::Compute);
        let err = exec
            .execute(invocation(record, HashMap::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no prompt"));
    }

    #[tokio::test]
    async fn test_backend_error_is_counted() {
        let backend = Arc::new(FakeBackend {
            fail: true,
            ..Default::default()
        });
        let exec = ComputeExecutor::new(backend, ModelDefaults::default());
        let record = TaskRecord::new("t", TaskType::Compute).with_config("prompt", json!("hi"));

        let err = exec
            .execute(invocation(record, HashMap::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Backend(ref m) if m.contains("upstream 503")));
        let snap = exec.metrics().snapshot();
        assert_eq!(snap.calls, 1);
        assert_eq!(snap.failures, 1);
    }
}
