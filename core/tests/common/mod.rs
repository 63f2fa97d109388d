#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use taskweave_core::hooks::{EventPublisher, StatePersister, WorkflowEvent, WorkflowHooks};
use taskweave_core::model::{TaskRecord, TaskResult, TaskType, WorkflowSnapshot, WorkflowState};
use taskweave_core::orchestrator::{ExponentialBackoff, OrchestratorBuilder};
use taskweave_core::{Executor, ExecutorError, ExecutorRegistry, Orchestrator, TaskInvocation};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("taskweave_core=debug")
        .try_init();
}

/// Tool-call task handled by [`ScriptedExecutor`].
pub fn task(id: &str, deps: &[&str]) -> TaskRecord {
    TaskRecord::new(id, TaskType::ToolCall).depends_on(deps.iter().copied())
}

/// Executor whose behaviour is read from `executor_config`:
/// `fail_times` (fail the first n attempts, -1 for always), `sleep_ms`,
/// `waiting_human` (bool) and `panic` (bool).
#[derive(Default)]
pub struct ScriptedExecutor {
    calls: Mutex<HashMap<String, u32>>,
    seen_inputs: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self, task_id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn inputs_of(&self, task_id: &str) -> Option<HashMap<String, Value>> {
        self.seen_inputs.lock().unwrap().get(task_id).cloned()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, inv: TaskInvocation) -> Result<TaskResult, ExecutorError> {
        let task_id = inv.task_id().to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(task_id.clone()).or_default();
            *n += 1;
            *n
        };
        self.seen_inputs
            .lock()
            .unwrap()
            .insert(task_id.clone(), inv.inputs.as_map().clone());

        let cfg = &inv.record.executor_config;
        if cfg.get("panic").and_then(Value::as_bool) == Some(true) {
            panic!("scripted panic in {task_id}");
        }
        if let Some(ms) = cfg.get("sleep_ms").and_then(Value::as_u64) {
            tokio::select! {
                _ = inv.cancel.cancelled() => return Err(ExecutorError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
            }
        }
        if let Some(n) = cfg.get("fail_times").and_then(Value::as_i64) {
            if n < 0 || i64::from(call) <= n {
                return Err(ExecutorError::Failed(format!("scripted failure #{call}")));
            }
        }
        if cfg.get("waiting_human").and_then(Value::as_bool) == Some(true) {
            return Ok(inv.waiting_human(HashMap::from([
                ("approval_required".to_string(), json!(true)),
            ])));
        }

        Ok(inv.success(HashMap::from([
            ("task".to_string(), json!(task_id)),
            ("attempt".to_string(), json!(inv.attempt)),
        ])))
    }
}

pub fn registry(executor: Arc<ScriptedExecutor>) -> ExecutorRegistry {
    ExecutorRegistry::builder().tool_call(executor).build()
}

/// Builder with a 1ms backoff unit so retries stay fast.
pub fn fast_builder(registry: ExecutorRegistry) -> OrchestratorBuilder {
    Orchestrator::builder(registry)
        .backoff(Arc::new(ExponentialBackoff::new(2.0, Duration::from_millis(1))))
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<(String, WorkflowEvent)>>,
    /// Number of events recorded at each flush.
    pub flushes: Mutex<Vec<usize>>,
}

impl RecordingPublisher {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.event_type())
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, event: &WorkflowEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let seen = self.events.lock().unwrap().len();
        self.flushes.lock().unwrap().push(seen);
        Ok(())
    }
}

/// Publisher, persister and hooks that fail on every call.
pub struct Broken;

#[async_trait]
impl EventPublisher for Broken {
    async fn publish(&self, _topic: &str, _event: &WorkflowEvent) -> anyhow::Result<()> {
        anyhow::bail!("broker unavailable")
    }
}

#[async_trait]
impl StatePersister for Broken {
    async fn save(&self, _workflow_id: &str, _snapshot: &WorkflowSnapshot) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn load(&self, _workflow_id: &str) -> anyhow::Result<Option<WorkflowSnapshot>> {
        anyhow::bail!("disk full")
    }
}

#[async_trait]
impl WorkflowHooks for Broken {
    async fn before_workflow(&self, _state: &WorkflowState) -> anyhow::Result<()> {
        anyhow::bail!("hook exploded")
    }

    async fn before_batch(&self, _batch_index: usize, _task_ids: &[String]) -> anyhow::Result<()> {
        anyhow::bail!("hook exploded")
    }

    async fn after_task(&self, _result: &TaskResult) -> anyhow::Result<()> {
        anyhow::bail!("hook exploded")
    }
}

#[derive(Default)]
pub struct MemoryPersister {
    pub saves: Mutex<Vec<WorkflowSnapshot>>,
}

#[async_trait]
impl StatePersister for MemoryPersister {
    async fn save(&self, _workflow_id: &str, snapshot: &WorkflowSnapshot) -> anyhow::Result<()> {
        self.saves.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: &str) -> anyhow::Result<Option<WorkflowSnapshot>> {
        Ok(self
            .saves
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.workflow_id == workflow_id)
            .cloned())
    }
}

/// Records the batches seen by `before_batch`.
#[derive(Default)]
pub struct BatchRecorder {
    pub batches: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl WorkflowHooks for BatchRecorder {
    async fn before_batch(&self, _batch_index: usize, task_ids: &[String]) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(task_ids.to_vec());
        Ok(())
    }
}
