use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::model::{ResolvedInputs, TaskRecord, TaskResult};

/// Everything an executor sees for one attempt.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub workflow_id: String,
    pub run_id: String,
    pub record: Arc<TaskRecord>,
    pub inputs: Arc<ResolvedInputs>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Fired on workflow cancel or when the attempt's deadline passes.
    pub cancel: CancellationToken,
}

impl TaskInvocation {
    pub fn task_id(&self) -> &str {
        &self.record.task_id
    }

    pub fn success(&self, outputs: HashMap<String, serde_json::Value>) -> TaskResult {
        TaskResult::success(self.task_id(), outputs)
    }

    pub fn waiting_human(&self, outputs: HashMap<String, serde_json::Value>) -> TaskResult {
        TaskResult::waiting_human(self.task_id(), outputs)
    }

    pub fn failed(&self, error: impl Into<String>) -> TaskResult {
        TaskResult::failed(self.task_id(), error)
    }
}

/// Single-attempt task execution capability.
///
/// Implementations compute one result and return. Retries, deadlines and
/// backoff belong to the orchestrator.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executor name (unique per registry slot)
    fn name(&self) -> &str;

    /// Whether an attempt occupies a worker-pool permit. Executors that spend
    /// their attempt suspended on an outside event (a human decision) return
    /// false so they do not starve other tasks.
    fn holds_worker(&self) -> bool {
        true
    }

    /// Returns SUCCESS, FAILED or WAITING_HUMAN. An `Err` counts as a failed
    /// attempt.
    async fn execute(&self, invocation: TaskInvocation) -> Result<TaskResult, ExecutorError>;
}
