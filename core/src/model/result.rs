use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    WaitingHuman,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::WaitingHuman => "waiting_human",
            Self::Cancelled => "cancelled",
        }
    }

    /// No further automatic transition happens from these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// The batch barrier releases once every task reaches one of these.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::WaitingHuman | Self::Cancelled
        )
    }

    /// Whether dependents may be scheduled after this status.
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, Self::Success | Self::WaitingHuman)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one task across its attempt sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,

    pub status: TaskStatus,

    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Wall time from first attempt start to final status, retries included.
    #[serde(default)]
    pub duration_ms: Option<u64>,

    /// Retries consumed (attempts - 1).
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
}

impl TaskResult {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self::with_status(task_id, TaskStatus::Pending)
    }

    pub fn success(task_id: impl Into<String>, outputs: HashMap<String, serde_json::Value>) -> Self {
        let mut result = Self::with_status(task_id, TaskStatus::Success);
        result.outputs = outputs;
        result
    }

    pub fn waiting_human(
        task_id: impl Into<String>,
        outputs: HashMap<String, serde_json::Value>,
    ) -> Self {
        let mut result = Self::with_status(task_id, TaskStatus::WaitingHuman);
        result.outputs = outputs;
        result
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::with_status(task_id, TaskStatus::Failed);
        result.error = Some(error.into());
        result
    }

    pub fn cancelled(task_id: impl Into<String>) -> Self {
        let mut result = Self::with_status(task_id, TaskStatus::Cancelled);
        result.error = Some("task execution cancelled".to_string());
        result
    }

    fn with_status(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            outputs: HashMap::new(),
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            retry_count: 0,
            metrics: HashMap::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn is_successful(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
