use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::result::{TaskResult, TaskStatus};
use super::task::{HitlConfig, TaskRecord, TaskType};
use super::transitions::{StatusTransition, TransitionError};
use crate::error::DagError;
use crate::graph::TaskGraph;

fn new_workflow_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Compiled, immutable workflow: task list plus the edges they declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default = "new_workflow_id")]
    pub workflow_id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub tasks: Vec<TaskRecord>,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Build and validate the dependency graph for this definition.
    pub fn graph(&self) -> Result<TaskGraph, DagError> {
        let graph = TaskGraph::from_records(self.tasks.iter().cloned())?;
        graph.validate()?;
        Ok(graph)
    }
}

/// Fluent builder producing a [`WorkflowDefinition`].
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    workflow_id: Option<String>,
    name: String,
    description: Option<String>,
    tasks: Vec<TaskRecord>,
    metadata: HashMap<String, Value>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow_id: None,
            name: name.into(),
            description: None,
            tasks: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn add_task(mut self, record: TaskRecord) -> Self {
        self.tasks.push(record);
        self
    }

    /// Model inference task. `model` falls back to the backend default.
    pub fn add_compute_task(
        self,
        task_id: impl Into<String>,
        prompt: impl Into<String>,
        model: Option<&str>,
        dependencies: &[&str],
    ) -> Self {
        let mut record = TaskRecord::new(task_id, TaskType::Compute)
            .with_config("prompt", Value::String(prompt.into()))
            .depends_on(dependencies.iter().copied());
        if let Some(model) = model {
            record = record.with_config("model", Value::String(model.to_string()));
        }
        self.add_task(record)
    }

    pub fn add_tool_task(
        self,
        task_id: impl Into<String>,
        tool: impl Into<String>,
        dependencies: &[&str],
    ) -> Self {
        let record = TaskRecord::new(task_id, TaskType::ToolCall)
            .with_config("tool", Value::String(tool.into()))
            .depends_on(dependencies.iter().copied());
        self.add_task(record)
    }

    pub fn add_hitl_gate(
        self,
        task_id: impl Into<String>,
        approvers: Vec<String>,
        dependencies: &[&str],
    ) -> Self {
        let hitl = HitlConfig {
            approvers,
            ..HitlConfig::default()
        };
        let record = TaskRecord::new(task_id, TaskType::HumanApproval)
            .with_hitl(hitl)
            .depends_on(dependencies.iter().copied());
        self.add_task(record)
    }

    pub fn add_agent_task(
        self,
        task_id: impl Into<String>,
        agent: impl Into<String>,
        dependencies: &[&str],
    ) -> Self {
        let record = TaskRecord::new(task_id, TaskType::CustomAgent)
            .with_config("agent", Value::String(agent.into()))
            .depends_on(dependencies.iter().copied());
        self.add_task(record)
    }

    /// Freeze the task list. Fails on an empty or structurally invalid graph.
    pub fn compile(self) -> Result<WorkflowDefinition, DagError> {
        let definition = WorkflowDefinition {
            workflow_id: self.workflow_id.unwrap_or_else(new_workflow_id),
            name: self.name,
            description: self.description,
            tasks: self.tasks,
            metadata: self.metadata,
            created_at: Utc::now(),
        };
        definition.graph()?;
        Ok(definition)
    }
}

/// Overall workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one workflow execution.
///
/// The completed/running/failed/pending-human views are computed from the
/// result map every time they are read.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub workflow_id: String,
    /// Distinguishes concurrent executions of the same definition.
    pub run_id: String,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    results: HashMap<String, TaskResult>,
    task_order: Vec<String>,
}

impl WorkflowState {
    /// Fresh state with every task PENDING.
    pub fn new<'a, I>(workflow_id: impl Into<String>, task_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let task_order: Vec<String> = task_ids.into_iter().map(str::to_string).collect();
        let results = task_order
            .iter()
            .map(|id| (id.clone(), TaskResult::pending(id.clone())))
            .collect();

        Self {
            workflow_id: workflow_id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            results,
            task_order,
        }
    }

    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.get(task_id)
    }

    pub fn results(&self) -> &HashMap<String, TaskResult> {
        &self.results
    }

    /// Results in task declaration order.
    pub fn ordered_results(&self) -> impl Iterator<Item = &TaskResult> {
        self.task_order.iter().filter_map(|id| self.results.get(id))
    }

    pub fn task_count(&self) -> usize {
        self.task_order.len()
    }

    fn ids_where<F>(&self, pred: F) -> Vec<String>
    where
        F: Fn(TaskStatus) -> bool,
    {
        self.ordered_results()
            .filter(|r| pred(r.status))
            .map(|r| r.task_id.clone())
            .collect()
    }

    /// Tasks that unblock their dependents (SUCCESS or WAITING_HUMAN).
    pub fn completed(&self) -> Vec<String> {
        self.ids_where(|s| s.unblocks_dependents())
    }

    pub fn running(&self) -> Vec<String> {
        self.ids_where(|s| s == TaskStatus::Running)
    }

    pub fn failed(&self) -> Vec<String> {
        self.ids_where(|s| s == TaskStatus::Failed)
    }

    pub fn pending_human(&self) -> Vec<String> {
        self.ids_where(|s| s == TaskStatus::WaitingHuman)
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.ids_where(|s| s == TaskStatus::Cancelled)
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.results
            .get(task_id)
            .is_some_and(|r| r.status.unblocks_dependents())
    }

    pub fn has_failures(&self) -> bool {
        self.results.values().any(|r| r.status == TaskStatus::Failed)
    }

    pub fn has_pending_human(&self) -> bool {
        self.results
            .values()
            .any(|r| r.status == TaskStatus::WaitingHuman)
    }

    /// Fraction of tasks in the completed set.
    pub fn progress(&self) -> f64 {
        if self.task_order.is_empty() {
            return 0.0;
        }
        self.completed().len() as f64 / self.task_order.len() as f64
    }

    /// Moves a task to RUNNING, stamping `started_at` on first entry.
    pub(crate) fn mark_running(&mut self, task_id: &str) -> Result<(), TransitionError> {
        if let Some(result) = self.results.get_mut(task_id) {
            StatusTransition::validate(result.status, TaskStatus::Running)?;
            result.status = TaskStatus::Running;
            result.started_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    /// Replaces a task's result after validating the status change.
    pub(crate) fn record(&mut self, result: TaskResult) -> Result<(), TransitionError> {
        if let Some(current) = self.results.get(&result.task_id) {
            if current.status != result.status {
                StatusTransition::validate(current.status, result.status)?;
            }
        }
        self.results.insert(result.task_id.clone(), result);
        Ok(())
    }

    pub(crate) fn finish(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            status: self.status,
            results: self.ordered_results().cloned().collect(),
            completed: self.completed(),
            running: self.running(),
            failed: self.failed(),
            pending_human: self.pending_human(),
            progress: self.progress(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            saved_at: Utc::now(),
        }
    }
}

/// Serializable view of a [`WorkflowState`] with the derived sets
/// materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub run_id: String,
    pub status: WorkflowStatus,
    pub results: Vec<TaskResult>,
    pub completed: Vec<String>,
    pub running: Vec<String>,
    pub failed: Vec<String>,
    pub pending_human: Vec<String>,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub saved_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize workflow snapshot")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize workflow snapshot")
    }

    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }
}
