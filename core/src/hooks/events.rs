use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{TaskStatus, TaskType, WorkflowStatus};

pub const TOPIC_WORKFLOW_EVENTS: &str = "workflow.events";
pub const TOPIC_TASK_EVENTS: &str = "task.events";
pub const TOPIC_HITL_REQUESTS: &str = "hitl.requests";

/// Lifecycle events published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: String,
        run_id: String,
        name: String,
        task_count: usize,
        timestamp: DateTime<Utc>,
    },
    WorkflowFinished {
        workflow_id: String,
        run_id: String,
        status: WorkflowStatus,
        completed: Vec<String>,
        failed: Vec<String>,
        pending_human: Vec<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        workflow_id: String,
        run_id: String,
        task_id: String,
        task_type: TaskType,
        timestamp: DateTime<Utc>,
    },
    TaskRetrying {
        workflow_id: String,
        run_id: String,
        task_id: String,
        attempt: u32,
        error: String,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TaskFinished {
        workflow_id: String,
        run_id: String,
        task_id: String,
        status: TaskStatus,
        retry_count: u32,
        duration_ms: Option<u64>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    HumanDecisionRequested {
        workflow_id: String,
        run_id: String,
        task_id: String,
        request: HashMap<String, serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } | Self::WorkflowFinished { .. } => TOPIC_WORKFLOW_EVENTS,
            Self::TaskStarted { .. } | Self::TaskRetrying { .. } | Self::TaskFinished { .. } => {
                TOPIC_TASK_EVENTS
            }
            Self::HumanDecisionRequested { .. } => TOPIC_HITL_REQUESTS,
        }
    }

    pub fn workflow_id(&self) -> &str {
        match self {
            Self::WorkflowStarted { workflow_id, .. }
            | Self::WorkflowFinished { workflow_id, .. }
            | Self::TaskStarted { workflow_id, .. }
            | Self::TaskRetrying { workflow_id, .. }
            | Self::TaskFinished { workflow_id, .. }
            | Self::HumanDecisionRequested { workflow_id, .. } => workflow_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::WorkflowFinished { .. } => "workflow_finished",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskRetrying { .. } => "task_retrying",
            Self::TaskFinished { .. } => "task_finished",
            Self::HumanDecisionRequested { .. } => "human_decision_requested",
        }
    }
}

/// Fire-and-forget event sink.
///
/// Errors are logged by the caller and never affect the workflow.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &WorkflowEvent) -> Result<()>;

    /// Waits until every event published so far has been delivered. Called
    /// once a workflow finishes.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_routing_and_tag() {
        let event = WorkflowEvent::HumanDecisionRequested {
            workflow_id: "wf".into(),
            run_id: "r1".into(),
            task_id: "gate".into(),
            request: HashMap::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.topic(), TOPIC_HITL_REQUESTS);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "human_decision_requested");
        assert_eq!(json["task_id"], "gate");
    }
}
