use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending request for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub workflow_id: String,
    pub run_id: String,
    pub task_id: String,
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub severity: String,
    /// Resolved inputs of the gated task.
    #[serde(default)]
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Approve,
    Reject,
    /// Approve with changes carried in `Decision::modifications`.
    Modify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub modifications: Option<serde_json::Value>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(kind: DecisionKind) -> Self {
        Self {
            kind,
            decided_by: None,
            comment: None,
            modifications: None,
            decided_at: Utc::now(),
        }
    }

    pub fn approve() -> Self {
        Self::new(DecisionKind::Approve)
    }

    pub fn reject(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::new(DecisionKind::Reject)
        }
    }

    pub fn modify(modifications: serde_json::Value) -> Self {
        Self {
            modifications: Some(modifications),
            ..Self::new(DecisionKind::Modify)
        }
    }

    pub fn by(mut self, who: impl Into<String>) -> Self {
        self.decided_by = Some(who.into());
        self
    }

    pub fn is_approval(&self) -> bool {
        matches!(self.kind, DecisionKind::Approve | DecisionKind::Modify)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionStatus {
    Pending,
    Decided(Decision),
}

impl DecisionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Store of human decision requests.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Registers a request and returns its id.
    async fn create(&self, request: DecisionRequest) -> Result<String>;

    async fn poll(&self, request_id: &str) -> Result<DecisionStatus>;

    /// Records a decision. A request can be decided only once.
    async fn decide(&self, request_id: &str, decision: Decision) -> Result<()>;

    /// Requests still waiting for a decision.
    async fn pending(&self) -> Result<Vec<(String, DecisionRequest)>>;

    /// Id of the request already filed for `task_id` in run `run_id`, so a
    /// retried attempt waits on it instead of filing another. The default
    /// only sees pending requests.
    async fn find(&self, run_id: &str, task_id: &str) -> Result<Option<String>> {
        Ok(self
            .pending()
            .await?
            .into_iter()
            .find(|(_, r)| r.run_id == run_id && r.task_id == task_id)
            .map(|(id, _)| id))
    }

    /// Waits up to `timeout` for a decision; returns `Pending` on expiry.
    ///
    /// The default implementation polls; stores with a wake-up channel should
    /// override it.
    async fn wait(&self, request_id: &str, timeout: Duration) -> Result<DecisionStatus> {
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            let status = self.poll(request_id).await?;
            let now = tokio::time::Instant::now();
            if !status.is_pending() || deadline.is_some_and(|d| now >= d) {
                return Ok(status);
            }
            let next = now + Duration::from_millis(100);
            tokio::time::sleep_until(deadline.map_or(next, |d| next.min(d))).await;
        }
    }
}
