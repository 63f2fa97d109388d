use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use taskweave_core::config::HitlSettings;
use taskweave_core::hooks::{DecisionKind, DecisionRequest, DecisionStatus, DecisionStore};
use taskweave_core::model::HitlConfig;
use taskweave_core::{Executor, ExecutorError, TaskInvocation, TaskResult};

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalMode {
    /// Return WAITING_HUMAN as soon as the request is filed.
    Advisory,
    /// Hold the task until a decision arrives or `timeout` passes.
    Blocking { timeout: Duration },
}

impl From<&HitlSettings> for ApprovalMode {
    fn from(cfg: &HitlSettings) -> Self {
        if cfg.wait_for_decision {
            Self::Blocking {
                timeout: Duration::from_secs(cfg.decision_timeout_secs),
            }
        } else {
            Self::Advisory
        }
    }
}

/// Files a decision request for human-approval tasks.
///
/// Advisory mode returns WAITING_HUMAN right away. Blocking mode resolves to
/// SUCCESS on approve or modify; rejection and decision timeout fail the task
/// without retries.
pub struct HumanApprovalExecutor {
    store: Arc<dyn DecisionStore>,
    mode: ApprovalMode,
}

impl HumanApprovalExecutor {
    pub fn new(store: Arc<dyn DecisionStore>, mode: ApprovalMode) -> Self {
        Self { store, mode }
    }

    pub fn advisory(store: Arc<dyn DecisionStore>) -> Self {
        Self::new(store, ApprovalMode::Advisory)
    }

    fn request_for(&self, inv: &TaskInvocation) -> DecisionRequest {
        let hitl = inv.record.hitl_config.clone().unwrap_or_default();
        let HitlConfig {
            approvers,
            channels,
            description,
            severity,
        } = hitl;
        DecisionRequest {
            workflow_id: inv.workflow_id.clone(),
            run_id: inv.run_id.clone(),
            task_id: inv.task_id().to_string(),
            approvers,
            channels,
            description: description.or_else(|| Some(inv.record.name.clone())),
            severity,
            context: inv.inputs.to_json(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Executor for HumanApprovalExecutor {
    fn name(&self) -> &str {
        "human_approval"
    }

    /// A blocking wait is a suspension, not work.
    fn holds_worker(&self) -> bool {
        self.mode == ApprovalMode::Advisory
    }

    async fn execute(&self, inv: TaskInvocation) -> Result<TaskResult, ExecutorError> {
        let request = self.request_for(&inv);
        let approvers = request.approvers.clone();
        let request_id = match self.store.find(&inv.run_id, inv.task_id()).await? {
            Some(id) => {
                tracing::info!(
                    target: "taskweave.hitl",
                    task_id = %inv.task_id(),
                    request_id = %id,
                    attempt = inv.attempt,
                    "resuming human decision request"
                );
                id
            }
            None => {
                let id = self.store.create(request).await?;
                tracing::info!(
                    target: "taskweave.hitl",
                    task_id = %inv.task_id(),
                    request_id = %id,
                    approvers = ?approvers,
                    "human decision requested"
                );
                id
            }
        };

        let mut outputs: HashMap<String, Value> = HashMap::from([
            ("approval_required".to_string(), json!(true)),
            ("request_id".to_string(), json!(request_id)),
            ("approvers".to_string(), json!(approvers)),
        ]);

        let timeout = match &self.mode {
            ApprovalMode::Advisory => return Ok(inv.waiting_human(outputs)),
            ApprovalMode::Blocking { timeout } => *timeout,
        };

        let status = tokio::select! {
            _ = inv.cancel.cancelled() => return Err(ExecutorError::Cancelled),
            status = self.store.wait(&request_id, timeout) => status?,
        };

        let decision = match status {
            DecisionStatus::Decided(d) => d,
            DecisionStatus::Pending => {
                tracing::warn!(
                    target: "taskweave.hitl",
                    task_id = %inv.task_id(),
                    request_id = %request_id,
                    "no decision before timeout"
                );
                return Err(ExecutorError::Permanent(format!(
                    "human decision {request_id} timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        match decision.kind {
            DecisionKind::Reject => Err(ExecutorError::Permanent(format!(
                "rejected by {}: {}",
                decision.decided_by.as_deref().unwrap_or("approver"),
                decision.comment.as_deref().unwrap_or("no comment")
            ))),
            DecisionKind::Approve | DecisionKind::Modify => {
                outputs.insert("approval_required".to_string(), json!(false));
                outputs.insert("decision".to_string(), json!(decision.kind));
                if let Some(by) = decision.decided_by {
                    outputs.insert("decided_by".to_string(), json!(by));
                }
                if let Some(comment) = decision.comment {
                    outputs.insert("comment".to_string(), json!(comment));
                }
                if let Some(m) = decision.modifications {
                    outputs.insert("modifications".to_string(), m);
                }
                Ok(inv.success(outputs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::testing::invocation;
    use crate::stores::InMemoryDecisionStore;
    use taskweave_core::hooks::Decision;
    use taskweave_core::{TaskRecord, TaskStatus, TaskType};

    fn gate() -> TaskRecord {
        TaskRecord::new("approve_release", TaskType::HumanApproval).with_hitl(HitlConfig {
            approvers: vec!["ops@example.com".to_string()],
            severity: "high".to_string(),
            ..HitlConfig::default()
        })
    }

    #[tokio::test]
    async fn test_advisory_files_request_and_waits_for_human() {
        let store = Arc::new(InMemoryDecisionStore::new());
        let exec = HumanApprovalExecutor::advisory(store.clone());
        let inputs = HashMap::from([("build".to_string(), json!("1.4.2"))]);

        let result = exec.execute(invocation(gate(), inputs)).await.unwrap();

        assert_eq!(result.status, TaskStatus::WaitingHuman);
        assert_eq!(result.outputs["approval_required"], json!(true));
        assert_eq!(result.outputs["approvers"], json!(["ops@example.com"]));

        let pending = store.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        let (id, request) = &pending[0];
        assert_eq!(result.outputs["request_id"], json!(id));
        assert_eq!(request.severity, "high");
        assert_eq!(request.channels, vec!["email".to_string()]);
        assert_eq!(request.context, json!({"build": "1.4.2"}));
    }

    #[tokio::test]
    async fn test_blocking_approve_succeeds() {
        let store = Arc::new(InMemoryDecisionStore::new());
        let exec = HumanApprovalExecutor::new(
            store.clone(),
            ApprovalMode::Blocking {
                timeout: Duration::from_secs(5),
            },
        );

        let decider = {
            let store = store.clone();
            tokio::spawn(async move {
                loop {
                    if let Some((id, _)) = store.pending().await.unwrap().into_iter().next() {
                        store
                            .decide(&id, Decision::approve().by("ops@example.com"))
                            .await
                            .unwrap();
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let result = exec
            .execute(invocation(gate(), HashMap::new()))
            .await
            .unwrap();
        decider.await.unwrap();

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.outputs["decision"], json!("approve"));
        assert_eq!(result.outputs["decided_by"], json!("ops@example.com"));
    }

    #[tokio::test]
    async fn test_blocking_reject_fails() {
        let store = Arc::new(InMemoryDecisionStore::new());
        let exec = HumanApprovalExecutor::new(
            store.clone(),
            ApprovalMode::Blocking {
                timeout: Duration::from_secs(5),
            },
        );
        let run = tokio::spawn(async move { exec.execute(invocation(gate(), HashMap::new())).await });

        let id = loop {
            if let Some((id, _)) = store.pending().await.unwrap().into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        store
            .decide(&id, Decision::reject("not this week").by("cto"))
            .await
            .unwrap();

        let err = run.await.unwrap().unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "rejected by cto: not this week");
    }

    #[tokio::test]
    async fn test_blocking_timeout_fails() {
        let store = Arc::new(InMemoryDecisionStore::new());
        let exec = HumanApprovalExecutor::new(
            store,
            ApprovalMode::Blocking {
                timeout: Duration::from_millis(30),
            },
        );

        let err = exec
            .execute(invocation(gate(), HashMap::new()))
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(err.to_string().contains("timed out after 0s"));
    }

    #[tokio::test]
    async fn test_interrupted_attempts_share_one_request() {
        let store = Arc::new(InMemoryDecisionStore::new());
        let exec = HumanApprovalExecutor::new(
            store.clone(),
            ApprovalMode::Blocking {
                timeout: Duration::from_secs(5),
            },
        );
        assert!(!exec.holds_worker());

        for attempt in 1..=3 {
            let mut inv = invocation(gate(), HashMap::new());
            inv.attempt = attempt;
            let deadline = inv.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                deadline.cancel();
            });
            let err = exec.execute(inv).await.unwrap_err();
            assert!(matches!(err, ExecutorError::Cancelled));
        }

        assert_eq!(store.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_picks_up_late_decision() {
        let store = Arc::new(InMemoryDecisionStore::new());
        let exec = HumanApprovalExecutor::new(
            store.clone(),
            ApprovalMode::Blocking {
                timeout: Duration::from_secs(5),
            },
        );

        let first = invocation(gate(), HashMap::new());
        first.cancel.cancel();
        assert!(exec.execute(first).await.is_err());

        let (id, _) = store.pending().await.unwrap().remove(0);
        store.decide(&id, Decision::approve()).await.unwrap();

        let mut second = invocation(gate(), HashMap::new());
        second.attempt = 2;
        let result = exec.execute(second).await.unwrap();
        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.outputs["request_id"], json!(id));
    }

    #[test]
    fn test_mode_from_settings() {
        let mut cfg = HitlSettings::default();
        assert_eq!(ApprovalMode::from(&cfg), ApprovalMode::Advisory);
        cfg.wait_for_decision = true;
        cfg.decision_timeout_secs = 60;
        assert_eq!(
            ApprovalMode::from(&cfg),
            ApprovalMode::Blocking {
                timeout: Duration::from_secs(60)
            }
        );
    }
}
