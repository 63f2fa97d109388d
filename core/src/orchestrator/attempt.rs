//! Retry / backoff / timeout harness around a single-attempt executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::OrchestratorConfig;
use crate::error::ExecutorError;
use crate::executor::{Executor, ExecutorRegistry, TaskInvocation};
use crate::hooks::{EventPublisher, WorkflowEvent};
use crate::metrics::ExecutionMetrics;
use crate::model::{ResolvedInputs, TaskRecord, TaskResult, TaskStatus};

/// Delay before a retry.
pub trait BackoffStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Delay before retry number `retry` (1 for the first retry).
    fn delay(&self, retry: u32) -> Duration;
}

/// `unit * base^retry`, optionally capped.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: f64,
    unit: Duration,
    max: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(base: f64, unit: Duration) -> Self {
        Self {
            base,
            unit,
            max: None,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    pub fn from_config(cfg: &OrchestratorConfig) -> Self {
        let backoff = Self::new(cfg.backoff_base, Duration::from_millis(cfg.backoff_unit_ms));
        match cfg.max_backoff_ms {
            Some(ms) => backoff.with_max(Duration::from_millis(ms)),
            None => backoff,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(2.0, Duration::from_secs(1))
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential"
    }

    fn delay(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.unit.as_secs_f64() * self.base.powi(exp);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Runs one task through its whole attempt sequence.
///
/// Shared by every workflow an orchestrator drives; the semaphore bounds
/// concurrent attempts across all of them. Executors that do not hold a
/// worker skip it.
pub(crate) struct TaskRunner {
    pub(crate) registry: ExecutorRegistry,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) backoff: Arc<dyn BackoffStrategy>,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) metrics: Arc<ExecutionMetrics>,
    pub(crate) publisher: Option<Arc<dyn EventPublisher>>,
}

/// Identifies the workflow run a task belongs to.
#[derive(Debug, Clone)]
pub(crate) struct RunIds {
    pub(crate) workflow_id: String,
    pub(crate) run_id: String,
}

enum Attempt {
    Done(TaskResult),
    Retryable(String),
    Fatal(String),
    Cancelled,
}

impl TaskRunner {
    pub(crate) async fn run(
        &self,
        ids: RunIds,
        record: Arc<TaskRecord>,
        inputs: Arc<ResolvedInputs>,
        cancel: CancellationToken,
    ) -> TaskResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let task_id = record.task_id.as_str();

        let finish = |mut result: TaskResult, retries: u32| {
            result.task_id = record.task_id.clone();
            result.started_at = Some(started_at);
            result.completed_at = Some(Utc::now());
            result.duration_ms = Some(clock.elapsed().as_millis() as u64);
            result.retry_count = retries;
            if matches!(result.status, TaskStatus::Failed | TaskStatus::Cancelled) {
                result.outputs.clear();
            }
            result
        };

        let executor = match self.registry.resolve(&record) {
            Ok(executor) => executor,
            Err(e) => {
                error!(workflow_id = %ids.workflow_id, task_id, error = %e, "no executor for task");
                return finish(TaskResult::failed(task_id, e.to_string()), 0);
            }
        };
        let timeout = record.timeout.or(self.default_timeout);

        let mut retries = 0u32;
        loop {
            let attempt = retries + 1;
            let outcome = self
                .attempt(&ids, &executor, &record, &inputs, attempt, timeout, &cancel)
                .await;

            let error = match outcome {
                Attempt::Done(result) => return finish(result, retries),
                Attempt::Cancelled => return finish(TaskResult::cancelled(task_id), retries),
                Attempt::Fatal(error) => {
                    error!(workflow_id = %ids.workflow_id, task_id, attempt, %error, "task failed (not retryable)");
                    return finish(TaskResult::failed(task_id, error), retries);
                }
                Attempt::Retryable(error) => error,
            };

            if retries >= record.max_retries {
                error!(
                    workflow_id = %ids.workflow_id,
                    task_id,
                    attempts = attempt,
                    %error,
                    "task failed after exhausting retries"
                );
                return finish(TaskResult::failed(task_id, error), retries);
            }

            retries += 1;
            self.metrics.retry();
            let delay = self.backoff.delay(retries);
            warn!(
                workflow_id = %ids.workflow_id,
                task_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %error,
                "task attempt failed, retrying"
            );
            self.publish(WorkflowEvent::TaskRetrying {
                workflow_id: ids.workflow_id.clone(),
                run_id: ids.run_id.clone(),
                task_id: record.task_id.clone(),
                attempt,
                error,
                delay_ms: delay.as_millis() as u64,
                timestamp: Utc::now(),
            })
            .await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    return finish(TaskResult::cancelled(task_id), retries);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        ids: &RunIds,
        executor: &Arc<dyn Executor>,
        record: &Arc<TaskRecord>,
        inputs: &Arc<ResolvedInputs>,
        attempt: u32,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Attempt {
        let _permit = if executor.holds_worker() {
            let permit = tokio::select! {
                _ = cancel.cancelled() => return Attempt::Cancelled,
                permit = self.permits.clone().acquire_owned() => permit,
            };
            match permit {
                Ok(permit) => Some(permit),
                Err(_) => return Attempt::Fatal("worker pool closed".to_string()),
            }
        } else {
            None
        };

        self.metrics.attempt();
        debug!(
            workflow_id = %ids.workflow_id,
            task_id = %record.task_id,
            attempt,
            executor = executor.name(),
            "dispatching attempt"
        );

        let attempt_token = cancel.child_token();
        let invocation = TaskInvocation {
            workflow_id: ids.workflow_id.clone(),
            run_id: ids.run_id.clone(),
            record: record.clone(),
            inputs: inputs.clone(),
            attempt,
            cancel: attempt_token.clone(),
        };

        let bounded = async {
            let fut = executor.execute(invocation);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        attempt_token.cancel();
                        self.metrics.timeout();
                        Err(ExecutorError::Timeout(limit))
                    }
                },
                None => fut.await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Attempt::Cancelled,
            outcome = bounded => outcome,
        };

        match outcome {
            Ok(mut result) => match result.status {
                TaskStatus::Success | TaskStatus::WaitingHuman => Attempt::Done(result),
                TaskStatus::Running => {
                    result.status = TaskStatus::Success;
                    Attempt::Done(result)
                }
                TaskStatus::Failed => Attempt::Retryable(
                    result
                        .error
                        .take()
                        .unwrap_or_else(|| "task failed".to_string()),
                ),
                TaskStatus::Cancelled if cancel.is_cancelled() => Attempt::Cancelled,
                other => Attempt::Fatal(format!("executor returned non-final status {other}")),
            },
            Err(_) if cancel.is_cancelled() => Attempt::Cancelled,
            Err(e) if e.is_retryable() => Attempt::Retryable(e.to_string()),
            Err(e) => Attempt::Fatal(e.to_string()),
        }
    }

    pub(crate) async fn publish(&self, event: WorkflowEvent) {
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(event.topic(), &event).await {
                warn!(
                    workflow_id = event.workflow_id(),
                    event = event.event_type(),
                    error = %e,
                    "event publish failed"
                );
            }
        }
    }

    pub(crate) async fn flush(&self, workflow_id: &str) {
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.flush().await {
                warn!(workflow_id, error = %e, "event flush failed");
            }
        }
    }
}
