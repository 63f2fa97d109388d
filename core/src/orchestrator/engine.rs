use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::DagError;
use crate::executor::ExecutorRegistry;
use crate::hooks::{EventPublisher, StatePersister, WorkflowEvent, WorkflowHooks};
use crate::metrics::ExecutionMetrics;
use crate::model::{
    ResolvedInputs, TaskResult, TaskStatus, WorkflowDefinition, WorkflowState, WorkflowStatus,
};

use super::attempt::{BackoffStrategy, ExponentialBackoff, RunIds, TaskRunner};
use super::control::WorkflowControl;
use super::scheduler::Batch;

/// Drives workflows batch by batch over a fixed executor registry.
///
/// One orchestrator can run many workflows concurrently; they share the
/// worker pool and the metrics counters.
#[derive(Clone)]
pub struct Orchestrator {
    runner: Arc<TaskRunner>,
    hooks: Option<Arc<dyn WorkflowHooks>>,
    persister: Option<Arc<dyn StatePersister>>,
    metrics: Arc<ExecutionMetrics>,
}

pub struct OrchestratorBuilder {
    registry: ExecutorRegistry,
    max_concurrent_tasks: usize,
    backoff: Arc<dyn BackoffStrategy>,
    default_timeout: Option<Duration>,
    hooks: Option<Arc<dyn WorkflowHooks>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    persister: Option<Arc<dyn StatePersister>>,
    metrics: Option<Arc<ExecutionMetrics>>,
    publishing_enabled: bool,
    persistence_enabled: bool,
}

impl Orchestrator {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: ExecutorRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder::new(registry)
    }

    pub fn metrics(&self) -> &Arc<ExecutionMetrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.runner.registry
    }

    /// Runs `definition` to a terminal status.
    ///
    /// Only structural graph errors are returned as `Err`, before any task
    /// runs. Every task-level outcome is reported in the returned state.
    pub async fn execute_workflow(
        &self,
        definition: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
    ) -> Result<WorkflowState, DagError> {
        self.execute_workflow_with_control(definition, inputs, &WorkflowControl::new())
            .await
    }

    pub async fn execute_workflow_with_control(
        &self,
        definition: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
        control: &WorkflowControl,
    ) -> Result<WorkflowState, DagError> {
        let graph = definition.graph()?;
        let batches = graph.get_execution_order()?;

        let mut state = WorkflowState::new(&definition.workflow_id, graph.task_ids());
        let ids = RunIds {
            workflow_id: state.workflow_id.clone(),
            run_id: state.run_id.clone(),
        };
        let clock = Instant::now();

        info!(
            workflow_id = %ids.workflow_id,
            run_id = %ids.run_id,
            name = %definition.name,
            tasks = graph.len(),
            batches = batches.len(),
            "workflow started"
        );
        self.metrics.workflow_started();
        self.runner
            .publish(WorkflowEvent::WorkflowStarted {
                workflow_id: ids.workflow_id.clone(),
                run_id: ids.run_id.clone(),
                name: definition.name.clone(),
                task_count: graph.len(),
                timestamp: Utc::now(),
            })
            .await;
        self.hook("before_workflow", &ids, |h| h.before_workflow(&state))
            .await;
        self.persist(&state).await;

        for (index, batch_ids) in batches.iter().enumerate() {
            if control.is_paused() {
                state.status = WorkflowStatus::Paused;
                self.persist(&state).await;
                info!(workflow_id = %ids.workflow_id, batch = index, "workflow paused");
                let resumed = control.wait_while_paused().await;
                state.status = WorkflowStatus::Running;
                if resumed {
                    info!(workflow_id = %ids.workflow_id, batch = index, "workflow resumed");
                }
            }
            if control.is_cancelled() {
                break;
            }

            let (ready, blocked): (Vec<&String>, Vec<&String>) =
                batch_ids.iter().partition(|id| {
                    graph
                        .dependencies_of(id)
                        .iter()
                        .all(|dep| state.is_completed(dep))
                });
            for id in &blocked {
                info!(workflow_id = %ids.workflow_id, task_id = %id, "skipping task: upstream did not complete");
            }
            if ready.is_empty() {
                continue;
            }

            let ready: Vec<String> = ready.into_iter().cloned().collect();
            debug!(workflow_id = %ids.workflow_id, batch = index, tasks = ?ready, "batch started");
            self.hook("before_batch", &ids, |h| h.before_batch(index, &ready))
                .await;

            let mut batch = Batch::new();
            for task_id in &ready {
                let record = graph.get_task(task_id)?.clone();
                let resolved = ResolvedInputs::resolve(&inputs, &record, state.results());
                self.hook("before_task", &ids, |h| h.before_task(&record, &resolved))
                    .await;

                if let Err(e) = state.mark_running(task_id) {
                    warn!(workflow_id = %ids.workflow_id, task_id = %task_id, error = %e, "unexpected task state");
                }
                self.runner
                    .publish(WorkflowEvent::TaskStarted {
                        workflow_id: ids.workflow_id.clone(),
                        run_id: ids.run_id.clone(),
                        task_id: task_id.clone(),
                        task_type: record.task_type,
                        timestamp: Utc::now(),
                    })
                    .await;

                batch.spawn(
                    self.runner.clone(),
                    ids.clone(),
                    record,
                    Arc::new(resolved),
                    control.token(),
                );
            }

            debug!(workflow_id = %ids.workflow_id, batch = index, in_flight = batch.len(), "awaiting batch");
            while let Some(result) = batch.next().await {
                let result = self.settle(&ids, &state, result).await;
                self.hook("after_task", &ids, |h| h.after_task(&result))
                    .await;
                if let Err(e) = state.record(result) {
                    warn!(workflow_id = %ids.workflow_id, error = %e, "rejected task result");
                }
            }

            self.hook("after_batch", &ids, |h| h.after_batch(index, &state))
                .await;
            self.persist(&state).await;
        }

        let status = if control.is_cancelled() {
            cancel_unstarted(&mut state);
            WorkflowStatus::Cancelled
        } else if state.has_failures() {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };
        state.finish(status);
        self.metrics.workflow_finished(status);

        let duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            workflow_id = %ids.workflow_id,
            run_id = %ids.run_id,
            status = %status,
            completed = state.completed().len(),
            failed = state.failed().len(),
            pending_human = state.pending_human().len(),
            duration_ms,
            "workflow finished"
        );
        self.runner
            .publish(WorkflowEvent::WorkflowFinished {
                workflow_id: ids.workflow_id.clone(),
                run_id: ids.run_id.clone(),
                status,
                completed: state.completed(),
                failed: state.failed(),
                pending_human: state.pending_human(),
                duration_ms,
                timestamp: Utc::now(),
            })
            .await;
        self.runner.flush(&ids.workflow_id).await;
        self.hook("after_workflow", &ids, |h| h.after_workflow(&state))
            .await;
        self.persist(&state).await;

        Ok(state)
    }

    /// Fills timing for results that never went through the runner (panics)
    /// and reports the outcome.
    async fn settle(&self, ids: &RunIds, state: &WorkflowState, mut result: TaskResult) -> TaskResult {
        if result.started_at.is_none() {
            result.started_at = state.result(&result.task_id).and_then(|r| r.started_at);
            result.completed_at = Some(Utc::now());
        }

        self.metrics.task_finished(result.status);
        match result.status {
            TaskStatus::Success => info!(
                workflow_id = %ids.workflow_id,
                task_id = %result.task_id,
                retries = result.retry_count,
                duration_ms = result.duration_ms.unwrap_or_default(),
                "task succeeded"
            ),
            TaskStatus::WaitingHuman => info!(
                workflow_id = %ids.workflow_id,
                task_id = %result.task_id,
                "task waiting for human decision"
            ),
            TaskStatus::Cancelled => info!(
                workflow_id = %ids.workflow_id,
                task_id = %result.task_id,
                "task cancelled"
            ),
            _ => {}
        }

        self.runner
            .publish(WorkflowEvent::TaskFinished {
                workflow_id: ids.workflow_id.clone(),
                run_id: ids.run_id.clone(),
                task_id: result.task_id.clone(),
                status: result.status,
                retry_count: result.retry_count,
                duration_ms: result.duration_ms,
                error: result.error.clone(),
                timestamp: Utc::now(),
            })
            .await;
        if result.status == TaskStatus::WaitingHuman {
            self.runner
                .publish(WorkflowEvent::HumanDecisionRequested {
                    workflow_id: ids.workflow_id.clone(),
                    run_id: ids.run_id.clone(),
                    task_id: result.task_id.clone(),
                    request: result.outputs.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }

        result
    }

    async fn hook<'a, F, Fut>(&'a self, name: &str, ids: &RunIds, call: F)
    where
        F: FnOnce(&'a dyn WorkflowHooks) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + 'a,
    {
        if let Some(hooks) = &self.hooks {
            if let Err(e) = call(hooks.as_ref()).await {
                warn!(workflow_id = %ids.workflow_id, hook = name, error = %e, "workflow hook failed");
            }
        }
    }

    async fn persist(&self, state: &WorkflowState) {
        if let Some(persister) = &self.persister {
            if let Err(e) = persister.save(&state.workflow_id, &state.snapshot()).await {
                warn!(workflow_id = %state.workflow_id, error = %e, "state snapshot failed");
            }
        }
    }
}

/// Never-started tasks become CANCELLED once the workflow is cancelled.
fn cancel_unstarted(state: &mut WorkflowState) {
    let pending: Vec<String> = state
        .ordered_results()
        .filter(|r| r.status == TaskStatus::Pending)
        .map(|r| r.task_id.clone())
        .collect();
    for task_id in pending {
        if let Err(e) = state.record(TaskResult::cancelled(task_id)) {
            warn!(workflow_id = %state.workflow_id, error = %e, "failed to cancel task");
        }
    }
}

impl OrchestratorBuilder {
    pub fn new(registry: ExecutorRegistry) -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            registry,
            max_concurrent_tasks: defaults.max_concurrent_tasks,
            backoff: Arc::new(ExponentialBackoff::from_config(&defaults)),
            default_timeout: None,
            hooks: None,
            publisher: None,
            persister: None,
            metrics: None,
            publishing_enabled: defaults.event_publishing_enabled,
            persistence_enabled: defaults.state_persistence_enabled,
        }
    }

    /// Applies pool size, backoff, default timeout and the side-effect
    /// switches from config.
    pub fn config(mut self, cfg: &OrchestratorConfig) -> Self {
        self.max_concurrent_tasks = cfg.max_concurrent_tasks;
        self.backoff = Arc::new(ExponentialBackoff::from_config(cfg));
        self.default_timeout = cfg
            .default_timeout_secs
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok());
        self.publishing_enabled = cfg.event_publishing_enabled;
        self.persistence_enabled = cfg.state_persistence_enabled;
        self
    }

    pub fn max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    pub fn backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn WorkflowHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn persister(mut self, persister: Arc<dyn StatePersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn metrics(mut self, metrics: Arc<ExecutionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Orchestrator {
        let metrics = self.metrics.unwrap_or_default();
        let runner = TaskRunner {
            registry: self.registry,
            permits: Arc::new(Semaphore::new(self.max_concurrent_tasks.max(1))),
            backoff: self.backoff,
            default_timeout: self.default_timeout,
            metrics: metrics.clone(),
            publisher: self.publisher.filter(|_| self.publishing_enabled),
        };

        Orchestrator {
            runner: Arc::new(runner),
            hooks: self.hooks,
            persister: self.persister.filter(|_| self.persistence_enabled),
            metrics,
        }
    }
}
