//! Process-wide execution counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::model::{TaskStatus, WorkflowStatus};

#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    workflows_started: AtomicU64,
    workflows_completed: AtomicU64,
    workflows_failed: AtomicU64,
    workflows_cancelled: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_waiting_human: AtomicU64,
    tasks_cancelled: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub workflows_started: u64,
    pub workflows_completed: u64,
    pub workflows_failed: u64,
    pub workflows_cancelled: u64,
    pub attempts: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_waiting_human: u64,
    pub tasks_cancelled: u64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn workflow_started(&self) {
        self.workflows_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn workflow_finished(&self, status: WorkflowStatus) {
        let counter = match status {
            WorkflowStatus::Completed => &self.workflows_completed,
            WorkflowStatus::Failed => &self.workflows_failed,
            WorkflowStatus::Cancelled => &self.workflows_cancelled,
            WorkflowStatus::Running | WorkflowStatus::Paused => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Success => &self.tasks_succeeded,
            TaskStatus::Failed => &self.tasks_failed,
            TaskStatus::WaitingHuman => &self.tasks_waiting_human,
            TaskStatus::Cancelled => &self.tasks_cancelled,
            TaskStatus::Pending | TaskStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            workflows_started: load(&self.workflows_started),
            workflows_completed: load(&self.workflows_completed),
            workflows_failed: load(&self.workflows_failed),
            workflows_cancelled: load(&self.workflows_cancelled),
            attempts: load(&self.attempts),
            retries: load(&self.retries),
            timeouts: load(&self.timeouts),
            tasks_succeeded: load(&self.tasks_succeeded),
            tasks_failed: load(&self.tasks_failed),
            tasks_waiting_human: load(&self.tasks_waiting_human),
            tasks_cancelled: load(&self.tasks_cancelled),
        }
    }
}
