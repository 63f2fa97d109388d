use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use taskweave_core::hooks::WorkflowHooks;
use taskweave_core::{ResolvedInputs, TaskRecord, TaskResult, TaskStatus, WorkflowState};

/// Progress bar over settled tasks, drawn on stderr.
pub struct ProgressHooks {
    bar: ProgressBar,
}

impl ProgressHooks {
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(0),
            if visible {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        let style =
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }

    /// Visible only when stderr is a terminal.
    pub fn for_terminal(enabled: bool) -> Self {
        Self::new(enabled && atty::is(atty::Stream::Stderr))
    }
}

#[async_trait]
impl WorkflowHooks for ProgressHooks {
    async fn before_workflow(&self, state: &WorkflowState) -> Result<()> {
        self.bar.set_length(state.task_count() as u64);
        self.bar.enable_steady_tick(Duration::from_millis(120));
        Ok(())
    }

    async fn before_batch(&self, batch_index: usize, task_ids: &[String]) -> Result<()> {
        self.bar
            .set_message(format!("batch {}: {}", batch_index + 1, task_ids.join(", ")));
        Ok(())
    }

    async fn before_task(&self, record: &TaskRecord, _inputs: &ResolvedInputs) -> Result<()> {
        tracing::debug!(task_id = %record.task_id, "task queued");
        Ok(())
    }

    async fn after_task(&self, result: &TaskResult) -> Result<()> {
        self.bar.inc(1);
        match result.status {
            TaskStatus::Success => {}
            TaskStatus::WaitingHuman => self
                .bar
                .println(format!("  {} waiting for human approval", result.task_id)),
            _ => self.bar.println(format!(
                "  {} {}: {}",
                result.task_id,
                result.status,
                result.error.as_deref().unwrap_or("")
            )),
        }
        Ok(())
    }

    async fn after_workflow(&self, state: &WorkflowState) -> Result<()> {
        self.bar
            .finish_with_message(format!("workflow {}", state.status));
        Ok(())
    }
}
