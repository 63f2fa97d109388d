use anyhow::Result;
use async_trait::async_trait;

use crate::model::{ResolvedInputs, TaskRecord, TaskResult, WorkflowState};

/// Observer callbacks around workflow execution.
///
/// All methods default to no-ops. Errors are logged with `warn!` and never
/// change the workflow outcome.
#[async_trait]
pub trait WorkflowHooks: Send + Sync {
    async fn before_workflow(&self, _state: &WorkflowState) -> Result<()> {
        Ok(())
    }

    async fn before_batch(&self, _batch_index: usize, _task_ids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn before_task(&self, _record: &TaskRecord, _inputs: &ResolvedInputs) -> Result<()> {
        Ok(())
    }

    async fn after_task(&self, _result: &TaskResult) -> Result<()> {
        Ok(())
    }

    async fn after_batch(&self, _batch_index: usize, _state: &WorkflowState) -> Result<()> {
        Ok(())
    }

    async fn after_workflow(&self, _state: &WorkflowState) -> Result<()> {
        Ok(())
    }
}
