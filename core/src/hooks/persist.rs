use anyhow::Result;
use async_trait::async_trait;

use crate::model::WorkflowSnapshot;

/// Storage for workflow snapshots, keyed by workflow id.
///
/// The orchestrator saves at start, after every batch and at the end. Save
/// failures are logged and ignored.
#[async_trait]
pub trait StatePersister: Send + Sync {
    async fn save(&self, workflow_id: &str, snapshot: &WorkflowSnapshot) -> Result<()>;

    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowSnapshot>>;
}
