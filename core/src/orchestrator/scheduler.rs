use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::model::{ResolvedInputs, TaskRecord, TaskResult};

use super::attempt::{RunIds, TaskRunner};

type Joined = (String, Result<TaskResult, JoinError>);

/// Tasks of one batch running on the worker pool.
///
/// Every task is its own tokio task; results come back in completion order.
pub(crate) struct Batch {
    running: FuturesUnordered<BoxFuture<'static, Joined>>,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Self {
            running: FuturesUnordered::new(),
        }
    }

    pub(crate) fn spawn(
        &mut self,
        runner: Arc<TaskRunner>,
        ids: RunIds,
        record: Arc<TaskRecord>,
        inputs: Arc<ResolvedInputs>,
        cancel: CancellationToken,
    ) {
        let task_id = record.task_id.clone();
        let handle =
            tokio::spawn(async move { runner.run(ids, record, inputs, cancel).await });
        self.running
            .push(async move { (task_id, handle.await) }.boxed());
    }

    pub(crate) fn len(&self) -> usize {
        self.running.len()
    }

    /// Next finished task. A panicked task comes back as FAILED.
    pub(crate) async fn next(&mut self) -> Option<TaskResult> {
        let (task_id, joined) = self.running.next().await?;
        Some(match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => TaskResult::failed(task_id, "task panicked"),
            Err(e) => TaskResult::failed(task_id, format!("task aborted: {e}")),
        })
    }
}
