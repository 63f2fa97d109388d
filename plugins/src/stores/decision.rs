use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use taskweave_core::hooks::{Decision, DecisionRequest, DecisionStatus, DecisionStore};
use tokio::sync::Notify;

struct Entry {
    request: DecisionRequest,
    decision: Option<Decision>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

/// Process-local decision store. Waiters are woken through a per-request
/// [`Notify`].
#[derive(Default)]
pub struct InMemoryDecisionStore {
    inner: Mutex<Inner>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("decision store lock poisoned"))
    }

    /// Drops decided requests and returns how many were removed. Long-lived
    /// processes call this once the decisions have been consumed.
    pub fn prune_decided(&self) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.decision.is_none());
        let Inner { entries, order } = &mut *inner;
        order.retain(|id| entries.contains_key(id));
        Ok(before - inner.entries.len())
    }

    fn notifier(&self, request_id: &str) -> Result<Arc<Notify>> {
        let inner = self.lock()?;
        inner
            .entries
            .get(request_id)
            .map(|e| e.notify.clone())
            .ok_or_else(|| anyhow!("unknown decision request '{request_id}'"))
    }
}

#[async_trait]
impl DecisionStore for InMemoryDecisionStore {
    async fn create(&self, request: DecisionRequest) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.lock()?;
        inner.entries.insert(
            id.clone(),
            Entry {
                request,
                decision: None,
                notify: Arc::new(Notify::new()),
            },
        );
        inner.order.push(id.clone());
        Ok(id)
    }

    async fn poll(&self, request_id: &str) -> Result<DecisionStatus> {
        let inner = self.lock()?;
        let entry = inner
            .entries
            .get(request_id)
            .ok_or_else(|| anyhow!("unknown decision request '{request_id}'"))?;
        Ok(match &entry.decision {
            Some(d) => DecisionStatus::Decided(d.clone()),
            None => DecisionStatus::Pending,
        })
    }

    async fn decide(&self, request_id: &str, decision: Decision) -> Result<()> {
        let notify = {
            let mut inner = self.lock()?;
            let entry = inner
                .entries
                .get_mut(request_id)
                .ok_or_else(|| anyhow!("unknown decision request '{request_id}'"))?;
            if entry.decision.is_some() {
                bail!("decision request '{request_id}' is already decided");
            }
            tracing::info!(
                target: "taskweave.hitl",
                request_id,
                task_id = %entry.request.task_id,
                kind = ?decision.kind,
                "decision recorded"
            );
            entry.decision = Some(decision);
            entry.notify.clone()
        };
        notify.notify_waiters();
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<(String, DecisionRequest)>> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|e| (id, e)))
            .filter(|(_, e)| e.decision.is_none())
            .map(|(id, e)| (id.clone(), e.request.clone()))
            .collect())
    }

    /// Also finds decided requests, so a decision that lands between two
    /// attempts is not lost.
    async fn find(&self, run_id: &str, task_id: &str) -> Result<Option<String>> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .rev()
            .find(|id| {
                inner
                    .entries
                    .get(id.as_str())
                    .is_some_and(|e| e.request.run_id == run_id && e.request.task_id == task_id)
            })
            .cloned())
    }

    async fn wait(&self, request_id: &str, timeout: Duration) -> Result<DecisionStatus> {
        let notify = self.notifier(request_id)?;
        // A timeout too large for the clock means no deadline.
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register before checking so a decide() in between is not missed.
            notified.as_mut().enable();

            let status = self.poll(request_id).await?;
            if !status.is_pending() {
                return Ok(status);
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.poll(request_id).await;
                    }
                }
                None => notified.await,
            }
        }
    }
}
