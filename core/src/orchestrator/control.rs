use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Pause / resume / cancel handle for one workflow execution.
///
/// Pause takes effect between batches. Cancel interrupts in-flight attempts
/// and any backoff wait.
#[derive(Debug, Clone)]
pub struct WorkflowControl {
    paused: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl Default for WorkflowControl {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            cancel: CancellationToken::new(),
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token fired on cancel; each task attempt receives a child of it.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Blocks while paused. Returns `false` if cancelled meanwhile.
    pub(crate) async fn wait_while_paused(&self) -> bool {
        let mut rx = self.paused.subscribe();
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            if !*rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
            }
        }
    }
}
