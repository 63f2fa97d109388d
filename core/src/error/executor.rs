use std::time::Duration;

use thiserror::Error;

/// Errors produced by a single execution attempt.
///
/// The orchestrator never returns these to its caller; they are folded into a
/// terminal `TaskResult`.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("no executor registered for task type '{0}'")]
    NoExecutor(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("Task execution timed out after {}s", format_secs(.0))]
    Timeout(Duration),

    #[error("task execution cancelled")]
    Cancelled,

    #[error("task execution failed: {0}")]
    Failed(String),

    /// Failure that repeating the attempt cannot fix.
    #[error("{0}")]
    Permanent(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutorError {
    /// Dispatch errors are deterministic; repeating the attempt cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::NoExecutor(_) | Self::NotImplemented(_) | Self::Permanent(_) | Self::Cancelled
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

fn format_secs(d: &Duration) -> String {
    let secs = d.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.3}")
    }
}
