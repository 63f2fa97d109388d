//! Executors for each task type.

pub mod agent;
pub mod compute;
pub mod http_backend;
pub mod human;
pub mod tool;

pub use agent::{Agent, AgentExecutor};
pub use compute::{
    ComputeExecutor, ModelBackend, ModelCallMetrics, ModelDefaults, ModelRequest, ModelResponse,
};
pub use http_backend::{HttpModelBackend, ModelHttpError, ModelHttpErrorKind};
pub use human::{ApprovalMode, HumanApprovalExecutor};
pub use tool::{ToolCallExecutor, ToolFn, ToolRegistry};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::Value;
    use taskweave_core::{ResolvedInputs, TaskInvocation, TaskRecord};
    use tokio_util::sync::CancellationToken;

    pub(crate) fn invocation(record: TaskRecord, inputs: HashMap<String, Value>) -> TaskInvocation {
        TaskInvocation {
            workflow_id: "wf-test".to_string(),
            run_id: "run-test".to_string(),
            record: Arc::new(record),
            inputs: Arc::new(ResolvedInputs::from(inputs)),
            attempt: 1,
            cancel: CancellationToken::new(),
        }
    }
}
