use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use taskweave_core::{Executor, ExecutorError, ResolvedInputs, TaskInvocation, TaskResult};

/// Externally supplied agent behind custom-agent tasks.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, inputs: &ResolvedInputs) -> anyhow::Result<HashMap<String, Value>>;
}

/// Adapts an [`Agent`] to the executor contract.
///
/// Register one per agent name with `ExecutorRegistryBuilder::agent`.
pub struct AgentExecutor {
    agent: Arc<dyn Agent>,
}

impl AgentExecutor {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    fn name(&self) -> &str {
        self.agent.name()
    }

    async fn execute(&self, inv: TaskInvocation) -> Result<TaskResult, ExecutorError> {
        tracing::debug!(
            target: "taskweave.agent",
            task_id = %inv.task_id(),
            agent = self.agent.name(),
            attempt = inv.attempt,
            "running agent"
        );
        let res = tokio::select! {
            _ = inv.cancel.cancelled() => return Err(ExecutorError::Cancelled),
            res = self.agent.run(&inv.inputs) => res,
        };
        let outputs = res
            .map_err(|e| ExecutorError::Failed(format!("agent '{}': {e:#}", self.agent.name())))?;
        Ok(inv.success(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::testing::invocation;
    use serde_json::json;
    use taskweave_core::{ExecutorRegistry, TaskRecord, TaskStatus, TaskType};

    struct Greeter;

    #[async_trait]
    impl Agent for Greeter {
        fn name(&self) -> &str {
            "greeter"
        }

        async fn run(&self, inputs: &ResolvedInputs) -> anyhow::Result<HashMap<String, Value>> {
            let who = inputs
                .get_str("who")
                .ok_or_else(|| anyhow::anyhow!("missing 'who'"))?;
            Ok(HashMap::from([(
                "greeting".to_string(),
                json!(format!("hello, {who}")),
            )]))
        }
    }

    fn agent_task() -> TaskRecord {
        TaskRecord::new("greet", TaskType::CustomAgent).with_config("agent", json!("greeter"))
    }

    #[tokio::test]
    async fn test_agent_outputs_become_task_outputs() {
        let exec = AgentExecutor::new(Arc::new(Greeter));
        let inputs = HashMap::from([("who".to_string(), json!("ada"))]);

        let result = exec.execute(invocation(agent_task(), inputs)).await.unwrap();

        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.outputs["greeting"], json!("hello, ada"));
    }

    #[tokio::test]
    async fn test_agent_error_is_retryable_failure() {
        let exec = AgentExecutor::new(Arc::new(Greeter));
        let err = exec
            .execute(invocation(agent_task(), HashMap::new()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("agent 'greeter': missing 'who'"));
    }

    #[test]
    fn test_registry_resolves_agent_by_name() {
        let registry = ExecutorRegistry::builder()
            .agent("greeter", Arc::new(AgentExecutor::new(Arc::new(Greeter))))
            .build();
        let executor = registry.resolve(&agent_task()).unwrap();
        assert_eq!(executor.name(), "greeter");
    }
}
