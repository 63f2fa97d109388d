use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ExecutorError;
use crate::model::{TaskRecord, TaskType};

use super::traits::Executor;

/// Immutable task-type → executor mapping.
///
/// Cloning is cheap; every slot is behind an `Arc`.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    compute: Option<Arc<dyn Executor>>,
    tool_call: Option<Arc<dyn Executor>>,
    human_approval: Option<Arc<dyn Executor>>,
    agents: Arc<HashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::default()
    }

    /// Executor responsible for `record`.
    ///
    /// Custom-agent tasks look up the agent named by `executor_config.agent`.
    pub fn resolve(&self, record: &TaskRecord) -> Result<Arc<dyn Executor>, ExecutorError> {
        let slot = match record.task_type {
            TaskType::Compute => &self.compute,
            TaskType::ToolCall => &self.tool_call,
            TaskType::HumanApproval => &self.human_approval,
            TaskType::CustomAgent => {
                let name = record.config_str("agent");
                return name
                    .and_then(|n| self.agents.get(n))
                    .cloned()
                    .ok_or_else(|| {
                        ExecutorError::NotImplemented(format!(
                            "custom agent '{}' is not registered",
                            name.unwrap_or("<unnamed>")
                        ))
                    });
            }
        };

        slot.clone()
            .ok_or_else(|| ExecutorError::NoExecutor(record.task_type.to_string()))
    }

    pub fn has(&self, task_type: TaskType) -> bool {
        match task_type {
            TaskType::Compute => self.compute.is_some(),
            TaskType::ToolCall => self.tool_call.is_some(),
            TaskType::HumanApproval => self.human_approval.is_some(),
            TaskType::CustomAgent => !self.agents.is_empty(),
        }
    }

    pub fn agent_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |slot: &Option<Arc<dyn Executor>>| slot.as_ref().map(|e| e.name().to_string());
        f.debug_struct("ExecutorRegistry")
            .field("compute", &name(&self.compute))
            .field("tool_call", &name(&self.tool_call))
            .field("human_approval", &name(&self.human_approval))
            .field("agents", &self.agent_names())
            .finish()
    }
}

#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    compute: Option<Arc<dyn Executor>>,
    tool_call: Option<Arc<dyn Executor>>,
    human_approval: Option<Arc<dyn Executor>>,
    agents: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistryBuilder {
    pub fn compute(mut self, executor: Arc<dyn Executor>) -> Self {
        self.compute = Some(executor);
        self
    }

    pub fn tool_call(mut self, executor: Arc<dyn Executor>) -> Self {
        self.tool_call = Some(executor);
        self
    }

    pub fn human_approval(mut self, executor: Arc<dyn Executor>) -> Self {
        self.human_approval = Some(executor);
        self
    }

    /// Registers a custom agent under `name`; a later registration replaces
    /// an earlier one.
    pub fn agent(mut self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.agents.insert(name.into(), executor);
        self
    }

    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry {
            compute: self.compute,
            tool_call: self.tool_call,
            human_approval: self.human_approval,
            agents: Arc::new(self.agents),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskInvocation;
    use crate::model::TaskResult;
    use async_trait::async_trait;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Executor for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, inv: TaskInvocation) -> Result<TaskResult, ExecutorError> {
            Ok(inv.success(Default::default()))
        }
    }

    #[test]
    fn test_resolve_by_task_type() {
        let registry = ExecutorRegistry::builder()
            .tool_call(Arc::new(Named("tools")))
            .agent("reviewer", Arc::new(Named("reviewer-agent")))
            .build();

        let tool = TaskRecord::new("t", TaskType::ToolCall);
        assert_eq!(registry.resolve(&tool).unwrap().name(), "tools");

        let agent = TaskRecord::new("a", TaskType::CustomAgent).with_config("agent", json!("reviewer"));
        assert_eq!(registry.resolve(&agent).unwrap().name(), "reviewer-agent");
    }

    #[test]
    fn test_missing_slots() {
        let registry = ExecutorRegistry::builder().build();

        let compute = TaskRecord::new("c", TaskType::Compute);
        assert!(matches!(
            registry.resolve(&compute),
            Err(ExecutorError::NoExecutor(t)) if t == "compute"
        ));

        let agent = TaskRecord::new("a", TaskType::CustomAgent).with_config("agent", json!("ghost"));
        let err = registry.resolve(&agent).err().unwrap();
        assert!(matches!(err, ExecutorError::NotImplemented(_)));
        assert!(!err.is_retryable());
    }
}
