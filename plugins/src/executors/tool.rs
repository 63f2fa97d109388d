use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use taskweave_core::{Executor, ExecutorError, TaskInvocation, TaskResult};

/// Synchronous tool body. Receives the task's resolved inputs.
pub type ToolFn = Arc<dyn Fn(&HashMap<String, Value>) -> Result<Value> + Send + Sync>;

/// Named tools available to tool-call tasks.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolFn>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `echo` and `merge`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", echo);
        registry.register("merge", merge);
        registry
    }

    /// Adds or replaces a tool.
    pub fn register<F>(&mut self, name: impl Into<String>, tool: F) -> &mut Self
    where
        F: Fn(&HashMap<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.tools.insert(name.into(), Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<ToolFn> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Returns the inputs unchanged.
fn echo(inputs: &HashMap<String, Value>) -> Result<Value> {
    let sorted: BTreeMap<_, _> = inputs.iter().collect();
    Ok(serde_json::to_value(sorted)?)
}

/// Flattens object-valued inputs into one object under `merged`. Keys are
/// visited in order, so later keys win on conflicts.
fn merge(inputs: &HashMap<String, Value>) -> Result<Value> {
    let sorted: BTreeMap<_, _> = inputs.iter().collect();
    let mut merged = Map::new();
    for (key, value) in sorted {
        match value {
            Value::Object(fields) => {
                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            other => {
                merged.insert(key.clone(), other.clone());
            }
        }
    }
    Ok(serde_json::json!({ "merged": merged }))
}

/// Runs the tool named by `executor_config.tool` on the blocking pool.
///
/// An object result becomes the task outputs; anything else is stored under
/// `result`.
pub struct ToolCallExecutor {
    tools: ToolRegistry,
}

impl ToolCallExecutor {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

#[async_trait]
impl Executor for ToolCallExecutor {
    fn name(&self) -> &str {
        "tool_call"
    }

    async fn execute(&self, inv: TaskInvocation) -> Result<TaskResult, ExecutorError> {
        let name = inv
            .record
            .config_str("tool")
            .ok_or_else(|| {
                ExecutorError::Failed("tool_call task has no 'tool' configured".to_string())
            })?
            .to_string();
        let tool = self.tools.get(&name).ok_or_else(|| {
            ExecutorError::NotImplemented(format!("tool '{name}' is not registered"))
        })?;

        tracing::debug!(
            target: "taskweave.tool",
            task_id = %inv.task_id(),
            tool = %name,
            attempt = inv.attempt,
            "invoking tool"
        );

        let inputs = inv.inputs.clone();
        let handle = tokio::task::spawn_blocking(move || tool(inputs.as_map()));
        let joined = tokio::select! {
            _ = inv.cancel.cancelled() => return Err(ExecutorError::Cancelled),
            joined = handle => joined,
        };

        let value = match joined {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                return Err(ExecutorError::Failed(format!("tool '{name}' failed: {e:#}")))
            }
            Err(e) if e.is_panic() => {
                return Err(ExecutorError::Failed(format!("tool '{name}' panicked")))
            }
            Err(e) => return Err(ExecutorError::Other(e.into())),
        };

        let outputs = match value {
            Value::Object(fields) => fields.into_iter().collect(),
            other => HashMap::from([("result".to_string(), other)]),
        };
        Ok(inv.success(outputs))
    }
}
