use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Closed set of task kinds; each maps to exactly one executor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Model inference call.
    Compute,
    /// Registered tool invocation.
    ToolCall,
    /// Human-in-the-loop checkpoint.
    HumanApproval,
    /// Externally injected agent instance.
    CustomAgent,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::ToolCall => "tool_call",
            Self::HumanApproval => "human_approval",
            Self::CustomAgent => "custom_agent",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-in-the-loop configuration attached to approval tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlConfig {
    #[serde(default)]
    pub approvers: Vec<String>,

    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// low, medium, high or critical.
    #[serde(default = "default_severity")]
    pub severity: String,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            approvers: Vec::new(),
            channels: default_channels(),
            description: None,
            severity: default_severity(),
        }
    }
}

fn default_channels() -> Vec<String> {
    vec!["email".to_string()]
}

fn default_severity() -> String {
    "medium".to_string()
}

pub(crate) fn default_max_retries() -> u32 {
    3
}

/// Immutable specification of one task.
///
/// Records are created when a workflow is compiled and are shared read-only by
/// every run of that workflow. Per-run data lives in `ResolvedInputs` and
/// `TaskResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,

    pub name: String,

    pub task_type: TaskType,

    /// Ids of tasks that must complete before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,

    /// Executor-specific settings (prompt, model, tool, agent, ...).
    #[serde(default)]
    pub executor_config: HashMap<String, serde_json::Value>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(
        default,
        rename = "timeout_secs",
        with = "duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_config: Option<HitlConfig>,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, task_type: TaskType) -> Self {
        let task_id = task_id.into();
        Self {
            name: task_id.clone(),
            task_id,
            task_type,
            dependencies: Vec::new(),
            inputs: HashMap::new(),
            executor_config: HashMap::new(),
            max_retries: default_max_retries(),
            timeout: None,
            hitl_config: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.executor_config.insert(key.into(), value);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_hitl(mut self, hitl: HitlConfig) -> Self {
        self.hitl_config = Some(hitl);
        self
    }

    /// String value from `executor_config`, if present.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.executor_config.get(key).and_then(|v| v.as_str())
    }
}

/// Serializes `Option<Duration>` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        match secs {
            Some(s) if s.is_finite() && s > 0.0 => Duration::try_from_secs_f64(s)
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("timeout_secs {s}: {e}"))),
            Some(s) => Err(serde::de::Error::custom(format!(
                "timeout_secs must be a positive number, got {s}"
            ))),
            None => Ok(None),
        }
    }
}
