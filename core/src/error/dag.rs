use thiserror::Error;

/// Structural errors raised while building or validating a task graph.
///
/// These are the only errors `Orchestrator::execute_workflow` returns: they are
/// detected before any task runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("workflow graph is empty")]
    EmptyGraph,

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("{}", not_found_message(.task_id, .required_by.as_deref()))]
    TaskNotFound {
        task_id: String,
        required_by: Option<String>,
    },

    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),
}

impl DagError {
    pub fn not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
            required_by: None,
        }
    }

    pub fn missing_dependency(task_id: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: missing.into(),
            required_by: Some(task_id.into()),
        }
    }

    /// Stable machine-readable code, used by the CLI for reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyGraph => "empty_graph",
            Self::DuplicateTask(_) => "duplicate_task",
            Self::TaskNotFound { .. } => "task_not_found",
            Self::CyclicDependency(_) => "cyclic_dependency",
        }
    }
}

fn not_found_message(task_id: &str, required_by: Option<&str>) -> String {
    match required_by {
        Some(owner) => format!("task '{owner}' depends on non-existent task '{task_id}'"),
        None => format!("task not found: {task_id}"),
    }
}
