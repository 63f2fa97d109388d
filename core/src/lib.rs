//! DAG task-pipeline orchestration.
//!
//! A workflow is a list of [`model::TaskRecord`]s wired into a
//! [`graph::TaskGraph`]. The [`orchestrator::Orchestrator`] runs it batch by
//! batch, dispatching each task to the executor registered for its type and
//! applying the retry, timeout and human-approval rules.

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod hooks;
pub mod metrics;
pub mod model;
pub mod orchestrator;

pub use error::{DagError, ExecutorError};
pub use executor::{Executor, ExecutorRegistry, TaskInvocation};
pub use graph::TaskGraph;
pub use model::{
    ResolvedInputs, TaskRecord, TaskResult, TaskStatus, TaskType, WorkflowBuilder,
    WorkflowDefinition, WorkflowState, WorkflowStatus,
};
pub use orchestrator::{Orchestrator, WorkflowControl};
