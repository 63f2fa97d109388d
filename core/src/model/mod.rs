//! Task and workflow data model.

pub mod inputs;
pub mod result;
pub mod task;
pub mod transitions;
pub mod workflow;

pub use inputs::{output_key, ResolvedInputs};
pub use result::{TaskResult, TaskStatus};
pub use task::{HitlConfig, TaskRecord, TaskType};
pub use transitions::{StatusTransition, TransitionError};
pub use workflow::{
    WorkflowBuilder, WorkflowDefinition, WorkflowSnapshot, WorkflowState, WorkflowStatus,
};
