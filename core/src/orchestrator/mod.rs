//! Workflow execution.
//!
//! ```text
//! WorkflowDefinition
//!   ↓
//! TaskGraph::validate() / get_execution_order()
//!   ↓
//! for each batch: resolve inputs → spawn TaskRunner::run per task → barrier
//!   ↓
//! WorkflowState
//! ```

mod attempt;
mod control;
mod engine;
mod scheduler;

pub use attempt::{BackoffStrategy, ExponentialBackoff};
pub use control::WorkflowControl;
pub use engine::{Orchestrator, OrchestratorBuilder};
