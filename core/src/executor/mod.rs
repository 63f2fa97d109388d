//! Executor contract and the task-type registry.

mod registry;
mod traits;

pub use registry::{ExecutorRegistry, ExecutorRegistryBuilder};
pub use traits::{Executor, TaskInvocation};
