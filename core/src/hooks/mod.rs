//! Collaborator seams the orchestrator calls but does not implement:
//! event publishing, state persistence, human decisions and lifecycle hooks.

pub mod decision;
pub mod events;
pub mod lifecycle;
pub mod persist;

pub use decision::{Decision, DecisionKind, DecisionRequest, DecisionStatus, DecisionStore};
pub use events::{
    EventPublisher, WorkflowEvent, TOPIC_HITL_REQUESTS, TOPIC_TASK_EVENTS, TOPIC_WORKFLOW_EVENTS,
};
pub use lifecycle::WorkflowHooks;
pub use persist::StatePersister;
