//! Decision stores, state persisters and event publishers.

pub mod decision;
pub mod persister;
pub mod publisher;

pub use decision::InMemoryDecisionStore;
pub use persister::{InMemoryStatePersister, JsonFileStatePersister};
pub use publisher::{JsonlEventPublisher, TracingEventPublisher, STDOUT_TARGET};
