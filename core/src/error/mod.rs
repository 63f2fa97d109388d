pub mod dag;
pub mod executor;

pub use dag::DagError;
pub use executor::ExecutorError;
