pub mod executors;
pub mod factory;
pub mod stores;
pub mod strategies;
