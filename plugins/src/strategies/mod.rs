pub mod retry;

pub use retry::{FixedDelay, LinearBackoff};
