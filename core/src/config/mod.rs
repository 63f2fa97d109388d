//! Application configuration (`~/.taskweave/config.toml`).

mod load;
mod types;

pub use load::{get_data_dir, load_default, load_from_path};
pub use types::{
    AppConfig, ConfigError, EventsOutConfig, HitlSettings, LoggingConfig, ModelConfig,
    OrchestratorConfig, PersistenceConfig,
};
