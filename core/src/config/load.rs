use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// Get the default taskweave data directory: ~/.taskweave
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".taskweave"))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskweave/config.toml
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./taskweave.toml (current directory)
    let local_config = Path::new("taskweave.toml");

    let mut cfg = if user_config.exists() {
        read_file(&user_config)?
    } else if local_config.exists() {
        read_file(local_config)?
    } else {
        AppConfig::default()
    };

    // Update logging directory to use the data directory if not set
    if cfg
        .logging
        .directory
        .as_ref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
        && cfg.logging.file
    {
        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load an explicit config file; environment overrides still apply.
pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let mut cfg = read_file(path.as_ref())?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

fn read_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str::<AppConfig>(&s)
        .with_context(|| format!("Failed to parse config {}", path.display()))
}

/// Environment variable overrides (highest priority).
pub(crate) fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("TASKWEAVE_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = get("TASKWEAVE_MAX_CONCURRENT_TASKS") {
        cfg.orchestrator.max_concurrent_tasks = v
            .trim()
            .parse()
            .with_context(|| format!("TASKWEAVE_MAX_CONCURRENT_TASKS: invalid number '{v}'"))?;
    }
    if let Some(v) = get("TASKWEAVE_BACKOFF_BASE") {
        cfg.orchestrator.backoff_base = v
            .trim()
            .parse()
            .with_context(|| format!("TASKWEAVE_BACKOFF_BASE: invalid number '{v}'"))?;
    }
    if let Some(v) = get("TASKWEAVE_MODEL_ENDPOINT") {
        cfg.model.endpoint = v;
    }
    if let Some(v) = get("TASKWEAVE_MODEL_API_KEY") {
        cfg.model.api_key = v;
    }
    if let Some(v) = get("TASKWEAVE_MODEL") {
        cfg.model.model = v;
    }
    if let Some(v) = get("TASKWEAVE_SNAPSHOT_DIR") {
        cfg.persistence.snapshot_dir = Some(v);
    }
    if let Some(v) = get("TASKWEAVE_EVENTS_OUT") {
        cfg.events_out.enabled = true;
        cfg.events_out.path = v;
    }

    Ok(())
}
