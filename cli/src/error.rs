use taskweave_core::DagError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid workflow: {0}")]
    Workflow(#[from] DagError),
    #[error("invalid workflow file {path}: {reason}")]
    Definition { path: String, reason: String },
    #[error("invalid argument: {0}")]
    Argument(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    pub fn definition(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Self::Definition {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: workflow completed
    // 1: workflow failed or cancelled (returned as a normal exit code)
    // 2: invalid workflow or arguments
    // 11: config error
    // 20: io error
    // 50: internal/uncategorized
    match e {
        CliError::Workflow(_) | CliError::Definition { .. } | CliError::Argument(_) => 2,
        CliError::Config(_) => 11,
        CliError::Io(_) | CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for_error(&CliError::Workflow(DagError::EmptyGraph)), 2);
        assert_eq!(exit_code_for_error(&CliError::Config("bad".into())), 11);
        assert_eq!(
            exit_code_for_error(&CliError::Io(std::io::Error::other("disk"))),
            20
        );
        assert_eq!(
            exit_code_for_error(&CliError::Anyhow(anyhow::anyhow!("boom"))),
            50
        );
    }

    #[test]
    fn test_definition_message_names_file() {
        let err = CliError::definition(std::path::Path::new("flows/etl.toml"), "missing field `name`");
        assert_eq!(
            err.to_string(),
            "invalid workflow file flows/etl.toml: missing field `name`"
        );
    }
}
