use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "taskweave", version, about = "Run DAG task pipelines")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.taskweave/config.toml or ./taskweave.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Workflow definition (.toml or .json).
    pub file: String,

    /// Workflow input as KEY=VALUE. VALUE is parsed as JSON when possible.
    /// Can be specified multiple times.
    #[arg(long = "input", short = 'i', action = clap::ArgAction::Append)]
    pub inputs: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Override orchestrator.max_concurrent_tasks.
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Disable the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    /// Workflow definition (.toml or .json).
    pub file: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a workflow and print its final state.
    Run(RunArgs),
    /// Validate a workflow and print its execution batches.
    Plan(PlanArgs),
}
