use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use taskweave_core::config::AppConfig;
use taskweave_core::hooks::DecisionStore;
use taskweave_core::{TaskStatus, WorkflowControl, WorkflowState, WorkflowStatus};
use taskweave_plugins::executors::ToolRegistry;
use taskweave_plugins::factory;
use taskweave_plugins::stores::InMemoryDecisionStore;

use crate::commands::cli::{OutputFormat, RunArgs};
use crate::error::CliError;
use crate::progress::ProgressHooks;
use crate::workflow_file;

#[tracing::instrument(name = "cli.run", skip(args, cfg), fields(file = %args.file))]
pub async fn run(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    if let Some(n) = args.max_parallel {
        if n == 0 {
            return Err(CliError::Argument("--max-parallel must be at least 1".to_string()));
        }
        cfg.orchestrator.max_concurrent_tasks = n;
    }

    let file = workflow_file::load(Path::new(&args.file), cfg.orchestrator.default_max_retries)?;
    let mut inputs = file.inputs;
    inputs.extend(workflow_file::parse_inputs(&args.inputs)?);
    file.definition.graph()?;

    let decisions = Arc::new(InMemoryDecisionStore::new());
    let registry = factory::build_registry(&cfg, ToolRegistry::with_builtins(), decisions.clone())
        .map_err(|e| CliError::Config(format!("{e:#}")))?;
    let progress = Arc::new(ProgressHooks::for_terminal(
        !args.no_progress && args.format == OutputFormat::Text,
    ));
    let orchestrator = factory::build_orchestrator(&cfg, registry)
        .await
        .map_err(|e| CliError::Command(format!("{e:#}")))?
        .hooks(progress)
        .build();

    let control = WorkflowControl::new();
    let interrupt = {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling workflow");
                control.cancel();
            }
        })
    };

    let state = orchestrator
        .execute_workflow_with_control(&file.definition, inputs, &control)
        .await;
    interrupt.abort();
    let state = state?;

    match args.format {
        OutputFormat::Text => {
            let pending = decisions.pending().await?;
            print!("{}", render_text(&file.definition.name, &state));
            for (id, request) in pending {
                println!(
                    "  approval request {id} for '{}' -> {}",
                    request.task_id,
                    request.approvers.join(", ")
                );
            }
        }
        OutputFormat::Json => {
            let out = json!({
                "state": state.snapshot(),
                "metrics": orchestrator.metrics().snapshot(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&out).map_err(anyhow::Error::from)?
            );
        }
    }

    Ok(exit_code_for_state(&state))
}

pub fn exit_code_for_state(state: &WorkflowState) -> i32 {
    match state.status {
        WorkflowStatus::Completed => 0,
        _ => 1,
    }
}

fn render_text(name: &str, state: &WorkflowState) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Workflow {name} ({}) run {}: {}",
        state.workflow_id, state.run_id, state.status
    );
    for result in state.ordered_results() {
        let _ = write!(out, "  {:<14} {}", result.status.as_str(), result.task_id);
        if let Some(ms) = result.duration_ms {
            let _ = write!(out, " ({ms} ms");
            if result.retry_count > 0 {
                let _ = write!(out, ", {} retries", result.retry_count);
            }
            out.push(')');
        }
        if result.status == TaskStatus::Failed {
            if let Some(err) = &result.error {
                let _ = write!(out, ": {err}");
            }
        }
        out.push('\n');
    }
    let _ = writeln!(out, "Progress: {:.0}%", state.progress() * 100.0);
    out
}
