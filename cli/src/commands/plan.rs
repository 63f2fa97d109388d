use std::path::Path;

use serde_json::json;
use taskweave_core::config::AppConfig;
use taskweave_core::WorkflowDefinition;

use crate::commands::cli::{OutputFormat, PlanArgs};
use crate::error::CliError;
use crate::workflow_file;

pub fn plan(args: PlanArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let file = workflow_file::load(Path::new(&args.file), cfg.orchestrator.default_max_retries)?;
    println!("{}", render(&file.definition, args.format)?);
    Ok(0)
}

fn render(definition: &WorkflowDefinition, format: OutputFormat) -> Result<String, CliError> {
    let graph = definition.graph()?;
    match format {
        OutputFormat::Text => Ok(graph.render_plan()?.trim_end().to_string()),
        OutputFormat::Json => {
            let out = json!({
                "workflow_id": definition.workflow_id,
                "name": definition.name,
                "batches": graph.get_execution_order()?,
                "roots": graph.root_tasks(),
                "leaves": graph.leaf_tasks(),
            });
            Ok(serde_json::to_string_pretty(&out).map_err(anyhow::Error::from)?)
        }
    }
}
