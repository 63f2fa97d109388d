//! Workflow definition files.
//!
//! A file holds a `WorkflowDefinition` plus an optional `inputs` table with
//! default workflow inputs. TOML and JSON are accepted; the format is picked
//! by extension.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};
use taskweave_core::WorkflowDefinition;

use crate::error::CliError;

#[derive(Debug)]
pub struct WorkflowFile {
    pub definition: WorkflowDefinition,
    pub inputs: HashMap<String, Value>,
}

pub fn load(path: &Path, default_max_retries: u32) -> Result<WorkflowFile, CliError> {
    let raw = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    parse(&raw, is_json, default_max_retries).map_err(|reason| CliError::definition(path, reason))
}

fn parse(raw: &str, is_json: bool, default_max_retries: u32) -> Result<WorkflowFile, String> {
    let mut doc: Value = if is_json {
        serde_json::from_str(raw).map_err(|e| e.to_string())?
    } else {
        let table: toml::Value = toml::from_str(raw).map_err(|e| e.to_string())?;
        serde_json::to_value(table).map_err(|e| e.to_string())?
    };

    let root = doc
        .as_object_mut()
        .ok_or_else(|| "top level must be a table".to_string())?;

    let inputs = match root.remove("inputs") {
        None => HashMap::new(),
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(_) => return Err("`inputs` must be a table".to_string()),
    };

    apply_default_max_retries(root, default_max_retries);

    let definition: WorkflowDefinition = serde_json::from_value(doc).map_err(|e| e.to_string())?;
    Ok(WorkflowFile { definition, inputs })
}

/// Tasks without their own `max_retries` get the configured default.
fn apply_default_max_retries(root: &mut Map<String, Value>, default_max_retries: u32) {
    let Some(Value::Array(tasks)) = root.get_mut("tasks") else {
        return;
    };
    for task in tasks.iter_mut().filter_map(Value::as_object_mut) {
        task.entry("max_retries")
            .or_insert_with(|| Value::from(default_max_retries));
    }
}

/// Parses repeated `KEY=VALUE` flags. Values that parse as JSON keep their
/// type; anything else is a string.
pub fn parse_inputs(pairs: &[String]) -> Result<HashMap<String, Value>, CliError> {
    let mut out = HashMap::new();
    for pair in pairs {
        let (k, v) = pair.split_once('=').ok_or_else(|| {
            CliError::Argument(format!("invalid --input '{pair}' (expected KEY=VALUE)"))
        })?;
        let key = k.trim();
        if key.is_empty() {
            return Err(CliError::Argument(format!(
                "invalid --input '{pair}' (empty key)"
            )));
        }
        let value = serde_json::from_str(v).unwrap_or_else(|_| Value::String(v.to_string()));
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use taskweave_core::TaskType;

    const TOML_FLOW: &str = r#"
name = "nightly-report"
workflow_id = "nightly"

[inputs]
region = "eu"

[[tasks]]
task_id = "fetch"
name = "Fetch data"
task_type = "tool_call"
executor_config = { tool = "echo" }

[[tasks]]
task_id = "publish"
name = "Publish"
task_type = "tool_call"
dependencies = ["fetch"]
max_retries = 0
timeout_secs = 2.5
executor_config = { tool = "merge" }
"#;

    #[test]
    fn test_parse_toml_with_inputs_and_defaults() {
        let file = parse(TOML_FLOW, false, 5).unwrap();

        assert_eq!(file.definition.workflow_id, "nightly");
        assert_eq!(file.inputs, HashMap::from([("region".to_string(), json!("eu"))]));

        let fetch = file.definition.task("fetch").unwrap();
        assert_eq!(fetch.task_type, TaskType::ToolCall);
        assert_eq!(fetch.max_retries, 5);
        assert_eq!(fetch.config_str("tool"), Some("echo"));

        let publish = file.definition.task("publish").unwrap();
        assert_eq!(publish.max_retries, 0);
        assert_eq!(publish.dependencies, vec!["fetch".to_string()]);
        assert_eq!(
            publish.timeout,
            Some(std::time::Duration::from_millis(2500))
        );
    }

    #[test]
    fn test_release_demo_parses_into_four_stages() {
        let file = parse(include_str!("../../demos/release.toml"), false, 3).unwrap();
        let graph = file.definition.graph().unwrap();

        assert_eq!(graph.get_execution_order().unwrap().len(), 4);
        assert_eq!(file.inputs["channel"], json!("stable"));
        let gate = file.definition.task("sign_off").unwrap();
        assert_eq!(gate.task_type, TaskType::HumanApproval);
        assert_eq!(gate.hitl_config.as_ref().unwrap().severity, "high");
    }

    #[test]
    fn test_parse_json() {
        let raw = r#"{
            "name": "single",
            "tasks": [{"task_id": "a", "name": "A", "task_type": "human_approval",
                       "hitl_config": {"approvers": ["lead"]}}]
        }"#;
        let file = parse(raw, true, 3).unwrap();
        let task = file.definition.task("a").unwrap();
        assert_eq!(task.max_retries, 3);
        assert_eq!(task.hitl_config.as_ref().unwrap().severity, "medium");
        assert!(file.inputs.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_inputs_table() {
        let err = parse(r#"{"name": "x", "inputs": [1, 2]}"#, true, 3).unwrap_err();
        assert!(err.contains("`inputs` must be a table"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "name = ").unwrap();

        let err = load(&path, 3).err().unwrap();
        assert!(matches!(err, CliError::Definition { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_parse_inputs_types() {
        let inputs = parse_inputs(&[
            "limit=5".to_string(),
            "name=ada".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
            "expr=a=b".to_string(),
        ])
        .unwrap();

        assert_eq!(inputs["limit"], json!(5));
        assert_eq!(inputs["name"], json!("ada"));
        assert_eq!(inputs["tags"], json!(["a", "b"]));
        assert_eq!(inputs["expr"], json!("a=b"));
    }

    #[test]
    fn test_parse_inputs_rejects_missing_separator() {
        assert!(matches!(
            parse_inputs(&["oops".to_string()]),
            Err(CliError::Argument(_))
        ));
    }
}
