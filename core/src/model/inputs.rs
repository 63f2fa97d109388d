use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::result::TaskResult;
use super::task::TaskRecord;

/// Merged input snapshot handed to one task execution.
///
/// Built fresh for every run of a task; never written back into the shared
/// `TaskRecord`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedInputs {
    values: HashMap<String, Value>,
}

impl ResolvedInputs {
    /// Flat merge, later sources win: workflow inputs, then task-local inputs,
    /// then `<dep>_output` for each dependency that finished with SUCCESS.
    pub fn resolve(
        workflow_inputs: &HashMap<String, Value>,
        record: &TaskRecord,
        results: &HashMap<String, TaskResult>,
    ) -> Self {
        let mut values = workflow_inputs.clone();
        values.extend(
            record
                .inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        for dep in &record.dependencies {
            if let Some(result) = results.get(dep) {
                if result.is_successful() {
                    let outputs = serde_json::to_value(&result.outputs).unwrap_or(Value::Null);
                    values.insert(output_key(dep), outputs);
                }
            }
        }

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Inputs as one JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl From<HashMap<String, Value>> for ResolvedInputs {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

/// Key under which a dependency's outputs appear in its dependents' inputs.
pub fn output_key(task_id: &str) -> String {
    format!("{task_id}_output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskType;
    use serde_json::json;

    #[test]
    fn test_merge_order_and_dependency_outputs() {
        let mut workflow_inputs = HashMap::new();
        workflow_inputs.insert("region".to_string(), json!("eu"));
        workflow_inputs.insert("limit".to_string(), json!(10));

        let record = TaskRecord::new("report", TaskType::Compute)
            .depends_on(["fetch", "score"])
            .with_input("limit", json!(5));

        let mut fetch_out = HashMap::new();
        fetch_out.insert("rows".to_string(), json!(42));

        let mut results = HashMap::new();
        results.insert("fetch".to_string(), TaskResult::success("fetch", fetch_out));
        results.insert("score".to_string(), TaskResult::failed("score", "boom"));

        let inputs = ResolvedInputs::resolve(&workflow_inputs, &record, &results);

        assert_eq!(inputs.get_str("region"), Some("eu"));
        assert_eq!(inputs.get("limit"), Some(&json!(5)));
        assert_eq!(inputs.get("fetch_output"), Some(&json!({"rows": 42})));
        assert!(!inputs.contains_key("score_output"));
    }

    #[test]
    fn test_waiting_human_outputs_not_propagated() {
        let record = TaskRecord::new("deploy", TaskType::ToolCall).depends_on(["gate"]);
        let mut gate_out = HashMap::new();
        gate_out.insert("approval_required".to_string(), json!(true));

        let mut results = HashMap::new();
        results.insert("gate".to_string(), TaskResult::waiting_human("gate", gate_out));

        let inputs = ResolvedInputs::resolve(&HashMap::new(), &record, &results);
        assert!(inputs.is_empty());
    }
}
