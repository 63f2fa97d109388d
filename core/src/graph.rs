//! Task dependency graph (DAG).
//!
//! ```text
//! Vec<TaskRecord>
//!   ↓
//! TaskGraph::from_records()
//!   ↓
//! TaskGraph::validate() → empty / missing dependency / cycle checks
//!   ↓
//! TaskGraph::get_execution_order() → Vec<Vec<String>> (batches)
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::DagError;
use crate::model::TaskRecord;

#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    /// task_id -> record
    nodes: HashMap<String, Arc<TaskRecord>>,

    /// task_id -> tasks it depends on
    predecessors: HashMap<String, Vec<String>>,

    /// task_id -> tasks that depend on it
    successors: HashMap<String, Vec<String>>,

    /// Insertion order, for stable sorting
    insertion_order: Vec<String>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every record, then every declared dependency.
    ///
    /// Only duplicate ids fail here. Dangling dependencies and cycles are kept
    /// as declared and reported by [`TaskGraph::validate`].
    pub fn from_records<I>(records: I) -> Result<Self, DagError>
    where
        I: IntoIterator<Item = TaskRecord>,
    {
        let mut graph = Self::new();
        let mut declared = Vec::new();

        for record in records {
            declared.push((record.task_id.clone(), record.dependencies.clone()));
            graph.add_task(record)?;
        }

        for (task_id, dependencies) in declared {
            for dep in dependencies {
                graph.link(&dep, &task_id);
            }
        }

        Ok(graph)
    }

    pub fn add_task(&mut self, record: TaskRecord) -> Result<(), DagError> {
        if self.nodes.contains_key(&record.task_id) {
            return Err(DagError::DuplicateTask(record.task_id));
        }

        let task_id = record.task_id.clone();
        self.predecessors.entry(task_id.clone()).or_default();
        self.successors.entry(task_id.clone()).or_default();
        self.insertion_order.push(task_id.clone());
        self.nodes.insert(task_id, Arc::new(record));
        Ok(())
    }

    /// Adds edge `from -> to`: `from` must complete before `to`.
    ///
    /// Rejected edges leave the graph untouched. Re-adding an existing edge is
    /// a no-op.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<(), DagError> {
        if !self.nodes.contains_key(from) {
            return Err(DagError::not_found(from));
        }
        if !self.nodes.contains_key(to) {
            return Err(DagError::not_found(to));
        }

        if self.has_edge(from, to) {
            return Ok(());
        }

        // from -> to closes a cycle iff from is already reachable from to
        if let Some(path) = self.path_between(to, from) {
            let mut cycle = vec![from.to_string()];
            cycle.extend(path);
            return Err(DagError::CyclicDependency(format_cycle_path(&cycle)));
        }

        self.link(from, to);
        Ok(())
    }

    fn link(&mut self, from: &str, to: &str) {
        if self.has_edge(from, to) {
            return;
        }
        self.predecessors
            .entry(to.to_string())
            .or_default()
            .push(from.to_string());
        self.successors
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
    }

    fn has_edge(&self, from: &str, to: &str) -> bool {
        self.predecessors
            .get(to)
            .is_some_and(|deps| deps.iter().any(|d| d == from))
    }

    /// Validate the structure: non-empty, no dangling dependency, acyclic.
    pub fn validate(&self) -> Result<(), DagError> {
        if self.nodes.is_empty() {
            return Err(DagError::EmptyGraph);
        }

        for task_id in &self.insertion_order {
            for dep in self.dependencies_of(task_id) {
                if !self.nodes.contains_key(dep) {
                    return Err(DagError::missing_dependency(task_id, dep));
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(DagError::CyclicDependency(cycle));
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Topological generations using Kahn's algorithm.
    ///
    /// Batch `i` holds exactly the tasks whose dependencies all sit in batches
    /// before `i`. Within a batch, ids keep insertion order.
    ///
    /// # Time Complexity
    ///
    /// O(V log V + E) where V = number of tasks, E = number of dependencies
    pub fn get_execution_order(&self) -> Result<Vec<Vec<String>>, DagError> {
        self.validate()?;

        let position: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut in_degree: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .map(|id| (id.as_str(), self.dependencies_of(id).len()))
            .collect();

        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut processed = 0;

        while !current.is_empty() {
            processed += current.len();

            let mut next: Vec<&str> = Vec::new();
            for task_id in &current {
                for dependent in self.dependents_of(task_id) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }

            // Preserve input order
            next.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));

            batches.push(current.iter().map(|id| id.to_string()).collect());
            current = next;
        }

        if processed != self.nodes.len() {
            return Err(DagError::CyclicDependency(
                "unable to complete topological sort".to_string(),
            ));
        }

        Ok(batches)
    }

    /// Tasks not yet completed whose direct dependencies are all completed.
    pub fn get_ready_tasks(&self, completed: &HashSet<String>) -> Vec<String> {
        self.insertion_order
            .iter()
            .filter(|id| !completed.contains(*id))
            .filter(|id| {
                self.dependencies_of(id)
                    .iter()
                    .all(|dep| completed.contains(dep))
            })
            .cloned()
            .collect()
    }

    /// Tasks with no dependencies.
    pub fn root_tasks(&self) -> Vec<String> {
        self.insertion_order
            .iter()
            .filter(|id| self.dependencies_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// Tasks nothing depends on.
    pub fn leaf_tasks(&self) -> Vec<String> {
        self.insertion_order
            .iter()
            .filter(|id| self.dependents_of(id).is_empty())
            .cloned()
            .collect()
    }

    pub fn get_task(&self, task_id: &str) -> Result<&Arc<TaskRecord>, DagError> {
        self.nodes
            .get(task_id)
            .ok_or_else(|| DagError::not_found(task_id))
    }

    pub fn dependencies_of(&self, task_id: &str) -> &[String] {
        self.predecessors
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, task_id: &str) -> &[String] {
        self.successors
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Task ids in insertion order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.insertion_order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Plain-text listing of the execution batches.
    pub fn render_plan(&self) -> Result<String, DagError> {
        let batches = self.get_execution_order()?;
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Execution Plan: {} tasks in {} stages",
            self.len(),
            batches.len()
        );
        for (i, batch) in batches.iter().enumerate() {
            let _ = writeln!(out, "  Stage {}: {}", i, batch.join(", "));
            for task_id in batch {
                let deps = self.dependencies_of(task_id);
                let kind = self
                    .nodes
                    .get(task_id)
                    .map(|r| r.task_type.as_str())
                    .unwrap_or("?");
                if deps.is_empty() {
                    let _ = writeln!(out, "    {task_id} [{kind}]");
                } else {
                    let _ = writeln!(out, "    {task_id} [{kind}] <- {}", deps.join(", "));
                }
            }
        }

        Ok(out)
    }

    /// Detect circular dependencies using DFS
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of tasks, E = number of dependencies
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.dependencies_of(node) {
            // Dependency already on the current path
            if let Some(pos) = stack.iter().position(|x| x == dep) {
                stack.push(dep.clone());
                *stack = stack[pos..].to_vec();
                return true;
            }

            if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }

    /// Successor path `start -> ... -> goal`, if one exists.
    fn path_between(&self, start: &str, goal: &str) -> Option<Vec<String>> {
        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut frontier = vec![start];

        while let Some(node) = frontier.pop() {
            if node == goal {
                let mut path = vec![goal.to_string()];
                let mut cur = goal;
                while let Some(prev) = parent.get(cur) {
                    path.push(prev.to_string());
                    cur = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.dependents_of(node) {
                if visited.insert(next.as_str()) {
                    parent.insert(next.as_str(), node);
                    frontier.push(next.as_str());
                }
            }
        }

        None
    }
}

fn format_cycle_path(stack: &[String]) -> String {
    stack.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskType;
    use pretty_assertions::assert_eq;

    fn task(id: &str, deps: &[&str]) -> TaskRecord {
        TaskRecord::new(id, TaskType::ToolCall).depends_on(deps.iter().copied())
    }

    fn diamond() -> TaskGraph {
        TaskGraph::from_records(vec![
            task("A", &[]),
            task("B", &["A"]),
            task("C", &["A"]),
            task("D", &["B", "C"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_diamond_batches() {
        let batches = diamond().get_execution_order().unwrap();
        assert_eq!(
            batches,
            vec![
                vec!["A".to_string()],
                vec!["B".to_string(), "C".to_string()],
                vec!["D".to_string()],
            ]
        );
    }

    #[test]
    fn test_batches_concatenate_to_topological_order() {
        let graph = TaskGraph::from_records(vec![
            task("e", &["c", "d"]),
            task("a", &[]),
            task("d", &["b"]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("f", &[]),
        ])
        .unwrap();

        let order: Vec<String> = graph
            .get_execution_order()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(order.len(), 6);

        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        for id in graph.task_ids() {
            for dep in graph.dependencies_of(id) {
                assert!(pos(dep) < pos(id), "{dep} must precede {id}");
            }
        }
    }

    #[test]
    fn test_batch_keeps_insertion_order() {
        let graph =
            TaskGraph::from_records(vec![task("z", &[]), task("m", &[]), task("a", &[])]).unwrap();
        assert_eq!(
            graph.get_execution_order().unwrap(),
            vec![vec!["z".to_string(), "m".to_string(), "a".to_string()]]
        );
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a", &[])).unwrap();
        assert_eq!(
            graph.add_task(task("a", &[])),
            Err(DagError::DuplicateTask("a".to_string()))
        );
    }

    #[test]
    fn test_cyclic_edge_rolled_back() {
        let mut graph = TaskGraph::new();
        for id in ["a", "b", "c"] {
            graph.add_task(task(id, &[])).unwrap();
        }
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "c").unwrap();

        let err = graph.add_dependency("c", "a").unwrap_err();
        assert_eq!(
            err,
            DagError::CyclicDependency("c -> a -> b -> c".to_string())
        );
        assert!(graph.dependencies_of("a").is_empty());
        assert!(graph.dependents_of("c").is_empty());
        assert!(graph.is_valid());
    }

    #[test]
    fn test_self_edge_is_cycle() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a", &[])).unwrap();
        assert!(matches!(
            graph.add_dependency("a", "a"),
            Err(DagError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_add_dependency_unknown_task() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a", &[])).unwrap();
        assert_eq!(
            graph.add_dependency("a", "ghost"),
            Err(DagError::not_found("ghost"))
        );
    }

    #[test]
    fn test_readding_edge_is_noop() {
        let mut graph = TaskGraph::new();
        graph.add_task(task("a", &[])).unwrap();
        graph.add_task(task("b", &[])).unwrap();
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("a", "b").unwrap();
        assert_eq!(graph.dependencies_of("b"), ["a".to_string()]);
    }

    #[test]
    fn test_validate_missing_dependency() {
        let graph = TaskGraph::from_records(vec![task("a", &[]), task("b", &["ghost"])]).unwrap();
        assert_eq!(
            graph.validate(),
            Err(DagError::missing_dependency("b", "ghost"))
        );
    }

    #[test]
    fn test_validate_declared_cycle() {
        let graph = TaskGraph::from_records(vec![task("a", &["b"]), task("b", &["a"])]).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(DagError::CyclicDependency(_))
        ));
        assert!(graph.get_execution_order().is_err());
    }

    #[test]
    fn test_validate_empty() {
        assert_eq!(TaskGraph::new().validate(), Err(DagError::EmptyGraph));
    }

    #[test]
    fn test_ready_roots_and_leaves() {
        let graph = diamond();
        let mut completed = HashSet::new();
        assert_eq!(graph.get_ready_tasks(&completed), vec!["A".to_string()]);

        completed.insert("A".to_string());
        assert_eq!(
            graph.get_ready_tasks(&completed),
            vec!["B".to_string(), "C".to_string()]
        );

        assert_eq!(graph.root_tasks(), vec!["A".to_string()]);
        assert_eq!(graph.leaf_tasks(), vec!["D".to_string()]);
        assert_eq!(graph.dependents_of("A"), ["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_render_plan() {
        let plan = diamond().render_plan().unwrap();
        assert!(plan.starts_with("Execution Plan: 4 tasks in 3 stages"));
        assert!(plan.contains("  Stage 1: B, C"));
        assert!(plan.contains("    D [tool_call] <- B, C"));
    }
}
