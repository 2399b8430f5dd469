//! GraphBuilder (C2) — compiles a `WorkflowSpec` into a validated
//! `ExecutionGraph`, detecting cycles and resolving implicit
//! data-flow dependencies (spec.md §4.2).
//!
//! Complexity: O(V + E + Σ|templates|).

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value as Json;

use crate::error::GraphBuildError;
use crate::model::{TaskStep, WorkflowSpec};

/// Whether an edge was declared via `dependsOn` or discovered by scanning a
/// step's `input` templates for `tasks.<id>.output.` references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClassification {
    Explicit,
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub classification: EdgeClassification,
}

/// Diagnostics emitted alongside a successfully built graph.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub edges: Vec<GraphEdge>,
}

/// A compiled, validated DAG ready for the orchestrator to drive.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    /// Declaration order preserved (stable ordering affects tie-breaks, I.
    nodes: Vec<TaskStep>,
    index_of: HashMap<String, usize>,
    /// `node -> predecessors` (the nodes it depends on).
    predecessors: HashMap<String, Vec<String>>,
    /// `node -> dependents` (the nodes that depend on it).
    dependents: HashMap<String, Vec<String>>,
    levels: HashMap<String, usize>,
    parallel_groups: Vec<Vec<String>>,
}

impl ExecutionGraph {
    pub fn node(&self, id: &str) -> Option<&TaskStep> {
        self.index_of.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[TaskStep] {
        &self.nodes
    }

    pub fn predecessors(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn level(&self, id: &str) -> Option<usize> {
        self.levels.get(id).copied()
    }

    /// Parallel groups ordered by level; within a level, nodes are ordered
    /// by declaration order for determinism (§4.2 step 6).
    pub fn parallel_groups(&self) -> &[Vec<String>] {
        &self.parallel_groups
    }

    pub fn roots(&self) -> &[String] {
        self.parallel_groups.first().map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All nodes transitively dependent on `id`, in no particular order.
    pub fn transitive_dependents(&self, id: &str) -> HashSet<String> {
        let mut out = HashSet::new();
        let mut queue: VecDeque<String> = self.dependents(id).to_vec().into();
        while let Some(next) = queue.pop_front() {
            if out.insert(next.clone()) {
                for d in self.dependents(&next) {
                    queue.push_back(d.clone());
                }
            }
        }
        out
    }
}

pub fn build(spec: &WorkflowSpec) -> Result<(ExecutionGraph, Diagnostics), GraphBuildError> {
    if spec.tasks.is_empty() {
        return Err(GraphBuildError::EmptyGraph);
    }

    // Step 1 — register nodes, preserving declaration order.
    let mut index_of = HashMap::new();
    for (i, task) in spec.tasks.iter().enumerate() {
        index_of.insert(task.id.clone(), i);
    }

    let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut diagnostics = Diagnostics::default();

    for task in &spec.tasks {
        predecessors.entry(task.id.clone()).or_default();
        dependents.entry(task.id.clone()).or_default();
    }

    // Step 2 — explicit edges from `dependsOn`.
    for task in &spec.tasks {
        for dep in &task.depends_on {
            if !index_of.contains_key(dep) {
                return Err(GraphBuildError::UndefinedDependency {
                    from: task.id.clone(),
                    to: dep.clone(),
                });
            }
            add_edge(&mut predecessors, &mut dependents, &mut diagnostics, &task.id, dep, EdgeClassification::Explicit);
        }
    }

    // Step 3 — implicit edges discovered by scanning `input` templates.
    for task in &spec.tasks {
        for value in task.input.values() {
            for referenced_id in scan_task_references(value) {
                if referenced_id == task.id || !index_of.contains_key(&referenced_id) {
                    continue;
                }
                let already = predecessors[&task.id].iter().any(|p| p == &referenced_id);
                if !already {
                    add_edge(&mut predecessors, &mut dependents, &mut diagnostics, &task.id, &referenced_id, EdgeClassification::Implicit);
                }
            }
        }
    }

    // Step 4 — cycle detection via DFS coloring (white/grey/black).
    #[derive(Clone, Copy, PartialEq)]
    enum Color { White, Grey, Black }

    let mut color: HashMap<String, Color> = spec.tasks.iter().map(|t| (t.id.clone(), Color::White)).collect();
    let mut path_stack: Vec<String> = Vec::new();

    fn visit(
        id: &str,
        predecessors: &HashMap<String, Vec<String>>,
        color: &mut HashMap<String, Color>,
        path_stack: &mut Vec<String>,
    ) -> Result<(), GraphBuildError> {
        color.insert(id.to_string(), Color::Grey);
        path_stack.push(id.to_string());

        for dep in predecessors.get(id).map(|v| v.as_slice()).unwrap_or(&[]) {
            match color.get(dep).copied().unwrap_or(Color::White) {
                Color::White => visit(dep, predecessors, color, path_stack)?,
                Color::Grey => {
                    let cycle_start = path_stack.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle_path: Vec<String> = path_stack[cycle_start..].to_vec();
                    cycle_path.push(dep.clone());
                    return Err(GraphBuildError::CycleDetected { path: cycle_path });
                }
                Color::Black => {}
            }
        }

        path_stack.pop();
        color.insert(id.to_string(), Color::Black);
        Ok(())
    }

    for task in &spec.tasks {
        if color[&task.id] == Color::White {
            visit(&task.id, &predecessors, &mut color, &mut path_stack)?;
        }
    }

    // Step 5 — level assignment via Kahn-style topological traversal.
    let mut remaining_in_degree: HashMap<String, usize> = predecessors
        .iter()
        .map(|(id, preds)| (id.clone(), preds.len()))
        .collect();
    let mut levels: HashMap<String, usize> = HashMap::new();

    let mut ready: VecDeque<String> = spec
        .tasks
        .iter()
        .filter(|t| remaining_in_degree[&t.id] == 0)
        .map(|t| t.id.clone())
        .collect();
    for id in &ready {
        levels.insert(id.clone(), 0);
    }

    while let Some(id) = ready.pop_front() {
        let current_level = levels[&id];
        for dependent in dependents.get(&id).map(|v| v.as_slice()).unwrap_or(&[]) {
            let deg = remaining_in_degree.get_mut(dependent).expect("dependent registered");
            *deg -= 1;
            let candidate_level = current_level + 1;
            let entry = levels.entry(dependent.clone()).or_insert(0);
            *entry = (*entry).max(candidate_level);
            if *deg == 0 {
                ready.push_back(dependent.clone());
            }
        }
    }

    // Step 6 — parallel groups, grouped by level, declaration order within.
    let max_level = levels.values().copied().max().unwrap_or(0);
    let mut parallel_groups: Vec<Vec<String>> = vec![Vec::new(); max_level + 1];
    for task in &spec.tasks {
        let level = levels[&task.id];
        parallel_groups[level].push(task.id.clone());
    }

    let graph = ExecutionGraph {
        nodes: spec.tasks.clone(),
        index_of,
        predecessors,
        dependents,
        levels,
        parallel_groups,
    };

    Ok((graph, diagnostics))
}

fn add_edge(
    predecessors: &mut HashMap<String, Vec<String>>,
    dependents: &mut HashMap<String, Vec<String>>,
    diagnostics: &mut Diagnostics,
    from: &str,
    to: &str,
    classification: EdgeClassification,
) {
    predecessors.entry(from.to_string()).or_default().push(to.to_string());
    dependents.entry(to.to_string()).or_default().push(from.to_string());
    diagnostics.edges.push(GraphEdge {
        from: from.to_string(),
        to: to.to_string(),
        classification,
    });
}

/// Scan a JSON template value for every `tasks.<id>.output.` reference,
/// regardless of nesting (object, array, or a bare string).
fn scan_task_references(value: &Json) -> Vec<String> {
    let mut ids = Vec::new();
    scan_task_references_inner(value, &mut ids);
    ids
}

fn scan_task_references_inner(value: &Json, out: &mut Vec<String>) {
    match value {
        Json::String(s) => {
            let mut rest = s.as_str();
            const MARKER: &str = "tasks.";
            while let Some(pos) = rest.find(MARKER) {
                let after = &rest[pos + MARKER.len()..];
                if let Some(dot) = after.find(".output") {
                    out.push(after[..dot].to_string());
                }
                // Resume scanning just past this marker so repeated/adjacent
                // references in the same string are all found.
                rest = &after[MARKER.len().min(after.len())..];
            }
        }
        Json::Array(items) => {
            for item in items {
                scan_task_references_inner(item, out);
            }
        }
        Json::Object(map) => {
            for v in map.values() {
                scan_task_references_inner(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskStep;
    use serde_json::json;
    use std::collections::HashMap;

    fn task(id: &str, depends_on: &[&str]) -> TaskStep {
        TaskStep {
            id: id.to_string(),
            task_ref: "mock".into(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            input: HashMap::new(),
            retry: None,
            timeout: None,
            condition: None,
        }
    }

    fn spec(tasks: Vec<TaskStep>) -> WorkflowSpec {
        WorkflowSpec::new("wf", tasks)
    }

    #[test]
    fn linear_chain_assigns_sequential_levels() {
        let wf = spec(vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])]);
        let (graph, _) = build(&wf).expect("valid");
        assert_eq!(graph.level("a"), Some(0));
        assert_eq!(graph.level("b"), Some(1));
        assert_eq!(graph.level("c"), Some(2));
        assert_eq!(graph.parallel_groups(), &[vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn independent_roots_share_level_zero() {
        let wf = spec(vec![task("p", &[]), task("q", &[]), task("r", &["p", "q"])]);
        let (graph, _) = build(&wf).expect("valid");
        assert_eq!(graph.parallel_groups()[0], vec!["p".to_string(), "q".to_string()]);
        assert_eq!(graph.parallel_groups()[1], vec!["r".to_string()]);
    }

    #[test]
    fn empty_graph_is_rejected() {
        let wf = spec(vec![]);
        assert_eq!(build(&wf).unwrap_err(), GraphBuildError::EmptyGraph);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let wf = spec(vec![task("a", &["a"])]);
        let err = build(&wf).unwrap_err();
        assert!(matches!(err, GraphBuildError::CycleDetected { .. }));
    }

    #[test]
    fn three_node_cycle_reports_closed_path() {
        let wf = spec(vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])]);
        let err = build(&wf).unwrap_err();
        match err {
            GraphBuildError::CycleDetected { path } => {
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn undefined_dependency_is_rejected() {
        let wf = spec(vec![task("a", &["ghost"])]);
        assert_eq!(
            build(&wf).unwrap_err(),
            GraphBuildError::UndefinedDependency { from: "a".into(), to: "ghost".into() }
        );
    }

    #[test]
    fn implicit_dependency_from_template_reference_is_discovered() {
        let mut b = task("b", &[]);
        b.input.insert("x".to_string(), json!("{{tasks.a.output.value}}"));
        let wf = spec(vec![task("a", &[]), b]);
        let (graph, diagnostics) = build(&wf).expect("valid");
        assert_eq!(graph.level("b"), Some(1));
        assert!(diagnostics.edges.iter().any(|e| e.from == "b" && e.to == "a" && e.classification == EdgeClassification::Implicit));
    }

    #[test]
    fn explicit_edge_is_not_duplicated_as_implicit() {
        let mut b = task("b", &["a"]);
        b.input.insert("x".to_string(), json!("{{tasks.a.output.value}}"));
        let wf = spec(vec![task("a", &[]), b]);
        let (graph, diagnostics) = build(&wf).expect("valid");
        assert_eq!(graph.predecessors("b"), &["a".to_string()]);
        let explicit_count = diagnostics.edges.iter().filter(|e| e.from == "b" && e.to == "a").count();
        assert_eq!(explicit_count, 1);
    }

    #[test]
    fn single_task_is_level_zero_group_of_one() {
        let wf = spec(vec![task("solo", &[])]);
        let (graph, _) = build(&wf).expect("valid");
        assert_eq!(graph.parallel_groups(), &[vec!["solo".to_string()]]);
    }

    #[test]
    fn diamond_dag_levels_are_correct() {
        let wf = spec(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ]);
        let (graph, _) = build(&wf).expect("valid");
        assert_eq!(graph.level("a"), Some(0));
        assert_eq!(graph.level("b"), Some(1));
        assert_eq!(graph.level("c"), Some(1));
        assert_eq!(graph.level("d"), Some(2));
    }
}
