//! Dependency graph — builds a DAG from task snapshots, rejects cycles,
//! and answers "which tasks are dispatch-ready?".
//!
//! The graph is built once per resolution pass and never mutated; rebuilding
//! after the task set changes means constructing a new instance. Construction
//! fails closed: malformed input or a cycle aborts the whole pass.
//!
//! Invariants:
//! - `deps` and `dependents` are kept in sync (forward and reverse edges).
//! - Visitation follows input order, so cycle paths are reproducible.

use std::collections::{HashMap, HashSet};

use crate::error::{DispatchError, Result};
use crate::task::{TaskNode, TaskState};

/// Three-color DFS marking.
#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// An immutable dependency graph over one resolution pass.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Node ids in input order — the scan order for `ready_tasks`.
    order: Vec<String>,
    /// Forward edges: task -> tasks it waits for.
    deps: HashMap<String, Vec<String>>,
    /// Reverse edges: task -> tasks waiting for it.
    dependents: HashMap<String, Vec<String>>,
    /// Known task states, keyed by id.
    states: HashMap<String, TaskState>,
}

impl DependencyGraph {
    /// Build a graph from task snapshots.
    ///
    /// Fails on empty ids, duplicate ids, empty dependency ids, and cycles
    /// (including self-loops, reported as a one-node cycle). A dependency on
    /// an id absent from `nodes` is *not* an error — the dependent simply
    /// stays blocked until that id shows up as done in a later pass.
    pub fn build(nodes: &[TaskNode]) -> Result<Self> {
        let states: HashMap<String, TaskState> = nodes
            .iter()
            .map(|n| (n.id.clone(), n.state))
            .collect();
        let order = nodes.iter().map(|n| n.id.clone());
        let edges = nodes
            .iter()
            .map(|n| (n.id.as_str(), n.depends_on.as_slice()));
        Self::assemble(order, edges, states)
    }

    /// Build a graph from a plain id -> dependency-ids map, fetching task
    /// states through `lookup`. Keys are visited in lexicographic order to
    /// keep cycle reports deterministic.
    ///
    /// Ids for which `lookup` returns `None` participate in the edge
    /// structure but are treated as unknown tasks.
    pub fn from_map<F>(edges: &HashMap<String, Vec<String>>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<TaskState>,
    {
        let mut keys: Vec<&String> = edges.keys().collect();
        keys.sort();

        let states: HashMap<String, TaskState> = keys
            .iter()
            .filter_map(|id| lookup(id.as_str()).map(|s| (id.to_string(), s)))
            .collect();
        let order = keys.iter().map(|id| id.to_string());
        let edge_iter = keys
            .iter()
            .map(|id| (id.as_str(), edges[id.as_str()].as_slice()));
        Self::assemble(order, edge_iter, states)
    }

    fn assemble<'a, O, E>(order: O, edges: E, states: HashMap<String, TaskState>) -> Result<Self>
    where
        O: Iterator<Item = String>,
        E: Iterator<Item = (&'a str, &'a [String])>,
    {
        let order: Vec<String> = order.collect();

        let mut seen = HashSet::new();
        for id in &order {
            if id.is_empty() {
                return Err(DispatchError::EmptyTaskId);
            }
            if !seen.insert(id.as_str()) {
                return Err(DispatchError::DuplicateTaskId(id.clone()));
            }
        }

        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut edge_count = 0usize;
        for (id, declared) in edges {
            let mut direct = Vec::with_capacity(declared.len());
            for dep in declared {
                if dep.is_empty() {
                    return Err(DispatchError::EmptyDependencyId {
                        task: id.to_string(),
                    });
                }
                if direct.contains(dep) {
                    continue;
                }
                direct.push(dep.clone());
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(id.to_string());
                edge_count += 1;
            }
            if !direct.is_empty() {
                deps.insert(id.to_string(), direct);
            }
        }

        let graph = Self {
            order,
            deps,
            dependents,
            states,
        };

        if let Some(path) = graph.find_cycle() {
            return Err(DispatchError::Cycle { path });
        }

        tracing::debug!(
            nodes = graph.order.len(),
            edges = edge_count,
            "dependency graph built"
        );
        Ok(graph)
    }

    /// Depth-first cycle search over input order. Returns the minimal
    /// offending cycle as a closed path (first element == last element).
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colors: HashMap<&str, Color> = self
            .order
            .iter()
            .map(|id| (id.as_str(), Color::White))
            .collect();
        let mut stack: Vec<&str> = Vec::new();

        for id in &self.order {
            if colors[id.as_str()] != Color::White {
                continue;
            }
            if let Some(path) = self.dfs(id, &mut colors, &mut stack) {
                return Some(path);
            }
        }
        None
    }

    fn dfs<'a>(
        &'a self,
        node: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        colors.insert(node, Color::Gray);
        stack.push(node);

        if let Some(declared) = self.deps.get(node) {
            for dep in declared {
                match colors.get(dep.as_str()).copied() {
                    // Back-edge to an in-progress node: the cycle is the
                    // stack suffix from its first occurrence, closed.
                    Some(Color::Gray) => {
                        let start = stack.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|s| s.to_string()).collect();
                        path.push(dep.clone());
                        return Some(path);
                    }
                    Some(Color::Black) => {}
                    Some(Color::White) => {
                        if let Some(path) = self.dfs(dep, colors, stack) {
                            return Some(path);
                        }
                    }
                    // Dependency on an id outside this pass: it has no
                    // outgoing edges here, so it cannot close a cycle.
                    None => {}
                }
            }
        }

        stack.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// True iff every direct dependency of `id` exists and is done.
    ///
    /// A dependency on an unknown id yields `Ok(false)` — blocked, not an
    /// error. Only an unknown *task* id is an error.
    pub fn can_dispatch(&self, id: &str) -> Result<bool> {
        if !self.states.contains_key(id) {
            return Err(DispatchError::UnknownTask(id.to_string()));
        }
        let direct = self.deps.get(id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(direct
            .iter()
            .all(|dep| self.states.get(dep).is_some_and(TaskState::is_done)))
    }

    /// All dispatch-ready tasks, in original input order.
    pub fn ready_tasks(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.can_dispatch(id).unwrap_or(false))
            .map(String::as_str)
            .collect()
    }

    /// Tasks directly waiting on `id` (reverse-edge fan-out).
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.dependents
            .get(id)
            .map(|ds| ds.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Dependents of `id` that become dispatch-ready once `id` is done:
    /// every *other* dependency must already be done. This is the completion
    /// fan-out used to push newly unblocked work into the queue.
    pub fn unblocked_by(&self, id: &str) -> Vec<&str> {
        self.dependents(id)
            .into_iter()
            .filter(|dependent| {
                let direct = self.deps.get(*dependent).map(Vec::as_slice).unwrap_or(&[]);
                direct.iter().all(|dep| {
                    dep == id || self.states.get(dep).is_some_and(TaskState::is_done)
                })
            })
            .collect()
    }

    /// Number of nodes in this pass.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;

    fn node(id: &str, state: TaskState, deps: &[&str]) -> TaskNode {
        TaskNode::new(id, state, Priority::Normal).depends_on(deps)
    }

    #[test]
    fn test_build_empty_set() {
        let graph = DependencyGraph::build(&[]).unwrap();
        assert!(graph.is_empty());
        assert!(graph.ready_tasks().is_empty());
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = DependencyGraph::build(&[node("", TaskState::Todo, &[])]).unwrap_err();
        assert!(matches!(err, DispatchError::EmptyTaskId));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let nodes = vec![
            node("a", TaskState::Todo, &[]),
            node("a", TaskState::Todo, &[]),
        ];
        let err = DependencyGraph::build(&nodes).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateTaskId(id) if id == "a"));
    }

    #[test]
    fn test_empty_dependency_rejected() {
        let nodes = vec![node("a", TaskState::Todo, &[""])];
        let err = DependencyGraph::build(&nodes).unwrap_err();
        assert!(matches!(err, DispatchError::EmptyDependencyId { task } if task == "a"));
    }

    #[test]
    fn test_self_loop_is_one_node_cycle() {
        let nodes = vec![node("a", TaskState::Todo, &["a"])];
        let err = DependencyGraph::build(&nodes).unwrap_err();
        match err {
            DispatchError::Cycle { path } => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_cycle_path_is_closed_and_minimal() {
        // a -> b -> c -> d -> b: the cycle is b -> c -> d -> b, not the
        // whole traversal stack.
        let nodes = vec![
            node("a", TaskState::Todo, &["b"]),
            node("b", TaskState::Todo, &["c"]),
            node("c", TaskState::Todo, &["d"]),
            node("d", TaskState::Todo, &["b"]),
        ];
        let err = DependencyGraph::build(&nodes).unwrap_err();
        match err {
            DispatchError::Cycle { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path, vec!["b", "c", "d", "b"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let nodes = vec![
            node("a", TaskState::Done, &[]),
            node("b", TaskState::Todo, &["a"]),
            node("c", TaskState::Todo, &["a", "b"]),
        ];
        assert!(DependencyGraph::build(&nodes).is_ok());
    }

    #[test]
    fn test_convergent_paths_are_not_a_cycle() {
        let nodes = vec![
            node("a", TaskState::Done, &[]),
            node("b", TaskState::Todo, &["a"]),
            node("c", TaskState::Todo, &["a"]),
            node("d", TaskState::Todo, &["b", "c"]),
        ];
        assert!(DependencyGraph::build(&nodes).is_ok());
    }

    #[test]
    fn test_readiness_requires_all_deps_done() {
        let nodes = vec![
            node("a", TaskState::Done, &[]),
            node("b", TaskState::InProgress, &[]),
            node("c", TaskState::Todo, &["a"]),
            node("d", TaskState::Todo, &["a", "b"]),
        ];
        let graph = DependencyGraph::build(&nodes).unwrap();
        assert!(graph.can_dispatch("c").unwrap());
        assert!(!graph.can_dispatch("d").unwrap());
    }

    #[test]
    fn test_unknown_dependency_blocks_without_error() {
        let nodes = vec![node("a", TaskState::Todo, &["ghost"])];
        let graph = DependencyGraph::build(&nodes).unwrap();
        assert!(!graph.can_dispatch("a").unwrap());
    }

    #[test]
    fn test_unknown_task_is_an_error() {
        let graph = DependencyGraph::build(&[node("a", TaskState::Todo, &[])]).unwrap();
        let err = graph.can_dispatch("ghost").unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTask(id) if id == "ghost"));
    }

    #[test]
    fn test_ready_tasks_preserve_input_order() {
        let nodes = vec![
            node("z", TaskState::Todo, &[]),
            node("a", TaskState::Todo, &[]),
            node("m", TaskState::Todo, &["z"]),
        ];
        let graph = DependencyGraph::build(&nodes).unwrap();
        assert_eq!(graph.ready_tasks(), vec!["z", "a"]);
    }

    #[test]
    fn test_completion_fan_out() {
        let nodes = vec![
            node("a", TaskState::InProgress, &[]),
            node("b", TaskState::Done, &[]),
            node("c", TaskState::Todo, &["a"]),
            node("d", TaskState::Todo, &["a", "b"]),
            node("e", TaskState::Todo, &["a", "x"]),
        ];
        let graph = DependencyGraph::build(&nodes).unwrap();
        let mut deps = graph.dependents("a");
        deps.sort();
        assert_eq!(deps, vec!["c", "d", "e"]);

        // Once "a" completes: c and d become ready; e still waits on the
        // unknown id "x".
        let mut unblocked = graph.unblocked_by("a");
        unblocked.sort();
        assert_eq!(unblocked, vec!["c", "d"]);
    }

    #[test]
    fn test_from_map_matches_node_build() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec![]);
        edges.insert("b".to_string(), vec!["a".to_string()]);

        let graph = DependencyGraph::from_map(&edges, |id| match id {
            "a" => Some(TaskState::Done),
            "b" => Some(TaskState::Todo),
            _ => None,
        })
        .unwrap();

        assert!(graph.can_dispatch("b").unwrap());
        assert_eq!(graph.ready_tasks(), vec!["a", "b"]);
    }

    #[test]
    fn test_from_map_detects_cycles() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec!["b".to_string()]);
        edges.insert("b".to_string(), vec!["a".to_string()]);

        let err = DependencyGraph::from_map(&edges, |_| Some(TaskState::Todo)).unwrap_err();
        match err {
            DispatchError::Cycle { path } => assert_eq!(path.first(), path.last()),
            other => panic!("expected cycle, got {other}"),
        }
    }
}
