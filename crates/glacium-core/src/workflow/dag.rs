//! Dependency resolution: deterministic topological order with full cycle
//! reporting.
//!
//! Depth-first search over nodes in registration order, visiting each node's
//! dependencies in their declared order and emitting a node once all of its
//! dependencies have been emitted. A node met again while still on the DFS
//! stack closes a cycle; the stack slice from that node onward is the cycle.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

use glacium_types::job::JobSpec;
use indexmap::IndexSet;
use thiserror::Error;

/// Graph-shape problems. All are fatal before anything executes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Ordered cycle members; the first node closes the loop.
    #[error("dependency cycle: {}", render_cycle(.0))]
    Cycle(Vec<String>),

    #[error("'{node}' depends on unknown '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("duplicate name '{0}'")]
    DuplicateJob(String),
}

fn render_cycle(members: &[String]) -> String {
    let mut parts: Vec<&str> = members.iter().map(String::as_str).collect();
    if let Some(first) = members.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

// ---------------------------------------------------------------------------
// Generic resolver
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

struct Dfs<'a, K> {
    nodes: &'a [(K, Vec<K>)],
    index: HashMap<&'a K, usize>,
    marks: Vec<Mark>,
    order: Vec<K>,
}

impl<'a, K> Dfs<'a, K>
where
    K: Clone + Eq + Hash + Display,
{
    /// Walk from `root` with an explicit frame stack. Each frame is a node
    /// on the current path plus the position of its next dependency.
    fn visit(&mut self, root: usize) -> Result<(), GraphError> {
        if self.marks[root] == Mark::Done {
            return Ok(());
        }
        let nodes = self.nodes;
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
        self.marks[root] = Mark::OnStack;

        while let Some(&(idx, next)) = frames.last() {
            let Some(dep) = nodes[idx].1.get(next) else {
                frames.pop();
                self.marks[idx] = Mark::Done;
                self.order.push(nodes[idx].0.clone());
                continue;
            };
            if let Some(top) = frames.last_mut() {
                top.1 += 1;
            }

            let dep_idx = self.index[dep];
            match self.marks[dep_idx] {
                Mark::Done => {}
                Mark::OnStack => {
                    let start = frames.iter().position(|&(i, _)| i == dep_idx).unwrap_or(0);
                    let members = frames[start..]
                        .iter()
                        .map(|&(i, _)| nodes[i].0.to_string())
                        .collect();
                    return Err(GraphError::Cycle(members));
                }
                Mark::Unvisited => {
                    self.marks[dep_idx] = Mark::OnStack;
                    frames.push((dep_idx, 0));
                }
            }
        }
        Ok(())
    }
}

/// Order `nodes` so every node comes after all of its dependencies.
///
/// `nodes` pairs each key with its ordered dependency list. Fails on
/// duplicate keys, dependencies that name no node, and cycles. The result
/// is a pure function of the input order.
pub fn topological_order<K>(nodes: &[(K, Vec<K>)]) -> Result<Vec<K>, GraphError>
where
    K: Clone + Eq + Hash + Display,
{
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, (key, _)) in nodes.iter().enumerate() {
        if index.insert(key, i).is_some() {
            return Err(GraphError::DuplicateJob(key.to_string()));
        }
    }
    for (key, deps) in nodes {
        if let Some(missing) = deps.iter().find(|d| !index.contains_key(d)) {
            return Err(GraphError::UnknownDependency {
                node: key.to_string(),
                dependency: missing.to_string(),
            });
        }
    }

    let mut dfs = Dfs {
        nodes,
        index,
        marks: vec![Mark::Unvisited; nodes.len()],
        order: Vec::with_capacity(nodes.len()),
    };
    for idx in 0..nodes.len() {
        dfs.visit(idx)?;
    }
    Ok(dfs.order)
}

// ---------------------------------------------------------------------------
// Job-level helpers
// ---------------------------------------------------------------------------

/// Resolve the execution order of a project's jobs.
pub fn resolve_order(specs: &[JobSpec]) -> Result<Vec<String>, GraphError> {
    let nodes: Vec<(String, Vec<String>)> = specs
        .iter()
        .map(|s| (s.name.clone(), s.deps.clone()))
        .collect();
    topological_order(&nodes)
}

/// `roots` plus everything they transitively depend on.
///
/// Names with no spec are kept (the resolver reports them); the walk does
/// not descend into them.
pub fn dependency_closure<'a, I>(specs: &[JobSpec], roots: I) -> IndexSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let by_name: HashMap<&str, &JobSpec> = specs.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut closure = IndexSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = roots.into_iter().collect();
    stack.reverse();

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        closure.insert(current.to_string());
        if let Some(spec) = by_name.get(current) {
            for dep in spec.deps.iter().rev() {
                if !visited.contains(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
    }
    closure
}

/// Jobs that list `name` as a direct dependency.
pub fn dependents<'a>(specs: &'a [JobSpec], name: &str) -> Vec<&'a str> {
    specs
        .iter()
        .filter(|s| s.deps.iter().any(|d| d == name))
        .map(|s| s.name.as_str())
        .collect()
}
