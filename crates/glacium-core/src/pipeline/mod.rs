//! Pipeline DSL: declarative sweeps of independent workflow instances.
//!
//! - `run` -- the `Run` owned builder
//! - `executor` -- bounded-concurrency execution, one `JobManager` per run
//!
//! A `Pipeline` is an ordered collection of runs with hard dependency edges
//! between them. `repeat` and `param_grid` expand a template run over
//! parameter axes, tagging each copy with `"axis=value"` labels.

pub mod executor;
pub mod run;

use std::collections::HashMap;

use glacium_types::run::{PipelineLayout, RunLink};
use indexmap::{IndexMap, IndexSet};
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::workflow::dag::{GraphError, topological_order};

pub use executor::{
    MaterializedProject, PipelineExecutor, PipelineOptions, ProjectMaterializer, run_job_specs,
};
pub use run::Run;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("run {0} is already part of the pipeline")]
    DuplicateRun(Uuid),

    #[error("run {0} has no jobs")]
    EmptyRun(Uuid),

    #[error("run graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid pipeline layout: {0}")]
    Layout(String),

    #[error("failed to materialize run: {0}")]
    Materialize(String),

    #[error("failed to serialize run: {0}")]
    Serialize(String),
}

/// Ordered collection of runs.
#[derive(Debug, Default)]
pub struct Pipeline {
    runs: IndexMap<Uuid, Run>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Collection operations
    // -----------------------------------------------------------------------

    pub fn add(&mut self, run: Run) -> Result<Uuid, PipelineError> {
        let id = run.id();
        if self.runs.contains_key(&id) {
            return Err(PipelineError::DuplicateRun(id));
        }
        self.runs.insert(id, run);
        Ok(id)
    }

    pub fn add_many<I>(&mut self, runs: I) -> Result<Vec<Uuid>, PipelineError>
    where
        I: IntoIterator<Item = Run>,
    {
        runs.into_iter().map(|run| self.add(run)).collect()
    }

    /// Remove a run and every edge pointing at it.
    pub fn remove(&mut self, id: &Uuid) -> Option<Run> {
        let removed = self.runs.shift_remove(id)?;
        for run in self.runs.values_mut() {
            run.strip_dependency(id);
        }
        Some(removed)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Run> {
        self.runs.get(id)
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.values()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// One copy of `template` per value of `axis`.
    pub fn repeat<I, V>(
        &mut self,
        template: &Run,
        axis: &str,
        values: I,
    ) -> Result<Vec<Uuid>, PipelineError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.add_many(sweep(template, axis, values))
    }

    /// One copy of `template` per combination of axis values.
    pub fn param_grid(
        &mut self,
        template: &Run,
        axes: &[(&str, Vec<Value>)],
    ) -> Result<Vec<Uuid>, PipelineError> {
        self.add_many(grid(template, axes))
    }

    /// A new pipeline with the runs whose tags satisfy `predicate`.
    ///
    /// Edges to runs that were filtered out are dropped.
    pub fn filter<F>(&self, predicate: F) -> Pipeline
    where
        F: Fn(&IndexSet<String>) -> bool,
    {
        let kept: IndexMap<Uuid, Run> = self
            .runs
            .values()
            .filter(|run| predicate(run.tag_set()))
            .map(|run| (run.id(), run.snapshot()))
            .collect();
        let ids: Vec<Uuid> = kept.keys().copied().collect();
        let mut filtered = Pipeline { runs: kept };
        for run in filtered.runs.values_mut() {
            let dangling: Vec<Uuid> = run
                .dependencies()
                .iter()
                .filter(|d| !ids.contains(d))
                .copied()
                .collect();
            for id in dangling {
                run.strip_dependency(&id);
            }
        }
        filtered
    }

    // -----------------------------------------------------------------------
    // Graph
    // -----------------------------------------------------------------------

    /// Runs in an order where every run follows the runs it depends on.
    pub fn execution_order(&self) -> Result<Vec<Uuid>, PipelineError> {
        let nodes: Vec<(Uuid, Vec<Uuid>)> = self
            .runs
            .values()
            .map(|run| (run.id(), run.dependencies().iter().copied().collect()))
            .collect();
        Ok(topological_order(&nodes)?)
    }

    /// Directed graph of runs with edges from dependency to dependent,
    /// validated for cycles and dangling edges first.
    pub fn dependency_graph(&self) -> Result<DiGraph<Uuid, ()>, PipelineError> {
        self.execution_order()?;
        let mut graph = DiGraph::new();
        let nodes: HashMap<Uuid, NodeIndex> = self
            .runs
            .keys()
            .map(|id| (*id, graph.add_node(*id)))
            .collect();
        for run in self.runs.values() {
            for dep in run.dependencies() {
                graph.add_edge(nodes[dep], nodes[&run.id()], ());
            }
        }
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Layout files
    // -----------------------------------------------------------------------

    pub fn to_layout(&self) -> PipelineLayout {
        PipelineLayout {
            runs: self.runs.values().map(Run::to_spec).collect(),
        }
    }

    /// YAML rendering of every run, in pipeline order.
    pub fn preview(&self) -> Result<String, PipelineError> {
        serde_yaml_ng::to_string(&self.to_layout())
            .map_err(|e| PipelineError::Serialize(e.to_string()))
    }

    /// Parse a layout document (`runs: [...]`).
    pub fn load_layout(yaml: &str) -> Result<Self, PipelineError> {
        let layout: PipelineLayout =
            serde_yaml_ng::from_str(yaml).map_err(|e| PipelineError::Layout(e.to_string()))?;
        Self::from_layout(layout)
    }

    /// Build a pipeline from layout entries. `after` entries refer to other
    /// entries by 0-based position or by explicit id.
    pub fn from_layout(layout: PipelineLayout) -> Result<Self, PipelineError> {
        let ids: Vec<Uuid> = layout
            .runs
            .iter()
            .map(|spec| spec.id.unwrap_or_else(Uuid::now_v7))
            .collect();

        let mut pipeline = Pipeline::new();
        for (pos, spec) in layout.runs.into_iter().enumerate() {
            let mut run = Run::new()
                .with_id(ids[pos])
                .set_bulk(spec.parameters)
                .jobs(spec.jobs)
                .tags(spec.tags);
            if let Some(case) = spec.case {
                run = run.case(case);
            }
            for link in spec.after {
                let target = match link {
                    RunLink::Position(i) => ids.get(i).copied().ok_or_else(|| {
                        PipelineError::Layout(format!(
                            "run #{pos} depends on position {i}, layout has {} runs",
                            ids.len()
                        ))
                    })?,
                    RunLink::Id(id) if ids.contains(&id) => id,
                    RunLink::Id(id) => {
                        return Err(PipelineError::Layout(format!(
                            "run #{pos} depends on unknown run {id}"
                        )));
                    }
                };
                run.add_dependency(target);
            }
            pipeline.add(run)?;
        }
        Ok(pipeline)
    }
}

/// Copies of `base`, one per value, each with `axis` set and tagged
/// `"axis=value"`.
pub fn sweep<I, V>(base: &Run, axis: &str, values: I) -> Vec<Run>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|value| {
            let value = value.into();
            let label = axis_tag(axis, &value);
            base.clone().set(axis, value).tag(label)
        })
        .collect()
}

/// Cartesian product of `axes` applied to copies of `base`. The first axis
/// varies slowest. Each run gets one `"axis=value"` tag per axis.
pub fn grid(base: &Run, axes: &[(&str, Vec<Value>)]) -> Vec<Run> {
    let mut runs = vec![base.clone()];
    for (axis, values) in axes {
        runs = runs
            .iter()
            .flat_map(|partial| {
                values.iter().map(move |value| {
                    partial
                        .clone()
                        .set(*axis, value.clone())
                        .tag(axis_tag(axis, value))
                })
            })
            .collect();
    }
    runs
}

/// `"axis=value"`, with strings rendered without quotes.
pub fn axis_tag(axis: &str, value: &Value) -> String {
    match value {
        Value::String(s) => format!("{axis}={s}"),
        other => format!("{axis}={other}"),
    }
}
