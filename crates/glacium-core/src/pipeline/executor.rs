//! Pipeline executor: runs every `Run` of a pipeline through its own
//! `JobManager` with bounded concurrency.
//!
//! # Execution flow
//!
//! 1. Validate the run graph (cycles, dangling edges) before anything starts.
//! 2. Spawn every run without dependencies into a `JoinSet`; each task
//!    waits for a semaphore permit, so at most `concurrency` runs are active.
//! 3. Each task validates the run, materializes its project, opens a
//!    `JobManager` over it and runs all jobs to completion.
//! 4. When a run finishes, dependents whose dependencies all succeeded are
//!    spawned. Dependents of a run that did not succeed are never scheduled
//!    and are reported as `DependencyFailed`, transitively.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use glacium_types::job::{JobOutcome, JobSpec};
use glacium_types::run::{RunResult, RunStatus};
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tracing::Instrument;
use uuid::Uuid;

use super::{Pipeline, PipelineError, Run};
use crate::event::EventBus;
use crate::job::{JobRegistry, ProjectContext, error_chain};
use crate::repository::StatusStore;
use crate::workflow::manager::JobManager;

/// A run turned into a project on some storage backend.
pub struct MaterializedProject<S> {
    pub project: ProjectContext,
    pub store: S,
}

/// Creates the project a run executes in.
///
/// The core never decides where projects live or how their configuration is
/// rendered; infra provides the filesystem implementation, tests an
/// in-memory one. Uses native async fn in traits.
pub trait ProjectMaterializer: Send + Sync + 'static {
    type Store: StatusStore + 'static;

    fn materialize(
        &self,
        run: &Run,
        specs: &[JobSpec],
    ) -> impl Future<Output = Result<MaterializedProject<Self::Store>, PipelineError>> + Send;
}

/// Knobs for a pipeline execution.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Maximum number of runs executing at once. Zero is treated as one.
    pub concurrency: usize,
    /// Materialize and resolve each run without executing jobs.
    pub dry_run: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            dry_run: false,
        }
    }
}

/// Job specs for a run: each listed job plus its registered dependencies,
/// dependencies first, duplicates collapsed.
pub fn run_job_specs(run: &Run, registry: &JobRegistry) -> Result<Vec<JobSpec>, PipelineError> {
    let mut specs: IndexMap<String, JobSpec> = IndexMap::new();
    for name in run.unique_jobs() {
        let closure = registry
            .closure(name)
            .map_err(|e| PipelineError::Materialize(e.to_string()))?;
        for spec in closure {
            specs.entry(spec.name.clone()).or_insert(spec);
        }
    }
    Ok(specs.into_values().collect())
}

/// Schedules a pipeline's runs.
pub struct PipelineExecutor<M: ProjectMaterializer> {
    materializer: Arc<M>,
    registry: Arc<JobRegistry>,
    bus: EventBus,
}

impl<M: ProjectMaterializer> PipelineExecutor<M> {
    pub fn new(materializer: Arc<M>, registry: Arc<JobRegistry>, bus: EventBus) -> Self {
        Self {
            materializer,
            registry,
            bus,
        }
    }

    /// Execute every run. The outer `Result` only fails for graph problems
    /// detected before any run starts; everything else is reported per run.
    ///
    /// Results come back in pipeline order.
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        options: PipelineOptions,
    ) -> Result<Vec<RunResult>, PipelineError> {
        let order = pipeline.execution_order()?;
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

        let mut waiting: HashMap<Uuid, usize> = HashMap::new();
        let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for run in pipeline.runs() {
            waiting.insert(run.id(), run.dependencies().len());
            for dep in run.dependencies() {
                dependents.entry(*dep).or_default().push(run.id());
            }
        }

        tracing::info!(
            runs = order.len(),
            concurrency = options.concurrency.max(1),
            dry_run = options.dry_run,
            "executing pipeline"
        );

        let mut results: HashMap<Uuid, RunResult> = HashMap::new();
        let mut join_set = JoinSet::new();
        let mut tasks: HashMap<task::Id, Uuid> = HashMap::new();

        for id in &order {
            if waiting.get(id) == Some(&0) {
                if let Some(run) = pipeline.get(id) {
                    self.spawn_run(&mut join_set, &mut tasks, run, &semaphore, options.dry_run);
                }
            }
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            let Some((id, result)) = settle_joined(pipeline, &mut tasks, joined) else {
                continue;
            };
            let succeeded = result.status.is_success();
            tracing::info!(run_id = %id, status = %result.status, "run finished");
            results.insert(id, result);

            for dependent in dependents.get(&id).cloned().unwrap_or_default() {
                if results.contains_key(&dependent) {
                    continue;
                }
                if !succeeded {
                    propagate_failure(pipeline, &dependents, &mut results, dependent, id);
                    continue;
                }
                let remaining = waiting.entry(dependent).or_insert(0);
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    if let Some(run) = pipeline.get(&dependent) {
                        self.spawn_run(&mut join_set, &mut tasks, run, &semaphore, options.dry_run);
                    }
                }
            }
        }

        Ok(pipeline
            .runs()
            .map(|run| {
                results.remove(&run.id()).unwrap_or_else(|| {
                    RunResult::settle(
                        run.id(),
                        run.tag_set().clone(),
                        None,
                        Vec::new(),
                        Some("run was never scheduled".to_string()),
                    )
                })
            })
            .collect())
    }

    fn spawn_run(
        &self,
        join_set: &mut JoinSet<RunOutcome>,
        tasks: &mut HashMap<task::Id, Uuid>,
        run: &Run,
        semaphore: &Arc<Semaphore>,
        dry_run: bool,
    ) {
        let run = run.snapshot();
        let id = run.id();
        let materializer = Arc::clone(&self.materializer);
        let registry = Arc::clone(&self.registry);
        let bus = self.bus.clone();
        let semaphore = Arc::clone(semaphore);
        let span = tracing::info_span!("run", run_id = %id);

        let handle = join_set.spawn(
            async move {
                let _permit = semaphore.acquire_owned().await;
                let work = execute_run(materializer, registry, bus, run, dry_run);
                let outcome = AssertUnwindSafe(work).catch_unwind().await;
                (id, outcome)
            }
            .instrument(span),
        );
        tasks.insert(handle.id(), id);
    }
}

type RunOutcome = (Uuid, std::thread::Result<RunResult>);

/// Turn a joined task into the result of its run. Panics and join errors
/// both settle as a failed run; the task id map recovers the run id when the
/// task never handed it back.
fn settle_joined(
    pipeline: &Pipeline,
    tasks: &mut HashMap<task::Id, Uuid>,
    joined: Result<(task::Id, RunOutcome), JoinError>,
) -> Option<(Uuid, RunResult)> {
    let crashed = |id: Uuid, error: String| {
        tracing::error!(run_id = %id, error = %error, "run task crashed");
        RunResult::settle(id, tags_of(pipeline, &id), None, Vec::new(), Some(error))
    };

    match joined {
        Ok((task_id, (id, outcome))) => {
            tasks.remove(&task_id);
            let result = outcome.unwrap_or_else(|_| crashed(id, "run task panicked".to_string()));
            Some((id, result))
        }
        Err(e) => {
            let Some(id) = tasks.remove(&e.id()) else {
                tracing::error!(error = %e, "join error for an untracked task");
                return None;
            };
            Some((id, crashed(id, format!("run task failed: {e}"))))
        }
    }
}

fn tags_of(pipeline: &Pipeline, id: &Uuid) -> indexmap::IndexSet<String> {
    pipeline
        .get(id)
        .map(|r| r.tag_set().clone())
        .unwrap_or_default()
}

/// Mark `start` and everything downstream of it as never scheduled.
fn propagate_failure(
    pipeline: &Pipeline,
    dependents: &HashMap<Uuid, Vec<Uuid>>,
    results: &mut HashMap<Uuid, RunResult>,
    start: Uuid,
    upstream: Uuid,
) {
    let mut stack = vec![(start, upstream)];
    while let Some((id, cause)) = stack.pop() {
        if results.contains_key(&id) {
            continue;
        }
        tracing::warn!(run_id = %id, upstream = %cause, "dependency failed, not scheduling run");
        results.insert(
            id,
            RunResult::dependency_failed(id, tags_of(pipeline, &id), cause),
        );
        for next in dependents.get(&id).into_iter().flatten() {
            stack.push((*next, id));
        }
    }
}

async fn execute_run<M: ProjectMaterializer>(
    materializer: Arc<M>,
    registry: Arc<JobRegistry>,
    bus: EventBus,
    run: Run,
    dry_run: bool,
) -> RunResult {
    let id = run.id();
    let tags = run.tag_set().clone();
    let fail = |project: Option<String>, error: String| {
        tracing::error!(run_id = %id, error = %error, "run failed");
        RunResult::settle(id, tags.clone(), project, Vec::new(), Some(error))
    };

    if let Err(e) = run.validate() {
        return fail(None, e.to_string());
    }
    let specs = match run_job_specs(&run, &registry) {
        Ok(specs) => specs,
        Err(e) => return fail(None, e.to_string()),
    };
    let materialized = match materializer.materialize(&run, &specs).await {
        Ok(m) => m,
        Err(e) => return fail(None, e.to_string()),
    };

    let uid = materialized.project.uid.clone();
    let mut manager = match JobManager::open(
        materialized.project,
        specs,
        registry,
        materialized.store,
        bus,
    )
    .await
    {
        Ok(manager) => manager,
        Err(e) => return fail(Some(uid), error_chain(&e)),
    };

    if dry_run {
        return match manager.execution_order() {
            Ok(order) => RunResult {
                run_id: id,
                tags,
                project: Some(uid),
                status: RunStatus::Planned,
                jobs: order
                    .into_iter()
                    .map(|name| JobOutcome {
                        status: manager.status(&name).unwrap_or_default(),
                        name,
                        error: None,
                    })
                    .collect(),
                error: None,
            },
            Err(e) => fail(Some(uid), error_chain(&e)),
        };
    }

    let (summary, error) = match manager.run(None).await {
        Ok(summary) => (summary, None),
        Err(e) => (Default::default(), Some(error_chain(&e))),
    };
    let jobs = manager
        .list_jobs()
        .into_iter()
        .map(|listing| JobOutcome {
            error: summary
                .outcome(&listing.name)
                .and_then(|o| o.error.clone()),
            name: listing.name,
            status: listing.status,
        })
        .collect();

    RunResult::settle(id, tags, Some(uid), jobs, error)
}
