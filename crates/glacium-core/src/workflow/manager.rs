//! Job manager: runs a project's jobs in dependency order with durable
//! status tracking.
//!
//! One manager owns one project's status map. Execution within a project is
//! strictly sequential; every status change is checkpointed before the next
//! job starts. A failing job only affects itself and its dependents (which
//! are skipped for this pass). Graph problems abort before anything runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use glacium_types::error::StoreError;
use glacium_types::event::JobEvent;
use glacium_types::job::{JobListing, JobOutcome, JobRef, JobSpec, JobStatus};
use glacium_types::project::ProjectState;
use indexmap::IndexSet;
use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use super::checkpoint::StatusCheckpoint;
use super::dag::{self, GraphError};
use crate::event::EventBus;
use crate::job::{BoxJob, JobContext, JobRegistry, ProjectContext, RegistryError, error_chain};
use crate::recipe::{RecipeError, RecipeRegistry, plan_sync};
use crate::repository::StatusStore;

/// Errors that stop a manager operation as a whole.
///
/// Individual job failures are never reported here; they end up in the
/// [`RunSummary`].
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] GraphError),

    #[error("status store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error("no job {0} in project")]
    UnknownJob(String),

    #[error("cannot remove '{job}': required by {}", .dependents.join(", "))]
    InUse { job: String, dependents: Vec<String> },
}

/// Outcome of one pass: final status of every job the pass considered, in
/// execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<JobOutcome>,
}

impl RunSummary {
    pub fn count(&self, status: JobStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Counts keyed by status name, for display.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            *counts.entry(outcome.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn outcome(&self, name: &str) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// True when every considered job ended `Done`.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == JobStatus::Done)
    }
}

struct ProjectJob {
    spec: JobSpec,
    job: BoxJob,
}

/// Execution engine for a single project.
///
/// Generic over `S: StatusStore`. Two managers on the same project at once
/// is unsupported; callers serialize access per project.
pub struct JobManager<S: StatusStore> {
    project: ProjectContext,
    registry: Arc<JobRegistry>,
    jobs: Vec<ProjectJob>,
    state: ProjectState,
    checkpoint: StatusCheckpoint<S>,
}

impl<S: StatusStore> JobManager<S> {
    /// Bind `specs` to the project, load persisted statuses and reconcile
    /// them with the job list.
    pub async fn open(
        project: ProjectContext,
        specs: Vec<JobSpec>,
        registry: Arc<JobRegistry>,
        store: S,
        bus: EventBus,
    ) -> Result<Self, ManagerError> {
        let mut seen = IndexSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(GraphError::DuplicateJob(spec.name.clone()).into());
            }
        }
        dag::resolve_order(&specs)?;

        let checkpoint = StatusCheckpoint::new(project.uid.clone(), store, bus);
        let loaded = checkpoint.load().await?;
        let fresh = loaded.is_none();
        let mut state = loaded.unwrap_or_default();
        let changed = state.reconcile(specs.iter().map(|s| s.name.as_str()));

        let jobs = specs
            .into_iter()
            .map(|spec| ProjectJob {
                job: registry.instantiate(&spec.name, &project),
                spec,
            })
            .collect();

        let manager = Self {
            project,
            registry,
            jobs,
            state,
            checkpoint,
        };
        if fresh || changed {
            tracing::debug!(project = %manager.project.uid, fresh, "reconciled job statuses");
            manager.checkpoint.save(&manager.state).await?;
        }
        Ok(manager)
    }

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    pub fn bus(&self) -> &EventBus {
        self.checkpoint.bus()
    }

    pub fn store(&self) -> &S {
        self.checkpoint.store()
    }

    /// Job specs in project order.
    pub fn specs(&self) -> Vec<JobSpec> {
        self.jobs.iter().map(|j| j.spec.clone()).collect()
    }

    pub fn status(&self, name: &str) -> Option<JobStatus> {
        self.state.get(name)
    }

    /// `(name, status, 1-based index)` for every job, in project order.
    pub fn list_jobs(&self) -> Vec<JobListing> {
        self.state
            .iter()
            .enumerate()
            .map(|(i, (name, status))| JobListing {
                index: i + 1,
                name: name.to_string(),
                status,
            })
            .collect()
    }

    /// Resolve a name or 1-based index to a job name in this project.
    pub fn resolve_ref(&self, job: &JobRef) -> Result<String, ManagerError> {
        let name = match job {
            JobRef::Name(name) if self.state.contains(name) => Some(name.as_str()),
            JobRef::Name(_) => None,
            JobRef::Index(index) => self.state.name_at(*index),
        };
        name.map(str::to_string)
            .ok_or_else(|| ManagerError::UnknownJob(job.to_string()))
    }

    /// Dependency-respecting order of every job in the project.
    pub fn execution_order(&self) -> Result<Vec<String>, ManagerError> {
        Ok(dag::resolve_order(&self.specs())?)
    }

    /// Run the project, or only `names` and whatever they need.
    ///
    /// - `None`: every `Pending`, `Failed` or `Skipped` job is attempted.
    /// - `Some(names)`: named jobs are reset to `Pending` first; their
    ///   transitive dependencies run only if they are not `Done`.
    ///
    /// A job runs when all its dependencies are `Done`; otherwise it is
    /// skipped for this pass.
    pub async fn run(&mut self, names: Option<&[String]>) -> Result<RunSummary, ManagerError> {
        let order = self.execution_order()?;

        let selected: IndexSet<String> = match names {
            None => order
                .iter()
                .filter(|n| self.state.get(n).is_some_and(JobStatus::is_runnable))
                .cloned()
                .collect(),
            Some(names) => {
                for name in names {
                    if !self.state.contains(name) {
                        return Err(ManagerError::UnknownJob(name.clone()));
                    }
                }
                let specs = self.specs();
                let closure = dag::dependency_closure(&specs, names.iter().map(String::as_str));
                for name in names {
                    if self.state.get(name) != Some(JobStatus::Pending) {
                        self.reset(name).await?;
                    }
                }
                order
                    .iter()
                    .filter(|n| closure.contains(n.as_str()))
                    .filter(|n| {
                        names.contains(n) || self.state.get(n).is_some_and(JobStatus::is_runnable)
                    })
                    .cloned()
                    .collect()
            }
        };

        tracing::info!(
            project = %self.project.uid,
            jobs = selected.len(),
            "starting pass"
        );

        let mut summary = RunSummary::default();
        for (position, name) in order.iter().enumerate() {
            if !selected.contains(name) {
                continue;
            }
            let outcome = self.step(name, position + 1).await?;
            summary.outcomes.push(outcome);
        }

        tracing::info!(
            project = %self.project.uid,
            done = summary.count(JobStatus::Done),
            failed = summary.count(JobStatus::Failed),
            skipped = summary.count(JobStatus::Skipped),
            "pass finished"
        );
        Ok(summary)
    }

    /// Attempt one job: skip it if a dependency is not `Done`, otherwise
    /// run it with checkpoints before and after.
    async fn step(&mut self, name: &str, position: usize) -> Result<JobOutcome, ManagerError> {
        let Some(idx) = self.jobs.iter().position(|j| j.spec.name == name) else {
            return Err(ManagerError::UnknownJob(name.to_string()));
        };

        let blocked = self.jobs[idx]
            .spec
            .deps
            .iter()
            .find(|d| self.state.get(d) != Some(JobStatus::Done))
            .cloned();
        if let Some(dep) = blocked {
            tracing::warn!(
                project = %self.project.uid,
                job = %name,
                dependency = %dep,
                "dependency not done, skipping"
            );
            self.state.set(name, JobStatus::Skipped);
            let event = JobEvent::Skipped {
                project: self.project.uid.clone(),
                job: name.to_string(),
                at: Utc::now(),
            };
            self.checkpoint.commit(&self.state, event).await?;
            return Ok(JobOutcome {
                name: name.to_string(),
                status: JobStatus::Skipped,
                error: None,
            });
        }

        let started_at = Utc::now();
        self.state.set(name, JobStatus::Running);
        let event = JobEvent::Started {
            project: self.project.uid.clone(),
            job: name.to_string(),
            position,
            at: started_at,
        };
        self.checkpoint.commit(&self.state, event).await?;

        let ctx = JobContext {
            job: name.to_string(),
            position,
            project: self.project.clone(),
        };
        let span = tracing::info_span!("job", project = %self.project.uid, job = %name, position);
        let result = self.jobs[idx].job.execute(&ctx).instrument(span).await;

        let (status, error) = match result {
            Ok(()) => {
                tracing::info!(project = %self.project.uid, job = %name, "job done");
                (JobStatus::Done, None)
            }
            Err(err) => {
                let rendered = error_chain(&err);
                tracing::error!(
                    project = %self.project.uid,
                    job = %name,
                    error = %rendered,
                    "job failed"
                );
                (JobStatus::Failed, Some(rendered))
            }
        };

        self.state.set(name, status);
        let event = JobEvent::Finished {
            project: self.project.uid.clone(),
            job: name.to_string(),
            status,
            started_at,
            at: Utc::now(),
            error: error.clone(),
        };
        self.checkpoint.commit(&self.state, event).await?;

        Ok(JobOutcome {
            name: name.to_string(),
            status,
            error,
        })
    }

    async fn reset(&mut self, name: &str) -> Result<(), ManagerError> {
        self.state.set(name, JobStatus::Pending);
        let event = JobEvent::Reset {
            project: self.project.uid.clone(),
            job: name.to_string(),
            at: Utc::now(),
        };
        self.checkpoint.commit(&self.state, event).await?;
        tracing::info!(project = %self.project.uid, job = %name, "job reset");
        Ok(())
    }

    /// Put a job back to `Pending`. Dependents are left as they are.
    pub async fn reset_job(&mut self, job: &JobRef) -> Result<String, ManagerError> {
        let name = self.resolve_ref(job)?;
        self.reset(&name).await?;
        Ok(name)
    }

    /// Add a registered job plus any of its transitive dependencies the
    /// project lacks. Returns the names added, dependencies first.
    pub async fn add_job(&mut self, name: &str) -> Result<Vec<String>, ManagerError> {
        if self.state.contains(name) {
            tracing::info!(project = %self.project.uid, job = %name, "job already present");
            return Ok(Vec::new());
        }
        let missing: Vec<JobSpec> = self
            .registry
            .closure(name)?
            .into_iter()
            .filter(|spec| !self.state.contains(&spec.name))
            .collect();
        self.extend(missing).await
    }

    /// Drop a job from the project. Refused while other jobs depend on it.
    pub async fn remove_job(&mut self, job: &JobRef) -> Result<String, ManagerError> {
        let name = self.resolve_ref(job)?;
        let specs = self.specs();
        let dependents = dag::dependents(&specs, &name);
        if !dependents.is_empty() {
            return Err(ManagerError::InUse {
                job: name,
                dependents: dependents.into_iter().map(String::from).collect(),
            });
        }

        self.jobs.retain(|j| j.spec.name != name);
        self.state.remove(&name);
        self.checkpoint.save(&self.state).await?;
        tracing::info!(project = %self.project.uid, job = %name, "job removed");
        Ok(name)
    }

    /// Add jobs the given recipes define but the project lacks.
    ///
    /// Existing jobs, their dependencies and statuses are never touched, so
    /// a second call with the same recipes adds nothing.
    pub async fn sync_recipes(
        &mut self,
        recipes: &RecipeRegistry,
        names: &[&str],
    ) -> Result<Vec<String>, ManagerError> {
        let reference = names.join("+");
        let desired = recipes.build(&reference, &self.project)?;
        let missing = plan_sync(&self.specs(), &desired);
        self.extend(missing).await
    }

    /// Validate the enlarged graph, then bind and persist the new jobs.
    async fn extend(&mut self, additions: Vec<JobSpec>) -> Result<Vec<String>, ManagerError> {
        if additions.is_empty() {
            return Ok(Vec::new());
        }
        let mut candidate = self.specs();
        candidate.extend(additions.iter().cloned());
        dag::resolve_order(&candidate)?;

        let mut added = Vec::with_capacity(additions.len());
        for spec in additions {
            self.state.set(spec.name.clone(), JobStatus::Pending);
            added.push(spec.name.clone());
            self.jobs.push(ProjectJob {
                job: self.registry.instantiate(&spec.name, &self.project),
                spec,
            });
        }
        self.checkpoint.save(&self.state).await?;
        tracing::info!(project = %self.project.uid, added = ?added, "jobs added");
        Ok(added)
    }
}
