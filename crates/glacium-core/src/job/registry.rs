//! Explicit job registry: job name -> default dependencies + constructor.
//!
//! Built once at startup and passed by reference to whatever needs to
//! instantiate jobs. Nothing registers itself.

use std::collections::HashSet;
use std::sync::Arc;

use glacium_types::job::JobSpec;
use glacium_types::recipe::CHAIN_SEPARATOR;
use indexmap::IndexMap;
use thiserror::Error;

use super::{BoxJob, Job, JobContext, JobError, ProjectContext};

/// Errors from registry lookups and registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error("invalid job name '{0}': names are non-empty and may not contain '+'")]
    InvalidName(String),
}

type JobFactory = Arc<dyn Fn(&ProjectContext) -> BoxJob + Send + Sync>;

struct JobKind {
    deps: Vec<String>,
    factory: JobFactory,
}

/// Mapping of job name to the constructor producing that job for a project.
#[derive(Default)]
pub struct JobRegistry {
    kinds: IndexMap<String, JobKind>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job kind with its default dependencies.
    ///
    /// Registering an existing name replaces it.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        deps: Vec<String>,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&ProjectContext) -> BoxJob + Send + Sync + 'static,
    {
        let name = name.into();
        validate_name(&name)?;
        if self.kinds.contains_key(&name) {
            tracing::warn!(job = %name, "job kind already registered, replacing");
        }
        self.kinds.insert(
            name,
            JobKind {
                deps,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The spec a job gets when added without a recipe.
    pub fn spec(&self, name: &str) -> Option<JobSpec> {
        self.kinds
            .get(name)
            .map(|kind| JobSpec::new(name).with_deps(kind.deps.iter().cloned()))
    }

    /// `name` plus every job it transitively depends on, dependencies first.
    pub fn closure(&self, name: &str) -> Result<Vec<JobSpec>, RegistryError> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_closure(name, &mut seen, &mut out)?;
        Ok(out)
    }

    fn collect_closure(
        &self,
        name: &str,
        seen: &mut HashSet<String>,
        out: &mut Vec<JobSpec>,
    ) -> Result<(), RegistryError> {
        if !seen.insert(name.to_string()) {
            return Ok(());
        }
        let spec = self
            .spec(name)
            .ok_or_else(|| RegistryError::UnknownJob(name.to_string()))?;
        for dep in &spec.deps {
            self.collect_closure(dep, seen, out)?;
        }
        out.push(spec);
        Ok(())
    }

    /// Build the job for `name`, bound to `project`.
    ///
    /// Unknown names produce an [`UnavailableJob`] so a project whose job
    /// kinds changed can still be loaded and listed.
    pub fn instantiate(&self, name: &str, project: &ProjectContext) -> BoxJob {
        match self.kinds.get(name) {
            Some(kind) => (kind.factory)(project),
            None => {
                tracing::warn!(job = %name, project = %project.uid, "job kind not registered");
                BoxJob::new(UnavailableJob::new(name))
            }
        }
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() || name.contains(CHAIN_SEPARATOR) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Placeholder for a persisted job whose kind is no longer registered.
#[derive(Debug, Clone)]
pub struct UnavailableJob {
    name: String,
}

impl UnavailableJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Job for UnavailableJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        Err(JobError::Unavailable(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(String);

    impl Job for Noop {
        fn name(&self) -> &str {
            &self.0
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            Ok(())
        }
    }

    fn registry() -> JobRegistry {
        let mut reg = JobRegistry::new();
        for (name, deps) in [
            ("MESH", vec![]),
            ("CONVERT", vec!["MESH"]),
            ("SOLVE", vec!["MESH", "CONVERT"]),
            ("POST", vec!["SOLVE"]),
        ] {
            let owned = name.to_string();
            reg.register(
                name,
                deps.into_iter().map(String::from).collect(),
                move |_| BoxJob::new(Noop(owned.clone())),
            )
            .unwrap();
        }
        reg
    }

    #[test]
    fn closure_lists_dependencies_first() {
        let reg = registry();
        let names: Vec<_> = reg
            .closure("POST")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["MESH", "CONVERT", "SOLVE", "POST"]);
    }

    #[test]
    fn closure_of_unknown_fails() {
        let err = registry().closure("NOPE").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownJob(name) if name == "NOPE"));
    }

    #[test]
    fn rejects_chain_separator_in_names() {
        let mut reg = JobRegistry::new();
        let err = reg
            .register("A+B", vec![], |_| BoxJob::new(Noop("A+B".into())))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName(_)));
    }

    #[tokio::test]
    async fn unknown_kind_instantiates_unavailable_job() {
        let reg = registry();
        let project = ProjectContext::new("p", "/tmp/p");
        let job = reg.instantiate("LEGACY", &project);
        assert_eq!(job.name(), "LEGACY");
        let ctx = JobContext {
            job: "LEGACY".into(),
            position: 1,
            project,
        };
        let err = job.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, JobError::Unavailable(_)));
    }

    #[test]
    fn spec_carries_default_deps() {
        let spec = registry().spec("SOLVE").unwrap();
        assert_eq!(spec.deps, vec!["MESH", "CONVERT"]);
        assert!(registry().spec("NOPE").is_none());
    }
}
