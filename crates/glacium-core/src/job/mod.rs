//! Job capability trait and the context a job executes in.
//!
//! - `Job` -- native async trait implemented per job kind
//! - `box_job` -- object-safe wrapper for storing heterogeneous jobs
//! - `registry` -- explicit name -> constructor mapping built at startup

pub mod box_job;
pub mod registry;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use box_job::{BoxJob, JobDyn};
pub use registry::{JobRegistry, RegistryError, UnavailableJob};

/// Read-only, project-scoped configuration handed to jobs.
///
/// The engine never looks inside; only job implementations interpret keys.
pub trait ConfigAccessor: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Keys available through `get`, when the accessor can enumerate them.
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Accessor with no keys, for projects without parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyConfig;

impl ConfigAccessor for EmptyConfig {
    fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }
}

impl ConfigAccessor for indexmap::IndexMap<String, serde_json::Value> {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        indexmap::IndexMap::get(self, key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        indexmap::IndexMap::keys(self).cloned().collect()
    }
}

/// The project a set of jobs is bound to.
#[derive(Clone)]
pub struct ProjectContext {
    pub uid: String,
    pub root: PathBuf,
    pub config: Arc<dyn ConfigAccessor>,
}

impl ProjectContext {
    pub fn new(uid: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            uid: uid.into(),
            root: root.into(),
            config: Arc::new(EmptyConfig),
        }
    }

    pub fn with_config(mut self, config: Arc<dyn ConfigAccessor>) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContext")
            .field("uid", &self.uid)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// What a job sees while executing: its name, its 1-based position in the
/// resolved order and the project it belongs to.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: String,
    pub position: usize,
    pub project: ProjectContext,
}

impl JobContext {
    pub fn config(&self, key: &str) -> Option<serde_json::Value> {
        self.project.config.get(key)
    }
}

/// Errors raised by a job's execute. Always local to that job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("job kind '{0}' is not registered")]
    Unavailable(String),

    #[error("command '{command}' exited with {}", .code.map_or("a signal".to_string(), |c| format!("status {c}")))]
    ExitStatus { command: String, code: Option<i32> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}

/// Render an error and its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = inner.source();
    }
    rendered
}

/// A unit of work inside a project.
///
/// Implemented once per job kind. Uses native async fn in traits; storage in
/// heterogeneous collections goes through [`BoxJob`].
pub trait Job: Send + Sync + 'static {
    /// Job name this instance was built for.
    fn name(&self) -> &str;

    fn execute(&self, ctx: &JobContext) -> impl Future<Output = Result<(), JobError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gmsh not found");
        let err = JobError::from(io);
        assert_eq!(error_chain(&err), "io error: gmsh not found");
    }

    #[test]
    fn exit_status_message() {
        let err = JobError::ExitStatus {
            command: "solver".into(),
            code: Some(3),
        };
        assert_eq!(err.to_string(), "command 'solver' exited with status 3");
        let killed = JobError::ExitStatus {
            command: "solver".into(),
            code: None,
        };
        assert_eq!(killed.to_string(), "command 'solver' exited with a signal");
    }

    #[test]
    fn job_context_reads_project_config() {
        let mut params = indexmap::IndexMap::new();
        params.insert("aoa".to_string(), serde_json::json!(4));
        let project = ProjectContext::new("p1", "/tmp/p1").with_config(Arc::new(params));
        let ctx = JobContext {
            job: "SOLVE".into(),
            position: 2,
            project,
        };
        assert_eq!(ctx.config("aoa"), Some(serde_json::json!(4)));
        assert_eq!(ctx.config("velocity"), None);
    }
}
