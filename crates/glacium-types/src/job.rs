use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job inside one project.
///
/// - Pending: not yet run, or reset for another attempt
/// - Running: set immediately before the job executes
/// - Done: execute returned successfully
/// - Failed: execute returned an error
/// - Skipped: a dependency did not reach `Done` in the current pass
///
/// `Skipped` only exists inside a pass; it is written back as `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

impl JobStatus {
    /// The status as it should be written to the persisted store.
    pub fn persisted(self) -> Self {
        match self {
            JobStatus::Skipped => JobStatus::Pending,
            other => other,
        }
    }

    /// Whether a pass picks this job up. `Skipped` only lasts for the pass
    /// that set it, so it counts as `Pending` here.
    pub fn is_runnable(self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Done => write!(f, "DONE"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            "SKIPPED" => Ok(JobStatus::Skipped),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

/// Declarative description of a job: its name and the names it depends on.
///
/// Recipes produce ordered lists of these; the project keeps one per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique (per project), case-sensitive job name. Never contains `+`.
    pub name: String,
    /// Names of jobs that must be `Done` before this one runs. Ordered, no duplicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
        }
    }

    /// Append dependencies, ignoring names already present.
    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            self.add_dep(dep);
        }
        self
    }

    /// Add a single dependency if it is not already declared.
    pub fn add_dep(&mut self, dep: impl Into<String>) {
        let dep = dep.into();
        if !self.deps.contains(&dep) {
            self.deps.push(dep);
        }
    }

    /// Merge dependency additions from a later declaration of the same job.
    ///
    /// Returns `true` when at least one dependency was added.
    pub fn merge_deps(&mut self, other: &JobSpec) -> bool {
        let before = self.deps.len();
        for dep in &other.deps {
            self.add_dep(dep.clone());
        }
        self.deps.len() != before
    }
}

/// Reference to a job by name or by its 1-based position in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRef {
    Name(String),
    Index(usize),
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobRef::Name(name) => write!(f, "{name}"),
            JobRef::Index(index) => write!(f, "#{index}"),
        }
    }
}

impl FromStr for JobRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty job reference".to_string());
        }
        match trimmed.parse::<usize>() {
            Ok(0) => Err("job indices start at 1".to_string()),
            Ok(index) => Ok(JobRef::Index(index)),
            Err(_) => Ok(JobRef::Name(trimmed.to_string())),
        }
    }
}

impl From<&str> for JobRef {
    fn from(name: &str) -> Self {
        JobRef::Name(name.to_string())
    }
}

impl From<usize> for JobRef {
    fn from(index: usize) -> Self {
        JobRef::Index(index)
    }
}

/// One row of `list_jobs`: name, current status and 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    pub index: usize,
    pub name: String,
    pub status: JobStatus,
}

/// Final state of a single job after a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub name: String,
    pub status: JobStatus,
    /// Rendered error chain when the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_round_trips_through_from_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Skipped,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("done".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!("STALE".parse::<JobStatus>().is_err());
    }

    #[test]
    fn skipped_is_persisted_as_pending() {
        assert_eq!(JobStatus::Skipped.persisted(), JobStatus::Pending);
        assert_eq!(JobStatus::Failed.persisted(), JobStatus::Failed);
        assert_eq!(JobStatus::Done.persisted(), JobStatus::Done);
    }

    #[test]
    fn runnable_statuses() {
        assert!(JobStatus::Pending.is_runnable());
        assert!(JobStatus::Failed.is_runnable());
        assert!(JobStatus::Skipped.is_runnable());
        assert!(!JobStatus::Done.is_runnable());
        assert!(!JobStatus::Running.is_runnable());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&JobStatus::Done).unwrap();
        assert_eq!(json, "\"DONE\"");
    }

    #[test]
    fn merge_deps_adds_only_new_names() {
        let mut mesh = JobSpec::new("SOLVE").with_deps(["MESH"]);
        let later = JobSpec::new("SOLVE").with_deps(["MESH", "CONVERT"]);
        assert!(mesh.merge_deps(&later));
        assert_eq!(mesh.deps, vec!["MESH", "CONVERT"]);
        assert!(!mesh.merge_deps(&later));
    }

    #[test]
    fn with_deps_collapses_duplicates() {
        let spec = JobSpec::new("POST").with_deps(["SOLVE", "SOLVE", "MESH"]);
        assert_eq!(spec.deps, vec!["SOLVE", "MESH"]);
    }

    #[test]
    fn job_ref_parses_numbers_as_indices() {
        assert_eq!("3".parse::<JobRef>().unwrap(), JobRef::Index(3));
        assert_eq!(
            "MESH".parse::<JobRef>().unwrap(),
            JobRef::Name("MESH".to_string())
        );
        assert!("0".parse::<JobRef>().is_err());
        assert!("  ".parse::<JobRef>().is_err());
    }
}
