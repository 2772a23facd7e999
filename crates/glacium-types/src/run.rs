//! Pipeline layout entries and per-Run execution results.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{JobOutcome, JobStatus};

/// Serializable snapshot of a Run, also the entry format of layout files.
///
/// `after` lists the 0-based positions (in the layout) or ids of Runs that
/// must finish first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub jobs: Vec<String>,
    #[serde(default)]
    pub tags: IndexSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<RunLink>,
}

/// Reference to another Run inside a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunLink {
    Position(usize),
    Id(Uuid),
}

/// A pipeline layout file: `runs: [...]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineLayout {
    #[serde(default)]
    pub runs: Vec<RunSpec>,
}

/// Terminal state of one Run inside a pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No top-level error and every job ended `Done`.
    Succeeded,
    /// Materialization, configuration or at least one job failed.
    Failed,
    /// Never scheduled because a Run it depends on did not succeed.
    DependencyFailed,
    /// Materialized and resolved but not executed.
    Planned,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Planned)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::DependencyFailed => write!(f, "dependency_failed"),
            RunStatus::Planned => write!(f, "planned"),
        }
    }
}

/// Per-Run outcome: final job statuses plus any top-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    #[serde(default)]
    pub tags: IndexSet<String>,
    /// UID of the materialized project, if materialization got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub jobs: Vec<JobOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// Derive the Run status from its job outcomes and top-level error.
    pub fn settle(
        run_id: Uuid,
        tags: IndexSet<String>,
        project: Option<String>,
        jobs: Vec<JobOutcome>,
        error: Option<String>,
    ) -> Self {
        let all_done = jobs.iter().all(|j| j.status == JobStatus::Done);
        let status = if error.is_none() && all_done {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        Self {
            run_id,
            tags,
            project,
            status,
            jobs,
            error,
        }
    }

    pub fn dependency_failed(run_id: Uuid, tags: IndexSet<String>, upstream: Uuid) -> Self {
        Self {
            run_id,
            tags,
            project: None,
            status: RunStatus::DependencyFailed,
            jobs: Vec::new(),
            error: Some(format!("dependency run {upstream} did not succeed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, status: JobStatus) -> JobOutcome {
        JobOutcome {
            name: name.into(),
            status,
            error: None,
        }
    }

    #[test]
    fn settle_requires_every_job_done() {
        let id = Uuid::now_v7();
        let ok = RunResult::settle(
            id,
            IndexSet::new(),
            None,
            vec![outcome("MESH", JobStatus::Done)],
            None,
        );
        assert_eq!(ok.status, RunStatus::Succeeded);

        let partial = RunResult::settle(
            id,
            IndexSet::new(),
            None,
            vec![
                outcome("MESH", JobStatus::Done),
                outcome("SOLVE", JobStatus::Skipped),
            ],
            None,
        );
        assert_eq!(partial.status, RunStatus::Failed);

        let errored = RunResult::settle(id, IndexSet::new(), None, vec![], Some("boom".into()));
        assert_eq!(errored.status, RunStatus::Failed);
    }

    #[test]
    fn layout_parses_positions_and_ids() {
        let yaml = r#"
runs:
  - case: wing
    parameters: { aoa: 4, velocity: 50.0 }
    jobs: [MESH, SOLVE]
    tags: [baseline]
  - jobs: [POST]
    after: [0]
"#;
        let layout: PipelineLayout = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(layout.runs.len(), 2);
        assert_eq!(layout.runs[0].case.as_deref(), Some("wing"));
        assert_eq!(layout.runs[0].parameters["aoa"], serde_json::json!(4));
        assert_eq!(layout.runs[1].after, vec![RunLink::Position(0)]);
    }
}
