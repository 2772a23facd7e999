//! Project metadata and the persisted job status map.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::job::{JobSpec, JobStatus};

/// Ordered mapping of job name to status for a single project.
///
/// This is the source of truth across restarts. Iteration order is the
/// order jobs were added to the project, which doubles as the 1-based
/// listing index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectState {
    statuses: IndexMap<String, JobStatus>,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state where every given job starts `Pending`.
    pub fn pending<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statuses: names
                .into_iter()
                .map(|n| (n.into(), JobStatus::Pending))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<JobStatus> {
        self.statuses.get(name).copied()
    }

    /// Set a job's status, appending the job if it is not tracked yet.
    pub fn set(&mut self, name: impl Into<String>, status: JobStatus) {
        self.statuses.insert(name.into(), status);
    }

    /// Stop tracking a job. Keeps the relative order of the remaining jobs.
    pub fn remove(&mut self, name: &str) -> Option<JobStatus> {
        self.statuses.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.statuses.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, JobStatus)> {
        self.statuses.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Name at a 1-based listing position.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.statuses.get_index(i))
            .map(|(k, _)| k.as_str())
    }

    /// The form written to disk: in-pass `Skipped` collapses to `Pending`.
    pub fn persisted(&self) -> Self {
        Self {
            statuses: self
                .statuses
                .iter()
                .map(|(k, v)| (k.clone(), v.persisted()))
                .collect(),
        }
    }

    /// Align a loaded state with the project's job list.
    ///
    /// - names not in `jobs` are dropped
    /// - jobs missing from the state become `Pending`
    /// - a persisted `Running` means the process died mid-job and loads as `Failed`
    /// - `Skipped` loads as `Pending`
    ///
    /// The result is ordered like `jobs`. Returns `true` if anything changed.
    pub fn reconcile<'a, I>(&mut self, jobs: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut next = IndexMap::new();
        for name in jobs {
            let status = match self.statuses.get(name).copied() {
                None => JobStatus::Pending,
                Some(JobStatus::Running) => JobStatus::Failed,
                Some(other) => other.persisted(),
            };
            next.insert(name.to_string(), status);
        }
        // IndexMap equality ignores order, compare entry sequences instead.
        let changed = !next.iter().eq(self.statuses.iter());
        self.statuses = next;
        changed
    }
}

impl FromIterator<(String, JobStatus)> for ProjectState {
    fn from_iter<T: IntoIterator<Item = (String, JobStatus)>>(iter: T) -> Self {
        Self {
            statuses: iter.into_iter().collect(),
        }
    }
}

/// Everything needed to recreate a project directory's job set.
///
/// Stored as `project.yaml` next to the status file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// `YYYYMMDD-HHMMSS-ffffff-XXXX`
    pub uid: String,
    pub name: String,
    /// Case selector passed through to materialization, opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    /// Recipe reference the project was created from (may be a `+` chain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
    pub created_at: DateTime<Utc>,
}

impl ProjectMeta {
    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|j| j.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_at_is_one_based() {
        let state = ProjectState::pending(["MESH", "SOLVE", "POST"]);
        assert_eq!(state.name_at(1), Some("MESH"));
        assert_eq!(state.name_at(3), Some("POST"));
        assert_eq!(state.name_at(0), None);
        assert_eq!(state.name_at(4), None);
    }

    #[test]
    fn remove_keeps_order() {
        let mut state = ProjectState::pending(["A", "B", "C"]);
        state.remove("B");
        let names: Vec<_> = state.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn persisted_collapses_skipped() {
        let mut state = ProjectState::pending(["A", "B"]);
        state.set("A", JobStatus::Failed);
        state.set("B", JobStatus::Skipped);
        let persisted = state.persisted();
        assert_eq!(persisted.get("A"), Some(JobStatus::Failed));
        assert_eq!(persisted.get("B"), Some(JobStatus::Pending));
    }

    #[test]
    fn reconcile_drops_unknown_and_fills_missing() {
        let mut state: ProjectState = [
            ("GONE".to_string(), JobStatus::Done),
            ("SOLVE".to_string(), JobStatus::Running),
            ("MESH".to_string(), JobStatus::Done),
        ]
        .into_iter()
        .collect();

        let changed = state.reconcile(["MESH", "SOLVE", "POST"]);
        assert!(changed);
        let entries: Vec<_> = state.iter().collect();
        assert_eq!(
            entries,
            vec![
                ("MESH", JobStatus::Done),
                ("SOLVE", JobStatus::Failed),
                ("POST", JobStatus::Pending),
            ]
        );

        assert!(!state.reconcile(["MESH", "SOLVE", "POST"]));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut state = ProjectState::pending(["MESH", "SOLVE"]);
        state.set("MESH", JobStatus::Done);
        let yaml = serde_yaml_ng::to_string(&state).unwrap();
        assert_eq!(yaml, "MESH: DONE\nSOLVE: PENDING\n");
        let back: ProjectState = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, state);
    }
}
