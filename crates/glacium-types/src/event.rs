//! Events published after each durable write of a project's job statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Something that happened to a job, already persisted when observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Status flipped to `Running`, execute is about to be called.
    Started {
        project: String,
        job: String,
        position: usize,
        at: DateTime<Utc>,
    },
    /// Execute returned; `status` is `Done` or `Failed`.
    Finished {
        project: String,
        job: String,
        status: JobStatus,
        started_at: DateTime<Utc>,
        at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Skipped {
        project: String,
        job: String,
        at: DateTime<Utc>,
    },
    Reset {
        project: String,
        job: String,
        at: DateTime<Utc>,
    },
    /// Status file written without a job-level transition (add, remove, reconcile).
    Saved { project: String, at: DateTime<Utc> },
}

impl JobEvent {
    pub fn project(&self) -> &str {
        match self {
            JobEvent::Started { project, .. }
            | JobEvent::Finished { project, .. }
            | JobEvent::Skipped { project, .. }
            | JobEvent::Reset { project, .. }
            | JobEvent::Saved { project, .. } => project,
        }
    }

    pub fn job(&self) -> Option<&str> {
        match self {
            JobEvent::Started { job, .. }
            | JobEvent::Finished { job, .. }
            | JobEvent::Skipped { job, .. }
            | JobEvent::Reset { job, .. } => Some(job),
            JobEvent::Saved { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = JobEvent::Skipped {
            project: "p1".into(),
            job: "SOLVE".into(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "skipped");
        assert_eq!(json["job"], "SOLVE");
        assert_eq!(event.project(), "p1");
        assert_eq!(event.job(), Some("SOLVE"));
    }
}
