//! Per-project job timing log.
//!
//! Subscribes to the event bus and appends one CSV row per finished job to
//! `<runs_root>/<uid>/job_times.csv`:
//!
//! ```text
//! job,start,end,duration_s
//! MESH,2025-03-07T14:05:09.000042+00:00,2025-03-07T14:05:11.500042+00:00,2.500
//! ```

use std::path::{Path, PathBuf};

use glacium_core::event::EventBus;
use glacium_types::error::StoreError;
use glacium_types::event::JobEvent;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::filesystem::ProjectLayout;

pub const TIMING_HEADER: &str = "job,start,end,duration_s\n";

#[derive(Debug, Clone)]
pub struct TimingLog {
    runs_root: PathBuf,
}

impl TimingLog {
    pub fn new(runs_root: impl Into<PathBuf>) -> Self {
        Self {
            runs_root: runs_root.into(),
        }
    }

    /// Subscribe to `bus` and record until every sender is dropped.
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.record(&event).await {
                            tracing::warn!(error = %e, "failed to write timing row");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "timing log lagged behind event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("timing log stopped");
        })
    }

    /// Append a row for `Finished` events; every other event is ignored.
    pub async fn record(&self, event: &JobEvent) -> Result<(), StoreError> {
        let JobEvent::Finished {
            project,
            job,
            started_at,
            at,
            ..
        } = event
        else {
            return Ok(());
        };

        let path = ProjectLayout::new(&self.runs_root, project).timing_file();
        let seconds = (*at - *started_at).num_milliseconds() as f64 / 1000.0;
        let row = format!(
            "{job},{},{},{seconds:.3}\n",
            started_at.to_rfc3339(),
            at.to_rfc3339()
        );
        append_row(&path, &row).await
    }
}

async fn append_row(path: &Path, row: &str) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(write_err)?;
    let empty = file.metadata().await.map_err(write_err)?.len() == 0;

    let mut buf = String::with_capacity(TIMING_HEADER.len() + row.len());
    if empty {
        buf.push_str(TIMING_HEADER);
    }
    buf.push_str(row);
    file.write_all(buf.as_bytes()).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use glacium_types::job::JobStatus;
    use tempfile::TempDir;

    fn finished(project: &str, job: &str, millis: i64) -> JobEvent {
        let started_at = Utc.with_ymd_and_hms(2025, 3, 7, 14, 5, 9).unwrap();
        JobEvent::Finished {
            project: project.into(),
            job: job.into(),
            status: JobStatus::Done,
            started_at,
            at: started_at + Duration::milliseconds(millis),
            error: None,
        }
    }

    #[tokio::test]
    async fn rows_are_appended_under_one_header() {
        let tmp = TempDir::new().unwrap();
        let log = TimingLog::new(tmp.path());

        log.record(&finished("P1", "MESH", 2500)).await.unwrap();
        log.record(&finished("P1", "SOLVE", 125)).await.unwrap();

        let csv = std::fs::read_to_string(tmp.path().join("P1/job_times.csv")).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "job,start,end,duration_s");
        assert!(lines[1].starts_with("MESH,2025-03-07T14:05:09+00:00,"));
        assert!(lines[1].ends_with(",2.500"));
        assert!(lines[2].ends_with(",0.125"));
    }

    #[tokio::test]
    async fn other_events_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let log = TimingLog::new(tmp.path());
        log.record(&JobEvent::Skipped {
            project: "P1".into(),
            job: "MESH".into(),
            at: Utc::now(),
        })
        .await
        .unwrap();
        assert!(!tmp.path().join("P1").exists());
    }

    #[tokio::test]
    async fn spawned_log_drains_bus_until_closed() {
        let tmp = TempDir::new().unwrap();
        let bus = EventBus::new(16);
        let handle = TimingLog::new(tmp.path()).spawn(&bus);

        bus.publish(finished("P2", "MESH", 1000));
        drop(bus);
        handle.await.unwrap();

        let csv = std::fs::read_to_string(tmp.path().join("P2/job_times.csv")).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }
}
