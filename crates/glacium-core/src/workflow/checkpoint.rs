//! Durable checkpointing of job statuses.
//!
//! Wraps a `StatusStore` and the `EventBus`. Every transition is written
//! through the store first and only then published, so observers (timing
//! log, progress display) see exactly what a restart would see.

use chrono::Utc;
use glacium_types::error::StoreError;
use glacium_types::event::JobEvent;
use glacium_types::project::ProjectState;

use crate::event::EventBus;
use crate::repository::StatusStore;

/// Generic over `S: StatusStore` so it works with the YAML file store or
/// the in-memory store used in tests.
pub struct StatusCheckpoint<S: StatusStore> {
    project: String,
    store: S,
    bus: EventBus,
}

impl<S: StatusStore> StatusCheckpoint<S> {
    pub fn new(project: impl Into<String>, store: S, bus: EventBus) -> Self {
        Self {
            project: project.into(),
            store,
            bus,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub async fn load(&self) -> Result<Option<ProjectState>, StoreError> {
        self.store.load().await
    }

    /// Write `state` (with in-pass statuses collapsed) and then publish `event`.
    pub async fn commit(&self, state: &ProjectState, event: JobEvent) -> Result<(), StoreError> {
        self.store.save(&state.persisted()).await?;
        tracing::debug!(
            project = %self.project,
            job = event.job().unwrap_or("-"),
            "checkpointed job statuses"
        );
        self.bus.publish(event);
        Ok(())
    }

    /// Write without a job-level transition.
    pub async fn save(&self, state: &ProjectState) -> Result<(), StoreError> {
        let event = JobEvent::Saved {
            project: self.project.clone(),
            at: Utc::now(),
        };
        self.commit(state, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStatusStore;
    use glacium_types::job::JobStatus;

    #[tokio::test]
    async fn commit_persists_before_publishing() {
        let store = MemoryStatusStore::new();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let checkpoint = StatusCheckpoint::new("p1", store.clone(), bus);

        let mut state = ProjectState::pending(["MESH", "SOLVE"]);
        state.set("SOLVE", JobStatus::Skipped);
        checkpoint
            .commit(
                &state,
                JobEvent::Skipped {
                    project: "p1".into(),
                    job: "SOLVE".into(),
                    at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.job(), Some("SOLVE"));
        let saved = store.current().unwrap();
        assert_eq!(saved.get("SOLVE"), Some(JobStatus::Pending));
    }

    #[tokio::test]
    async fn failed_write_publishes_nothing() {
        let store = MemoryStatusStore::new();
        store.fail_writes(true);
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let checkpoint = StatusCheckpoint::new("p1", store, bus);

        assert!(checkpoint.save(&ProjectState::new()).await.is_err());
        assert!(rx.try_recv().is_err());
    }
}
