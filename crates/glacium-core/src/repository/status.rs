//! Persisted job status store.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use glacium_types::error::StoreError;
use glacium_types::project::ProjectState;

/// Storage for one project's status map.
///
/// `save` must be atomic: after a crash the store holds either the previous
/// or the new map, never a torn one. Uses native async fn in traits.
pub trait StatusStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> impl Future<Output = Result<Option<ProjectState>, StoreError>> + Send;

    fn save(&self, state: &ProjectState) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-memory store that records every write.
///
/// Clones share the same storage, so a test can keep a handle while the
/// manager owns another.
#[derive(Clone, Default)]
pub struct MemoryStatusStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    current: Mutex<Option<ProjectState>>,
    history: Mutex<Vec<ProjectState>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing persisted state.
    pub fn with_state(state: ProjectState) -> Self {
        let store = Self::default();
        if let Ok(mut current) = store.inner.current.lock() {
            *current = Some(state);
        }
        store
    }

    /// Last saved state.
    pub fn current(&self) -> Option<ProjectState> {
        self.inner.current.lock().ok().and_then(|c| c.clone())
    }

    /// Every state written, oldest first.
    pub fn history(&self) -> Vec<ProjectState> {
        self.inner
            .history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.inner.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn path() -> PathBuf {
        PathBuf::from("memory://jobs.yaml")
    }

    fn poisoned() -> std::io::Error {
        std::io::Error::other("memory store lock poisoned")
    }
}

impl StatusStore for MemoryStatusStore {
    async fn load(&self) -> Result<Option<ProjectState>, StoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read {
                path: Self::path(),
                source: std::io::Error::other("simulated read failure"),
            });
        }
        let current = self.inner.current.lock().map_err(|_| StoreError::Read {
            path: Self::path(),
            source: Self::poisoned(),
        })?;
        Ok(current.clone())
    }

    async fn save(&self, state: &ProjectState) -> Result<(), StoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: Self::path(),
                source: std::io::Error::other("simulated write failure"),
            });
        }
        let write_err = || StoreError::Write {
            path: Self::path(),
            source: Self::poisoned(),
        };
        *self.inner.current.lock().map_err(|_| write_err())? = Some(state.clone());
        self.inner
            .history
            .lock()
            .map_err(|_| write_err())?
            .push(state.clone());
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStatusStore")
            .field("writes", &self.write_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glacium_types::job::JobStatus;

    #[tokio::test]
    async fn save_then_load() {
        let store = MemoryStatusStore::new();
        assert!(store.load().await.unwrap().is_none());

        let mut state = ProjectState::pending(["MESH"]);
        state.set("MESH", JobStatus::Done);
        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(state));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let store = MemoryStatusStore::new();
        let handle = store.clone();
        store.save(&ProjectState::pending(["A"])).await.unwrap();
        assert_eq!(handle.current(), Some(ProjectState::pending(["A"])));
    }

    #[tokio::test]
    async fn simulated_failures_surface_as_store_errors() {
        let store = MemoryStatusStore::new();
        store.fail_writes(true);
        let err = store.save(&ProjectState::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));

        store.fail_reads(true);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }
}
