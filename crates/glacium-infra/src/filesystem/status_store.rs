//! YAML-backed [`StatusStore`]: `_cfg/jobs.yaml`, one `NAME: STATUS` line
//! per job, in project order.

use std::path::{Path, PathBuf};

use glacium_core::repository::StatusStore;
use glacium_types::error::StoreError;
use glacium_types::project::ProjectState;

use super::{read_optional, write_atomic};

#[derive(Debug, Clone)]
pub struct YamlStatusStore {
    path: PathBuf,
}

impl YamlStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusStore for YamlStatusStore {
    async fn load(&self) -> Result<Option<ProjectState>, StoreError> {
        let Some(content) = read_optional(&self.path).await? else {
            return Ok(None);
        };
        if content.trim().is_empty() {
            return Ok(Some(ProjectState::new()));
        }
        serde_yaml_ng::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    async fn save(&self, state: &ProjectState) -> Result<(), StoreError> {
        let yaml = serde_yaml_ng::to_string(state).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&self.path, &yaml).await?;
        tracing::trace!(path = %self.path.display(), jobs = state.len(), "wrote job statuses");
        Ok(())
    }
}
