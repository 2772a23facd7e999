//! Project directories under the runs root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use glacium_core::job::ProjectContext;
use glacium_types::error::StoreError;
use glacium_types::job::JobSpec;
use glacium_types::project::ProjectMeta;
use indexmap::IndexMap;

use super::{ProjectLayout, YamlStatusStore, project_uid, read_optional, write_atomic};

/// Number of fresh uids tried when a directory already exists.
const CREATE_ATTEMPTS: usize = 8;

/// Input for [`FsProjectStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub case: Option<String>,
    pub recipe: Option<String>,
    pub parameters: IndexMap<String, serde_json::Value>,
    pub jobs: Vec<JobSpec>,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Creates, loads and lists project directories.
#[derive(Debug, Clone)]
pub struct FsProjectStore {
    runs_root: PathBuf,
}

impl FsProjectStore {
    pub fn new(runs_root: impl Into<PathBuf>) -> Self {
        Self {
            runs_root: runs_root.into(),
        }
    }

    pub fn runs_root(&self) -> &Path {
        &self.runs_root
    }

    pub fn layout(&self, uid: &str) -> ProjectLayout {
        ProjectLayout::new(&self.runs_root, uid)
    }

    pub fn project_dir(&self, uid: &str) -> PathBuf {
        self.runs_root.join(uid)
    }

    pub fn status_store(&self, uid: &str) -> YamlStatusStore {
        YamlStatusStore::new(self.layout(uid).status_file())
    }

    /// Context jobs of `meta` execute in: the project root plus its
    /// parameters as configuration.
    pub fn context(&self, meta: &ProjectMeta) -> ProjectContext {
        ProjectContext::new(meta.uid.clone(), self.project_dir(&meta.uid))
            .with_config(Arc::new(meta.parameters.clone()))
    }

    /// Create a new project directory with a fresh uid and write its
    /// metadata. Job statuses are written when a manager first opens it.
    pub async fn create(&self, new: NewProject) -> Result<ProjectMeta, StoreError> {
        tokio::fs::create_dir_all(&self.runs_root)
            .await
            .map_err(|source| StoreError::Write {
                path: self.runs_root.clone(),
                source,
            })?;

        let mut attempt = 0;
        let (uid, created_at) = loop {
            let now = Utc::now();
            let uid = project_uid(&new.name, now);
            let dir = self.project_dir(&uid);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => break (uid, now),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    if attempt >= CREATE_ATTEMPTS {
                        return Err(StoreError::Write { path: dir, source: e });
                    }
                    tracing::debug!(uid = %uid, "project directory exists, retrying");
                }
                Err(source) => return Err(StoreError::Write { path: dir, source }),
            }
        };

        let meta = ProjectMeta {
            uid,
            name: new.name,
            case: new.case,
            recipe: new.recipe,
            parameters: new.parameters,
            jobs: new.jobs,
            created_at,
        };
        self.save(&meta).await?;
        tracing::info!(uid = %meta.uid, name = %meta.name, jobs = meta.jobs.len(), "created project");
        Ok(meta)
    }

    pub async fn load(&self, uid: &str) -> Result<ProjectMeta, StoreError> {
        let path = self.layout(uid).project_file();
        let content = read_optional(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;
        serde_yaml_ng::from_str(&content).map_err(|e| StoreError::Parse {
            path,
            message: e.to_string(),
        })
    }

    pub async fn save(&self, meta: &ProjectMeta) -> Result<(), StoreError> {
        let path = self.layout(&meta.uid).project_file();
        let yaml = serde_yaml_ng::to_string(meta).map_err(|e| StoreError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&path, &yaml).await
    }

    /// Uids of every directory under the runs root that holds project
    /// metadata, sorted (and therefore by creation time).
    pub async fn list_uids(&self) -> Result<Vec<String>, StoreError> {
        let read_err = |source| StoreError::Read {
            path: self.runs_root.clone(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(&self.runs_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_err(e)),
        };

        let mut uids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let Some(uid) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if self.layout(&uid).project_file().is_file() {
                uids.push(uid);
            }
        }
        uids.sort();
        Ok(uids)
    }

    /// Load every project, skipping (with a warning) directories whose
    /// metadata cannot be parsed.
    pub async fn list(&self) -> Result<Vec<ProjectMeta>, StoreError> {
        let mut projects = Vec::new();
        for uid in self.list_uids().await? {
            match self.load(&uid).await {
                Ok(meta) => projects.push(meta),
                Err(e) => tracing::warn!(uid = %uid, error = %e, "skipping unreadable project"),
            }
        }
        Ok(projects)
    }
}
