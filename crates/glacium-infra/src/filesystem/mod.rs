//! Filesystem adapters for glacium.
//!
//! Project directory layout:
//!
//! ```text
//! {runs_root}/{uid}/
//!     _cfg/jobs.yaml      job statuses
//!     _cfg/project.yaml   project metadata and job specs
//!     _logs/{JOB}.log     command job output
//!     job_times.csv       timing log
//! ```

pub mod project;
pub mod status_store;

use std::path::{Path, PathBuf};

use glacium_types::error::StoreError;
use sha2::{Digest, Sha256};

pub use project::{FsProjectStore, NewProject};
pub use status_store::YamlStatusStore;

pub const CFG_DIR: &str = "_cfg";
pub const LOG_DIR: &str = "_logs";
pub const STATUS_FILE: &str = "jobs.yaml";
pub const PROJECT_FILE: &str = "project.yaml";
pub const TIMING_FILE: &str = "job_times.csv";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `GLACIUM_HOME` environment variable
/// 2. `~/.glacium`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("GLACIUM_HOME") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".glacium");
    }

    PathBuf::from(".glacium")
}

/// Paths inside one project directory.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(runs_root: &Path, uid: &str) -> Self {
        Self {
            root: runs_root.join(uid),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cfg_dir(&self) -> PathBuf {
        self.root.join(CFG_DIR)
    }

    pub fn status_file(&self) -> PathBuf {
        self.cfg_dir().join(STATUS_FILE)
    }

    pub fn project_file(&self) -> PathBuf {
        self.cfg_dir().join(PROJECT_FILE)
    }

    pub fn log_file(&self, job: &str) -> PathBuf {
        self.root.join(LOG_DIR).join(format!("{job}.log"))
    }

    pub fn timing_file(&self) -> PathBuf {
        self.root.join(TIMING_FILE)
    }
}

/// `YYYYMMDD-HHMMSS-ffffff-XXXX`: UTC timestamp plus the first four hex
/// digits (upper case) of the SHA-256 of `name`.
pub fn project_uid(name: &str, at: chrono::DateTime<chrono::Utc>) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let hex = format!("{digest:x}");
    format!("{}-{}", at.format("%Y%m%d-%H%M%S-%6f"), hex[..4].to_uppercase())
}

/// Write `contents` to a sibling temp file and rename it over `path`, so
/// readers see either the old or the new file.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
    Ok(())
}

/// Read a file, mapping "not found" to `None`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
