use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or writing persisted project state.
///
/// Always fatal for the current operation: the engine never guesses at
/// statuses it could not read or continues after a failed checkpoint.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("project not found: {0}")]
    NotFound(String),
}

/// Errors loading `glacium.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages_name_the_path() {
        let err = StoreError::Parse {
            path: PathBuf::from("/tmp/p/_cfg/jobs.yaml"),
            message: "bad indent".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to parse /tmp/p/_cfg/jobs.yaml: bad indent"
        );
    }
}
