//! Configuration loader for glacium.
//!
//! Reads `glacium.toml` from the data directory (`~/.glacium/` in
//! production) into [`GlaciumConfig`], and turns its job and recipe
//! sections into the registries the engine runs against.

use std::path::{Path, PathBuf};

use glacium_core::job::{BoxJob, JobRegistry, RegistryError};
use glacium_core::recipe::{RecipeError, RecipeRegistry};
use glacium_types::config::GlaciumConfig;
use glacium_types::error::ConfigError;
use thiserror::Error;

use crate::process::CommandJob;

pub const CONFIG_FILE: &str = "glacium.toml";

/// Load configuration from `{data_dir}/glacium.toml`.
///
/// - Missing file: [`GlaciumConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> GlaciumConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return GlaciumConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlaciumConfig::default();
        }
    };

    match toml::from_str::<GlaciumConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlaciumConfig::default()
        }
    }
}

/// Load an explicitly named config file. Unlike [`load_config`], every
/// problem is an error.
pub async fn load_config_strict(path: &Path) -> Result<GlaciumConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Resolve the runs root: absolute paths as-is, relative ones under
/// `data_dir`.
pub fn resolve_runs_root(data_dir: &Path, config: &GlaciumConfig) -> PathBuf {
    if config.runs_root.is_absolute() {
        config.runs_root.clone()
    } else {
        data_dir.join(&config.runs_root)
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid job configuration: {0}")]
    Job(#[from] RegistryError),

    #[error("invalid recipe configuration: {0}")]
    Recipe(#[from] RecipeError),
}

/// One [`CommandJob`] kind per `[jobs.<NAME>]` table.
pub fn job_registry(config: &GlaciumConfig) -> Result<JobRegistry, SetupError> {
    let mut registry = JobRegistry::new();
    for (name, job) in &config.jobs {
        let job_name = name.clone();
        let job_config = job.clone();
        registry.register(name.clone(), job.deps.clone(), move |_project| {
            BoxJob::new(CommandJob::new(job_name.clone(), job_config.clone()))
        })?;
    }
    tracing::debug!(jobs = registry.len(), "built job registry");
    Ok(registry)
}

/// One recipe per `[[recipes]]` entry.
pub fn recipe_registry(config: &GlaciumConfig) -> Result<RecipeRegistry, SetupError> {
    let mut registry = RecipeRegistry::new();
    for def in &config.recipes {
        registry.register_definition(def.clone())?;
    }
    tracing::debug!(recipes = registry.len(), "built recipe registry");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glacium_core::job::ProjectContext;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
runs_root = "/srv/glacium/runs"
default_concurrency = 4

[jobs.MESH]
command = "gmsh"
args = ["-3", "wing.geo"]

[jobs.SOLVE]
command = "solver"
deps = ["MESH"]

[[recipes]]
name = "solver"
description = "mesh and solve"
jobs = [{ name = "MESH" }, { name = "SOLVE", deps = ["MESH"] }]
"#;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.default_concurrency, 1);
        assert!(config.jobs.is_empty());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), SAMPLE).await.unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.default_concurrency, 4);
        assert_eq!(config.jobs["MESH"].args, vec!["-3", "wing.geo"]);
        assert_eq!(config.recipes.len(), 1);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.default_concurrency, 1);
    }

    #[tokio::test]
    async fn strict_load_reports_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = load_config_strict(&tmp.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, "default_concurrency = \"many\"").await.unwrap();
        assert!(matches!(
            load_config_strict(&path).await,
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn runs_root_resolution() {
        let mut config = GlaciumConfig::default();
        assert_eq!(
            resolve_runs_root(Path::new("/home/u/.glacium"), &config),
            PathBuf::from("/home/u/.glacium/runs")
        );
        config.runs_root = PathBuf::from("/scratch/runs");
        assert_eq!(
            resolve_runs_root(Path::new("/home/u/.glacium"), &config),
            PathBuf::from("/scratch/runs")
        );
    }

    #[test]
    fn registries_from_config() {
        let config: GlaciumConfig = toml::from_str(SAMPLE).unwrap();

        let jobs = job_registry(&config).unwrap();
        assert_eq!(jobs.names().collect::<Vec<_>>(), vec!["MESH", "SOLVE"]);
        let closure = jobs.closure("SOLVE").unwrap();
        assert_eq!(
            closure.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["MESH", "SOLVE"]
        );
        let project = ProjectContext::new("P", "/tmp/P");
        assert_eq!(jobs.instantiate("MESH", &project).name(), "MESH");

        let recipes = recipe_registry(&config).unwrap();
        assert_eq!(recipes.describe("solver"), Some("mesh and solve"));
        assert_eq!(recipes.build("solver", &project).unwrap().len(), 2);
    }

    #[test]
    fn invalid_recipe_job_is_rejected() {
        let config: GlaciumConfig = toml::from_str(
            r#"
[[recipes]]
name = "bad"
jobs = [{ name = "A+B" }]
"#,
        )
        .unwrap();
        assert!(matches!(
            recipe_registry(&config),
            Err(SetupError::Recipe(RecipeError::InvalidJob { .. }))
        ));
    }
}
