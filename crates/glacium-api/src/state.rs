//! Application state wiring configuration, registries and storage together.
//!
//! AppState holds the concrete instances every CLI command works against.
//! The engine is generic over its status store; AppState pins it to the
//! YAML store in each project directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use glacium_core::event::EventBus;
use glacium_core::job::JobRegistry;
use glacium_core::recipe::RecipeRegistry;
use glacium_core::workflow::JobManager;
use glacium_infra::config::{
    job_registry, load_config, load_config_strict, recipe_registry, resolve_runs_root,
};
use glacium_infra::filesystem::{FsProjectStore, YamlStatusStore, resolve_data_dir};
use glacium_types::config::GlaciumConfig;
use glacium_types::project::ProjectMeta;

pub type ConcreteJobManager = JobManager<YamlStatusStore>;

#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GlaciumConfig,
    pub projects: FsProjectStore,
    pub jobs: Arc<JobRegistry>,
    pub recipes: Arc<RecipeRegistry>,
}

impl AppState {
    /// Load configuration and build the registries.
    ///
    /// An explicit `config_path` must exist and parse; otherwise
    /// `{data_dir}/glacium.toml` is read leniently.
    pub async fn init(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = match config_path {
            Some(path) => load_config_strict(path).await?,
            None => load_config(&data_dir).await,
        };

        let runs_root = resolve_runs_root(&data_dir, &config);
        let jobs = job_registry(&config)?;
        let recipes = recipe_registry(&config)?;
        tracing::debug!(
            data_dir = %data_dir.display(),
            runs_root = %runs_root.display(),
            jobs = jobs.len(),
            recipes = recipes.len(),
            "initialized state"
        );

        Ok(Self {
            data_dir,
            projects: FsProjectStore::new(runs_root),
            jobs: Arc::new(jobs),
            recipes: Arc::new(recipes),
            config,
        })
    }

    /// Open a manager over an existing project. Events go to `bus`; the
    /// caller decides who listens.
    pub async fn open_project(
        &self,
        uid: &str,
        bus: EventBus,
    ) -> anyhow::Result<(ProjectMeta, ConcreteJobManager)> {
        let meta = self
            .projects
            .load(uid)
            .await
            .with_context(|| format!("Project '{uid}' not found"))?;
        let manager = self.open_manager(&meta, bus).await?;
        Ok((meta, manager))
    }

    pub async fn open_manager(
        &self,
        meta: &ProjectMeta,
        bus: EventBus,
    ) -> anyhow::Result<ConcreteJobManager> {
        let manager = JobManager::open(
            self.projects.context(meta),
            meta.jobs.clone(),
            Arc::clone(&self.jobs),
            self.projects.status_store(&meta.uid),
            bus,
        )
        .await
        .with_context(|| format!("Failed to open project '{}'", meta.uid))?;
        Ok(manager)
    }

    /// Persist the manager's current job specs into the project metadata.
    pub async fn save_specs(
        &self,
        meta: &mut ProjectMeta,
        manager: &ConcreteJobManager,
    ) -> anyhow::Result<()> {
        meta.jobs = manager.specs();
        self.projects
            .save(meta)
            .await
            .with_context(|| format!("Failed to save project '{}'", meta.uid))
    }
}
