//! Materializes pipeline runs as project directories under the runs root.

use glacium_core::pipeline::{MaterializedProject, PipelineError, ProjectMaterializer, Run};
use glacium_types::job::JobSpec;

use crate::filesystem::{FsProjectStore, NewProject, YamlStatusStore};

/// Project name used when a run carries no tags.
pub const DEFAULT_RUN_NAME: &str = "run";

#[derive(Debug, Clone)]
pub struct FsMaterializer {
    projects: FsProjectStore,
}

impl FsMaterializer {
    pub fn new(projects: FsProjectStore) -> Self {
        Self { projects }
    }

    pub fn projects(&self) -> &FsProjectStore {
        &self.projects
    }
}

/// Tags joined with `_`, or [`DEFAULT_RUN_NAME`].
pub fn run_project_name(run: &Run) -> String {
    if run.tag_set().is_empty() {
        DEFAULT_RUN_NAME.to_string()
    } else {
        run.tag_set()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl ProjectMaterializer for FsMaterializer {
    type Store = YamlStatusStore;

    async fn materialize(
        &self,
        run: &Run,
        specs: &[JobSpec],
    ) -> Result<MaterializedProject<YamlStatusStore>, PipelineError> {
        let new = NewProject {
            name: run_project_name(run),
            case: run.selected_case().map(str::to_owned),
            recipe: None,
            parameters: run.parameters().clone(),
            jobs: specs.to_vec(),
        };
        let meta = self
            .projects
            .create(new)
            .await
            .map_err(|e| PipelineError::Materialize(e.to_string()))?;
        tracing::debug!(run_id = %run.id(), uid = %meta.uid, "materialized run");

        Ok(MaterializedProject {
            project: self.projects.context(&meta),
            store: self.projects.status_store(&meta.uid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glacium_core::event::EventBus;
    use glacium_core::job::{BoxJob, Job, JobContext, JobError, JobRegistry};
    use glacium_core::pipeline::{Pipeline, PipelineExecutor, PipelineOptions};
    use glacium_core::repository::StatusStore;
    use glacium_types::job::JobStatus;
    use glacium_types::run::RunStatus;
    use tempfile::TempDir;

    struct Touch(String);

    impl Job for Touch {
        fn name(&self) -> &str {
            &self.0
        }

        async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
            let marker = ctx.project.root.join(format!("{}.done", ctx.job));
            tokio::fs::write(marker, "").await?;
            Ok(())
        }
    }

    fn registry() -> Arc<JobRegistry> {
        let mut registry = JobRegistry::new();
        registry
            .register("MESH", vec![], |_| BoxJob::new(Touch("MESH".into())))
            .unwrap();
        registry
            .register("SOLVE", vec!["MESH".into()], |_| {
                BoxJob::new(Touch("SOLVE".into()))
            })
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn project_names_come_from_tags() {
        assert_eq!(run_project_name(&Run::new()), "run");
        assert_eq!(run_project_name(&Run::new().tag("wing").tag("aoa=4")), "wing_aoa=4");
    }

    #[tokio::test]
    async fn materialize_creates_project_with_parameters() {
        let tmp = TempDir::new().unwrap();
        let materializer = FsMaterializer::new(FsProjectStore::new(tmp.path()));
        let run = Run::new().case("wing").set("aoa", 4).job("SOLVE").tag("base");
        let specs = vec![JobSpec::new("MESH"), JobSpec::new("SOLVE").with_deps(["MESH"])];

        let materialized = materializer.materialize(&run, &specs).await.unwrap();

        let meta = materializer
            .projects()
            .load(&materialized.project.uid)
            .await
            .unwrap();
        assert_eq!(meta.name, "base");
        assert_eq!(meta.case.as_deref(), Some("wing"));
        assert_eq!(meta.jobs, specs);
        assert_eq!(materialized.project.config.get("aoa"), Some(serde_json::json!(4)));
        assert!(materialized.store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pipeline_runs_on_disk() {
        let tmp = TempDir::new().unwrap();
        let projects = FsProjectStore::new(tmp.path());
        let executor = PipelineExecutor::new(
            Arc::new(FsMaterializer::new(projects.clone())),
            registry(),
            EventBus::default(),
        );

        let mut pipeline = Pipeline::new();
        let first = Run::new().job("SOLVE").tag("first");
        let second = Run::new().job("MESH").tag("second").depends_on(&first);
        pipeline.add_many([first, second]).unwrap();

        let results = executor
            .execute(&pipeline, PipelineOptions::default())
            .await
            .unwrap();

        assert!(results.iter().all(|r| r.status == RunStatus::Succeeded));
        let uid = results[0].project.clone().unwrap();
        assert!(projects.project_dir(&uid).join("MESH.done").exists());
        assert!(projects.project_dir(&uid).join("SOLVE.done").exists());

        let state = projects.status_store(&uid).load().await.unwrap().unwrap();
        assert_eq!(state.get("SOLVE"), Some(JobStatus::Done));
        assert_eq!(projects.list_uids().await.unwrap().len(), 2);
    }
}
