//! External command jobs.
//!
//! A [`CommandJob`] spawns a configured program inside the project
//! directory. Stdout and stderr go to `_logs/<JOB>.log`; a non-zero exit
//! fails the job.

use std::path::PathBuf;
use std::process::Stdio;

use glacium_core::job::{Job, JobContext, JobError};
use glacium_types::config::CommandJobConfig;

use crate::filesystem::LOG_DIR;

/// Environment variable carrying the job name.
pub const ENV_JOB: &str = "GLACIUM_JOB";
/// Environment variable carrying the job's 1-based position.
pub const ENV_JOB_INDEX: &str = "GLACIUM_JOB_INDEX";
/// Environment variable carrying the project directory.
pub const ENV_PROJECT_ROOT: &str = "GLACIUM_PROJECT_ROOT";
/// Prefix for project parameters exported to the command.
pub const ENV_PARAM_PREFIX: &str = "GLACIUM_PARAM_";

#[derive(Debug, Clone)]
pub struct CommandJob {
    name: String,
    config: CommandJobConfig,
}

impl CommandJob {
    pub fn new(name: impl Into<String>, config: CommandJobConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    fn workdir(&self, ctx: &JobContext) -> PathBuf {
        match &self.config.workdir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => ctx.project.root.join(dir),
            None => ctx.project.root.clone(),
        }
    }
}

/// `aoa` -> `GLACIUM_PARAM_AOA`; anything outside `[A-Za-z0-9_]` becomes `_`.
pub fn param_env_name(key: &str) -> String {
    let mut name = String::with_capacity(ENV_PARAM_PREFIX.len() + key.len());
    name.push_str(ENV_PARAM_PREFIX);
    name.extend(key.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    name
}

/// Strings are exported raw, everything else as JSON.
fn param_env_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let log_dir = ctx.project.root.join(LOG_DIR);
        tokio::fs::create_dir_all(&log_dir).await?;
        let log_path = log_dir.join(format!("{}.log", ctx.job));

        let stdout = std::fs::File::create(&log_path)?;
        let stderr = stdout.try_clone()?;

        let mut command = tokio::process::Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .current_dir(self.workdir(ctx))
            .env(ENV_JOB, &ctx.job)
            .env(ENV_JOB_INDEX, ctx.position.to_string())
            .env(ENV_PROJECT_ROOT, &ctx.project.root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        for key in ctx.project.config.keys() {
            if let Some(value) = ctx.project.config.get(&key) {
                command.env(param_env_name(&key), param_env_value(&value));
            }
        }
        command.envs(&self.config.env);

        tracing::debug!(
            job = %ctx.job,
            command = %self.config.command,
            log = %log_path.display(),
            "spawning command"
        );
        let status = command.status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(JobError::ExitStatus {
                command: self.config.command.clone(),
                code: status.code(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glacium_core::job::ProjectContext;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandJobConfig {
        CommandJobConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            ..Default::default()
        }
    }

    fn context(tmp: &TempDir, job: &str) -> JobContext {
        let root = tmp.path().join("P1");
        std::fs::create_dir_all(&root).unwrap();
        let mut params = IndexMap::new();
        params.insert("aoa".to_string(), serde_json::json!(4));
        params.insert("case-name".to_string(), serde_json::json!("wing"));
        JobContext {
            job: job.into(),
            position: 2,
            project: ProjectContext::new("P1", root).with_config(Arc::new(params)),
        }
    }

    #[test]
    fn param_names_are_sanitized() {
        assert_eq!(param_env_name("aoa"), "GLACIUM_PARAM_AOA");
        assert_eq!(param_env_name("case-name"), "GLACIUM_PARAM_CASE_NAME");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_and_environment_reach_the_log() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, "MESH");
        let job = CommandJob::new(
            "MESH",
            sh("echo \"$GLACIUM_JOB $GLACIUM_JOB_INDEX $GLACIUM_PARAM_AOA $GLACIUM_PARAM_CASE_NAME\"; echo oops >&2"),
        );

        job.execute(&ctx).await.unwrap();

        let log = std::fs::read_to_string(ctx.project.root.join("_logs/MESH.log")).unwrap();
        assert!(log.contains("MESH 2 4 wing"), "log was: {log}");
        assert!(log.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_fails_the_job() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, "SOLVE");
        let err = CommandJob::new("SOLVE", sh("exit 3"))
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ExitStatus { code: Some(3), .. }));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, "POST");
        let config = CommandJobConfig {
            command: "glacium-definitely-not-a-program".into(),
            ..Default::default()
        };
        let err = CommandJob::new("POST", config).execute(&ctx).await.unwrap_err();
        assert!(matches!(err, JobError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_workdir_is_inside_the_project() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp, "MESH");
        std::fs::create_dir_all(ctx.project.root.join("mesh")).unwrap();
        let mut config = sh("pwd");
        config.workdir = Some("mesh".into());

        CommandJob::new("MESH", config).execute(&ctx).await.unwrap();

        let log = std::fs::read_to_string(ctx.project.root.join("_logs/MESH.log")).unwrap();
        assert!(log.trim_end().ends_with("/P1/mesh"), "log was: {log}");
    }
}
