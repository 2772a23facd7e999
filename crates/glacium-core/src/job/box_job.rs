//! BoxJob -- object-safe dynamic dispatch wrapper for [`Job`].
//!
//! Blanket-impl pattern:
//! 1. `JobDyn` mirrors `Job` with a boxed future
//! 2. every `T: Job` implements `JobDyn`
//! 3. `BoxJob` wraps `Box<dyn JobDyn>` and delegates

use futures_util::future::BoxFuture;

use super::{Job, JobContext, JobError};

/// Object-safe version of [`Job`].
pub trait JobDyn: Send + Sync {
    fn name(&self) -> &str;

    fn execute_boxed<'a>(&'a self, ctx: &'a JobContext) -> BoxFuture<'a, Result<(), JobError>>;
}

impl<T: Job> JobDyn for T {
    fn name(&self) -> &str {
        Job::name(self)
    }

    fn execute_boxed<'a>(&'a self, ctx: &'a JobContext) -> BoxFuture<'a, Result<(), JobError>> {
        Box::pin(self.execute(ctx))
    }
}

/// Type-erased job, as produced by the registry.
pub struct BoxJob {
    inner: Box<dyn JobDyn>,
}

impl BoxJob {
    pub fn new<T: Job>(job: T) -> Self {
        Self {
            inner: Box::new(job),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        self.inner.execute_boxed(ctx).await
    }
}

impl std::fmt::Debug for BoxJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxJob")
            .field("name", &self.inner.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ProjectContext;

    struct Echo;

    impl Job for Echo {
        fn name(&self) -> &str {
            "ECHO"
        }

        async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
            if ctx.position == 0 {
                return Err(JobError::failed("position must be 1-based"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn box_job_delegates() {
        let job = BoxJob::new(Echo);
        assert_eq!(job.name(), "ECHO");
        let ctx = JobContext {
            job: "ECHO".into(),
            position: 1,
            project: ProjectContext::new("p", "/tmp/p"),
        };
        job.execute(&ctx).await.unwrap();

        let bad = JobContext { position: 0, ..ctx };
        assert!(job.execute(&bad).await.is_err());
    }
}
