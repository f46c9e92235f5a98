use crate::error::Result;
use crate::scheduler::job::{FnJob, JobDescriptor, JobSpec};
use crate::scheduler::runner::JobScheduler;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Collects the jobs a process runs before handing them to a scheduler.
///
/// Services owning recurring work register it here at startup, either as a
/// full [`JobDescriptor`] or as a body closure under one of the well-known
/// specs such as [`GDPR_ERASURE`](crate::scheduler::GDPR_ERASURE).
#[derive(Default)]
pub struct JobRegistry {
    jobs: Vec<Arc<dyn JobDescriptor>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, job: impl JobDescriptor + 'static) -> Self {
        self.push(Arc::new(job));
        self
    }

    /// Registers a closure as the body of `spec`.
    pub fn register_fn<F, Fut>(self, spec: JobSpec, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        self.register(FnJob::new(spec, body))
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Builds a stopped scheduler over the registered jobs.
    pub fn into_scheduler(self, intervals: HashMap<String, String>) -> JobScheduler {
        JobScheduler::new(self.jobs, intervals)
    }

    // A second registration under the same name replaces the first.
    fn push(&mut self, job: Arc<dyn JobDescriptor>) {
        match self.jobs.iter().position(|existing| existing.name() == job.name()) {
            Some(index) => {
                tracing::warn!(job = job.name(), "Job registered twice, replacing earlier registration");
                self.jobs[index] = job;
            }
            None => self.jobs.push(job),
        }
    }
}
