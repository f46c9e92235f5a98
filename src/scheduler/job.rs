use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A named unit of recurring work dispatched by the scheduler.
///
/// The scheduler never looks inside `run`; it only needs the name for
/// logging, the config key to look up the interval, and the count of items
/// processed on success.
#[async_trait]
pub trait JobDescriptor: Send + Sync {
    fn name(&self) -> &str;

    /// Key under `jobs.intervals` holding the interval in minutes.
    fn interval_config_key(&self) -> &str;

    fn default_interval_minutes(&self) -> u64;

    /// Runs one tick and returns the number of items processed.
    async fn run(&self) -> Result<u64>;
}

/// Static identity of a job: name, config key and default interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSpec {
    pub name: &'static str,
    pub interval_config_key: &'static str,
    pub default_interval_minutes: u64,
}

/// Processes pending GDPR erasure requests.
pub const GDPR_ERASURE: JobSpec = JobSpec {
    name: "gdpr_erasure",
    interval_config_key: "gdpr_erasure_interval_minutes",
    default_interval_minutes: 60,
};

/// Sends due logging reminders.
pub const REMINDERS: JobSpec = JobSpec {
    name: "reminders",
    interval_config_key: "reminder_interval_minutes",
    default_interval_minutes: 15,
};

pub type JobFuture = Pin<Box<dyn Future<Output = Result<u64>> + Send>>;

/// Job whose body is a closure supplied by a collaborator.
pub struct FnJob {
    spec: JobSpec,
    body: Box<dyn Fn() -> JobFuture + Send + Sync>,
}

impl FnJob {
    pub fn new<F, Fut>(spec: JobSpec, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        Self {
            spec,
            body: Box::new(move || Box::pin(body())),
        }
    }

    pub fn spec(&self) -> JobSpec {
        self.spec
    }
}

impl fmt::Debug for FnJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob").field("spec", &self.spec).finish()
    }
}

#[async_trait]
impl JobDescriptor for FnJob {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn interval_config_key(&self) -> &str {
        self.spec.interval_config_key
    }

    fn default_interval_minutes(&self) -> u64 {
        self.spec.default_interval_minutes
    }

    async fn run(&self) -> Result<u64> {
        (self.body)().await
    }
}
