pub mod interval;
pub mod job;
pub mod registry;
pub mod runner;

pub use interval::{
    resolve_interval_minutes, IntervalSource, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES,
};
pub use job::{FnJob, JobDescriptor, JobFuture, JobSpec, GDPR_ERASURE, REMINDERS};
pub use registry::JobRegistry;
pub use runner::JobScheduler;
