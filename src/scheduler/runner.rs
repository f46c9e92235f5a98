use crate::observability::{get_metrics, LatencyTimer};
use crate::scheduler::interval::{minutes_to_duration, resolve_interval_minutes, IntervalSource};
use crate::scheduler::job::JobDescriptor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

enum SchedulerState {
    Stopped,
    Running(Vec<JoinHandle<()>>),
}

#[derive(Clone)]
struct ScheduledJob {
    job: Arc<dyn JobDescriptor>,
    /// Set while a run of this job is executing; shared across restarts.
    active: Arc<AtomicBool>,
}

/// Clears the active flag even if the job body panics.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Dispatches recurring jobs, one timer task per job.
///
/// `stop` cancels future ticks only; a run already executing finishes in the
/// background. A tick that finds the previous run of the same job still
/// active is skipped.
pub struct JobScheduler {
    jobs: Vec<ScheduledJob>,
    intervals: HashMap<String, String>,
    state: Mutex<SchedulerState>,
}

impl JobScheduler {
    pub fn new(jobs: Vec<Arc<dyn JobDescriptor>>, intervals: HashMap<String, String>) -> Self {
        Self {
            jobs: jobs
                .into_iter()
                .map(|job| ScheduledJob {
                    job,
                    active: Arc::new(AtomicBool::new(false)),
                })
                .collect(),
            intervals,
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|scheduled| scheduled.job.name()).collect()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state(), SchedulerState::Running(_))
    }

    /// Resolved interval for a job, in minutes.
    pub fn interval_minutes(&self, job: &dyn JobDescriptor) -> u64 {
        let raw = self.intervals.get(job.interval_config_key()).map(String::as_str);
        let (minutes, source) = resolve_interval_minutes(raw, job.default_interval_minutes());

        match source {
            IntervalSource::Configured => {}
            IntervalSource::Clamped => tracing::warn!(
                job = job.name(),
                key = job.interval_config_key(),
                value = raw.unwrap_or_default(),
                minutes,
                "Interval out of range, clamped"
            ),
            IntervalSource::Default if raw.is_some() => tracing::warn!(
                job = job.name(),
                key = job.interval_config_key(),
                value = raw.unwrap_or_default(),
                minutes,
                "Interval not a whole number of minutes, using default"
            ),
            IntervalSource::Default => {}
        }

        minutes
    }

    /// Starts one timer per job. Returns `false` if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut state = self.state();
        if matches!(*state, SchedulerState::Running(_)) {
            tracing::warn!("Scheduler already running, ignoring start");
            return false;
        }

        let handles = self
            .jobs
            .iter()
            .map(|scheduled| {
                let minutes = self.interval_minutes(scheduled.job.as_ref());
                tracing::info!(job = scheduled.job.name(), minutes, "Scheduling job");
                tokio::spawn(run_timer(scheduled.clone(), minutes_to_duration(minutes)))
            })
            .collect();

        *state = SchedulerState::Running(handles);
        tracing::info!(jobs = self.jobs.len(), "Scheduler started");
        true
    }

    /// Cancels all timers. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.state();

        match std::mem::replace(&mut *state, SchedulerState::Stopped) {
            SchedulerState::Running(handles) => {
                for handle in handles {
                    handle.abort();
                }
                tracing::info!("Scheduler stopped");
                true
            }
            SchedulerState::Stopped => false,
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer(scheduled: ScheduledJob, period: Duration) {
    // First tick one full period after start, like a plain repeating timer.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if scheduled.active.swap(true, Ordering::AcqRel) {
            tracing::warn!(job = scheduled.job.name(), "Previous run still active, skipping tick");
            get_metrics().record_job_skipped(scheduled.job.name());
            continue;
        }

        // Runs in its own task so aborting the timer never cuts a run short.
        tokio::spawn(run_tick(scheduled.clone()));
    }
}

async fn run_tick(scheduled: ScheduledJob) {
    let _active = ActiveGuard(Arc::clone(&scheduled.active));
    let name = scheduled.job.name();
    let timer = LatencyTimer::new();

    match scheduled.job.run().await {
        Ok(count) => {
            tracing::info!(job = name, count, "Job tick completed");
            get_metrics().record_job_run(name, true, timer.elapsed_ms(), count);
        }
        Err(e) => {
            tracing::error!(job = name, error = %e, "Job tick failed");
            get_metrics().record_job_run(name, false, timer.elapsed_ms(), 0);
        }
    }
}
