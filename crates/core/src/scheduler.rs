//! Wall-clock scheduler for zero-argument background jobs.
//!
//! Each registered job gets its own timer task, so cadences and failure
//! domains stay independent. Every tick runs the job on a freshly spawned task:
//! a slow run never delays the timer, and overlapping runs of the same job are
//! left for the job itself to filter (see `experience::drain`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    async fn run(&self);
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job `{0}` must have a non-zero interval")]
    ZeroInterval(String),
    #[error("job `{0}` is already registered")]
    DuplicateJob(String),
}

struct ScheduledJob {
    name: String,
    interval: Duration,
    job: Arc<dyn PeriodicJob>,
}

#[derive(Default)]
pub struct PeriodicScheduler {
    jobs: Vec<ScheduledJob>,
}

impl PeriodicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `job` every `interval`, first firing one interval after `start`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        job: Arc<dyn PeriodicJob>,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval(name));
        }
        if self.jobs.iter().any(|scheduled| scheduled.name == name) {
            return Err(SchedulerError::DuplicateJob(name));
        }

        self.jobs.push(ScheduledJob { name, interval, job });
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let timers = self
            .jobs
            .into_iter()
            .map(|scheduled| spawn_timer(scheduled, shutdown_rx.clone()))
            .collect();

        SchedulerHandle { shutdown: shutdown_tx, timers }
    }
}

fn spawn_timer(scheduled: ScheduledJob, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let ScheduledJob { name, interval, job } = scheduled;

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            event_name = "system.scheduler.job_started",
            job = %name,
            interval_secs = interval.as_secs_f64(),
            "periodic job scheduled"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(event_name = "system.scheduler.tick", job = %name, "dispatching periodic job");
                    let job = Arc::clone(&job);
                    tokio::spawn(async move { job.run().await });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(event_name = "system.scheduler.job_stopped", job = %name, "periodic job stopped");
    })
}

/// Running scheduler. Dropping the handle without `shutdown` also stops the
/// timers, but does not wait for them.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    timers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops all timers. Job runs already dispatched finish on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for timer in self.timers {
            if let Err(error) = timer.await {
                warn!(error = %error, "scheduler timer task ended abnormally");
            }
        }
    }
}
