//! Job poller
//!
//! Starts a lifecycle run on every tick of a fixed interval. Runs execute as
//! independent tasks, each holding a semaphore permit; a tick finding every
//! permit taken is skipped, so no job is requested while the runner is full.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::reporter::ErrorReporter;
use crate::service::{CycleOutcome, LifecycleEngine};

/// Job poller that continuously polls for and executes jobs
pub struct JobPoller {
    engine: Arc<LifecycleEngine>,
    interval: Duration,
    semaphore: Arc<Semaphore>,
    reporter: ErrorReporter,
    shutdown_timeout: Duration,
}

impl JobPoller {
    /// Creates a new job poller
    ///
    /// # Arguments
    /// * `engine` - Shared lifecycle engine
    /// * `interval` - Time between two job requests
    /// * `concurrency` - Maximum number of runs in flight
    /// * `reporter` - Destination of run errors
    /// * `shutdown_timeout` - How long in-flight runs may take to finish on shutdown
    pub fn new(
        engine: Arc<LifecycleEngine>,
        interval: Duration,
        concurrency: usize,
        reporter: ErrorReporter,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            interval,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            reporter,
            shutdown_timeout,
        }
    }

    /// Runs the polling loop until `cancel` fires, then drains in-flight runs
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting job poller (interval: {:?}, slots: {})",
            self.interval,
            self.semaphore.available_permits()
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut runs = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = runs.join_next(), if !runs.is_empty() => Self::reap(joined),
                _ = ticker.tick() => self.dispatch(&mut runs, &cancel),
            }
        }

        info!("Stopping job poller");
        self.drain(runs).await;
    }

    /// Spawns one lifecycle run if a slot is free
    fn dispatch(&self, runs: &mut JoinSet<CycleOutcome>, cancel: &CancellationToken) {
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            debug!("All job slots busy, skipping tick");
            return;
        };

        let engine = Arc::clone(&self.engine);
        let reporter = self.reporter.clone();
        let cancel = cancel.clone();

        runs.spawn(async move {
            let report = engine.run_cycle(&cancel).await;
            drop(permit);

            for error in report.errors {
                reporter.report(error);
            }
            report.outcome
        });
    }

    fn reap(joined: Result<CycleOutcome, JoinError>) {
        match joined {
            Ok(CycleOutcome::Completed { job_id, outcome }) => {
                debug!(job_id, success = outcome.is_success(), "Lifecycle run finished");
            }
            Ok(_) => {}
            Err(e) => error!("Lifecycle task failed: {}", e),
        }
    }

    /// Waits for in-flight runs, aborting whatever is left after the timeout
    async fn drain(&self, mut runs: JoinSet<CycleOutcome>) {
        if runs.is_empty() {
            return;
        }

        info!(in_flight = runs.len(), "Waiting for running jobs to finish");

        let wait = async {
            while let Some(joined) = runs.join_next().await {
                Self::reap(joined);
            }
        };

        if time::timeout(self.shutdown_timeout, wait).await.is_err() {
            warn!(remaining = runs.len(), "Shutdown timeout reached, aborting jobs");
            runs.shutdown().await;
        }
    }
}
