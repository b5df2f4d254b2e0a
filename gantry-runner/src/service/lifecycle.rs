//! Job lifecycle engine
//!
//! One lifecycle run takes a runner from "asking for work" to "terminal state
//! reported":
//!
//! 1. Request a job; no job or a failed request ends the run
//! 2. Greet in the trace, then prepare a fresh working directory and clone
//! 3. Run every script of every step in order, failing fast
//! 4. After each successful step, upload the declared artifacts
//! 5. Trace the outcome and report it with exactly one `update job` call
//! 6. Clean the working directory according to the cleanup policy
//!
//! The engine itself holds no per-job state. Everything a run mutates (trace
//! offset, working directory, uploaded files) lives in a [`JobContext`] owned
//! by that run, so any number of runs can share one engine.

use gantry_client::Coordinator;
use gantry_core::domain::job::{Job, JobOutcome, Step};
use gantry_core::domain::runner::RunnerIdentity;
use gantry_core::dto::job::{FeaturesInfo, JobRequest, JobTraceOutput, UpdateJobRequest, VersionInfo};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::artifacts;
use super::error::{LifecycleError, ProcessError};
use super::trace::{self, TraceStream};
use crate::config::CleanupPolicy;
use crate::executor::{Executor, ExecutorError, ExecutorRegistry};

/// How a lifecycle run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The server had nothing to run
    NoJob,
    /// The job request failed, see the reported errors
    RequestFailed,
    /// Shutdown was requested before a job was received
    Cancelled,
    /// A job ran to a terminal state
    Completed { job_id: i64, outcome: JobOutcome },
}

/// Result of one lifecycle run
///
/// `errors` is ordered by severity: a lost terminal report comes before the
/// failure it was supposed to report.
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub errors: Vec<LifecycleError>,
}

impl CycleReport {
    fn new(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            errors: Vec::new(),
        }
    }
}

/// Mutable state of a single lifecycle run
struct JobContext {
    trace: TraceStream,
    workdir: Option<PathBuf>,
    uploaded: HashSet<PathBuf>,
}

impl JobContext {
    fn new(job: &Job) -> Self {
        Self {
            trace: TraceStream::new(job),
            workdir: None,
            uploaded: HashSet::new(),
        }
    }
}

/// Drives lifecycle runs against a coordination server
pub struct LifecycleEngine {
    coordinator: Arc<dyn Coordinator>,
    executors: Arc<ExecutorRegistry>,
    identity: RunnerIdentity,
    workspace: PathBuf,
    cleanup: CleanupPolicy,
}

impl LifecycleEngine {
    /// Creates a new engine
    ///
    /// # Arguments
    /// * `coordinator` - Coordination server binding
    /// * `executors` - Backends; `identity.executor` selects one per run
    /// * `identity` - Runner identity, its token authenticates job requests
    /// * `workspace` - Base directory for per-job working directories
    /// * `cleanup` - What to do with a working directory once the job is done
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        executors: Arc<ExecutorRegistry>,
        identity: RunnerIdentity,
        workspace: PathBuf,
        cleanup: CleanupPolicy,
    ) -> Self {
        Self {
            coordinator,
            executors,
            identity,
            workspace,
            cleanup,
        }
    }

    /// Build information sent with job requests and updates
    pub fn version_info(&self) -> VersionInfo {
        VersionInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            executor: self.identity.executor.clone(),
            shell: "bash".to_string(),
            features: FeaturesInfo::supported(),
        }
    }

    /// Performs one lifecycle run: request a job and, if one is handed out,
    /// carry it to its terminal state
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let request = JobRequest {
            info: self.version_info(),
            token: self.identity.token.clone(),
            last_update: String::new(),
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Job request cancelled");
                return CycleReport::new(CycleOutcome::Cancelled);
            }
            result = self.coordinator.request_job(&request) => result,
        };

        match result {
            Ok(Some(job)) => self.run_job(job, cancel).await,
            Ok(None) => {
                debug!("No job available");
                CycleReport::new(CycleOutcome::NoJob)
            }
            Err(e) => CycleReport {
                outcome: CycleOutcome::RequestFailed,
                errors: vec![LifecycleError::RequestJob(e)],
            },
        }
    }

    /// Carries a received job to its terminal state
    pub async fn run_job(&self, job: Job, cancel: &CancellationToken) -> CycleReport {
        info!(job_id = job.id, steps = job.steps.len(), "Received job");

        let mut ctx = JobContext::new(&job);
        let coordinator = self.coordinator.as_ref();

        ctx.trace
            .append(coordinator, &trace::greeting(&self.identity.name), cancel)
            .await;
        ctx.trace
            .append(coordinator, trace::GETTING_STARTED, cancel)
            .await;

        let result = self.process(&job, &mut ctx, cancel).await;
        let outcome = match &result {
            Ok(()) => JobOutcome::Succeeded,
            Err(e) => JobOutcome::failed(e.to_string()),
        };

        let mut report = CycleReport::new(CycleOutcome::Completed {
            job_id: job.id,
            outcome: outcome.clone(),
        });

        if let Err(e) = self.finalize(&job, &mut ctx, &outcome).await {
            report.errors.push(e);
        }
        if let Err(e) = result {
            report.errors.push(LifecycleError::Process(e));
        }

        self.clean_up(job.id, &ctx, outcome.is_success()).await;

        info!(job_id = job.id, state = %outcome.state(), "Job finished");
        report
    }

    /// Prepares the working directory and runs the steps
    async fn process(
        &self,
        job: &Job,
        ctx: &mut JobContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let executor = self.prepare(job, ctx, cancel).await?;
        let coordinator = self.coordinator.as_ref();

        ctx.trace
            .append(coordinator, trace::RUNNING_SCRIPTS, cancel)
            .await;

        for (index, step) in job.steps.iter().enumerate() {
            self.run_step(step, executor.as_ref(), ctx, cancel).await?;

            let last = index + 1 == job.steps.len();
            self.upload_artifacts(job, ctx, last, cancel).await?;
        }

        Ok(())
    }

    /// Creates the job working directory and clones the repository into it
    async fn prepare(
        &self,
        job: &Job,
        ctx: &mut JobContext,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Executor>, ProcessError> {
        let mut executor = self
            .executors
            .create(&self.identity.executor)
            .map_err(ProcessError::Executor)?;

        let dir = self
            .workspace
            .join(format!("job-{}-{}", job.id, Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&dir).await?;
        ctx.workdir = Some(dir.clone());

        debug!(job_id = job.id, dir = %dir.display(), "Prepared working directory");

        executor.set_working_directory(&dir);
        executor.set_variables(&job.variables);

        if job.git_info.repo_url.is_empty() {
            debug!(job_id = job.id, "No repository to clone");
            return Ok(executor);
        }

        let clone = format!("git clone {} .", shell_quote(&job.git_info.repo_url));
        executor
            .execute(&clone, cancel)
            .await
            .map_err(|e| cancelled_or(cancel, e, ProcessError::Clone))?;

        Ok(executor)
    }

    /// Runs the scripts of one step in order
    ///
    /// A positive step timeout bounds all scripts of the step together.
    async fn run_step(
        &self,
        step: &Step,
        executor: &dyn Executor,
        ctx: &mut JobContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        debug!(step = %step.name, scripts = step.script.len(), "Running step");

        // A deadline past what the clock can represent means no deadline
        let deadline = (step.timeout > 0)
            .then(|| Instant::now().checked_add(Duration::from_secs(step.timeout)))
            .flatten();

        for script in &step.script {
            let result = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, executor.execute(script, cancel))
                    .await
                    .unwrap_or(Err(ExecutorError::TimedOut(step.timeout))),
                None => executor.execute(script, cancel).await,
            };

            let output = result.map_err(|source| {
                cancelled_or(cancel, source, |source| ProcessError::Step {
                    step: step.name.clone(),
                    source,
                })
            })?;

            ctx.trace
                .append(
                    self.coordinator.as_ref(),
                    &trace::script_output(&step.name, &output),
                    cancel,
                )
                .await;
        }

        Ok(())
    }

    /// Uploads every declared artifact file not uploaded yet
    ///
    /// On the pass after the last step a missing literal path fails the job;
    /// earlier passes only skip it since a later step may still create it.
    async fn upload_artifacts(
        &self,
        job: &Job,
        ctx: &mut JobContext,
        last: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let Some(workdir) = ctx.workdir.clone() else {
            return Ok(());
        };

        for artifact in job.artifacts.iter().filter(|a| a.uploads_on_success()) {
            for relative in artifacts::resolve(&workdir, artifact, last)? {
                if ctx.uploaded.contains(&relative) {
                    continue;
                }

                let shown = relative.display().to_string();
                let full_path = workdir.join(&relative);
                let upload = self.coordinator.upload_artifact(
                    job.id,
                    &job.token,
                    &full_path,
                    &artifact.options,
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ProcessError::Cancelled),
                    result = upload => result.map_err(|source| ProcessError::Upload {
                        path: shown.clone(),
                        source,
                    })?,
                }

                info!(job_id = job.id, path = %shown, "Uploaded artifact");
                ctx.trace
                    .append(self.coordinator.as_ref(), &trace::uploaded(&shown), cancel)
                    .await;
                ctx.uploaded.insert(relative);
            }
        }

        Ok(())
    }

    /// Traces the outcome and reports it to the server
    ///
    /// Neither the final banner nor the `update job` call is cancellable, so
    /// a job always leaves the server's running state once it got this far
    /// and its trace ends with the reason.
    async fn finalize(
        &self,
        job: &Job,
        ctx: &mut JobContext,
        outcome: &JobOutcome,
    ) -> Result<(), LifecycleError> {
        let banner = match outcome {
            JobOutcome::Succeeded => trace::job_succeeded(),
            JobOutcome::Failed { reason } => trace::job_failed(reason),
        };
        ctx.trace
            .append(self.coordinator.as_ref(), &banner, &CancellationToken::new())
            .await;

        let mut request = UpdateJobRequest::from_outcome(&job.token, outcome);
        request.info = self.version_info();
        request.output = JobTraceOutput {
            checksum: String::new(),
            bytesize: ctx.trace.offset(),
        };

        match self.coordinator.update_job(job.id, &request).await {
            Ok(()) => Ok(()),
            Err(e) if outcome.is_success() => Err(LifecycleError::ReportSuccess(e)),
            Err(e) => Err(LifecycleError::ReportFailure(e)),
        }
    }

    async fn clean_up(&self, job_id: i64, ctx: &JobContext, succeeded: bool) {
        let Some(dir) = &ctx.workdir else {
            return;
        };

        if !self.cleanup.should_remove(succeeded) {
            info!(job_id, dir = %dir.display(), "Keeping working directory");
            return;
        }

        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            warn!(job_id, dir = %dir.display(), "Failed to remove working directory: {}", e);
        }
    }
}

/// Maps an executor error, collapsing anything caused by shutdown into
/// [`ProcessError::Cancelled`]
fn cancelled_or(
    cancel: &CancellationToken,
    error: ExecutorError,
    map: impl FnOnce(ExecutorError) -> ProcessError,
) -> ProcessError {
    if matches!(error, ExecutorError::Cancelled) || cancel.is_cancelled() {
        ProcessError::Cancelled
    } else {
        map(error)
    }
}

/// Quotes a value for a POSIX shell command line
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
