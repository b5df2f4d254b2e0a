//! Job trace accumulator
//!
//! A job trace is an append-only byte stream on the server. Each append must
//! start exactly where the previous one ended, so a [`TraceStream`] owns the
//! offset for one job and every append for that job goes through it.

use gantry_client::Coordinator;
use gantry_core::domain::job::Job;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub const BOLD_BLUE: &str = "\x1b[34;1m";
pub const BOLD_GREEN: &str = "\x1b[32;1m";
pub const BOLD_RED: &str = "\x1b[31;1m";
pub const BOLD_YELLOW: &str = "\x1b[33;1m";
pub const RESET: &str = "\x1b[0;m";

/// Trace of a single job
pub struct TraceStream {
    job_id: i64,
    token: String,
    offset: usize,
}

impl TraceStream {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id,
            token: job.token.clone(),
            offset: 0,
        }
    }

    /// Start offset of the next append
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Appends a message to the trace
    ///
    /// Failures are logged and leave the offset untouched; the job goes on.
    /// Returns whether the append was accepted.
    pub async fn append(
        &mut self,
        coordinator: &dyn Coordinator,
        message: &str,
        cancel: &CancellationToken,
    ) -> bool {
        let patch =
            coordinator.patch_trace(self.job_id, &self.token, self.offset, message.as_bytes());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(job_id = self.job_id, offset = self.offset, "Trace append cancelled");
                return false;
            }
            result = patch => result,
        };

        match result {
            Ok(offset) => {
                debug!(job_id = self.job_id, from = self.offset, to = offset, "Trace appended");
                self.offset = offset;
                true
            }
            Err(e) => {
                error!(job_id = self.job_id, offset = self.offset, "Job trace error: {}", e);
                false
            }
        }
    }
}

/// `Runner <name> greets you!`
pub fn greeting(runner_name: &str) -> String {
    format!("Runner {BOLD_BLUE}{runner_name}{RESET} greets you!\n")
}

pub const GETTING_STARTED: &str = "I'm getting started.\n";

pub const RUNNING_SCRIPTS: &str = "Running scripts:\n";

/// Output of one script, prefixed with its step name
pub fn script_output(step_name: &str, output: &str) -> String {
    format!(
        "{BOLD_YELLOW}{step_name}{RESET}: {}\n",
        output.trim_end_matches('\n')
    )
}

pub fn uploaded(path: &str) -> String {
    format!("upload: {path}\n")
}

pub fn job_succeeded() -> String {
    format!("{BOLD_GREEN}Job succeeded!{RESET}\n")
}

pub fn job_failed(reason: &str) -> String {
    format!("{BOLD_RED}job failed: {reason}{RESET}\n")
}
