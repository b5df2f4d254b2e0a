//! Lifecycle errors
//!
//! Everything a lifecycle run can report to the polling loop. None of these
//! stop the runner; the loop logs them and keeps polling.

use gantry_client::ClientError;
use thiserror::Error;

use crate::executor::ExecutorError;

/// Errors reported by one lifecycle run
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Asking for a job failed, nothing was started
    #[error("job request: {0}")]
    RequestJob(#[source] ClientError),

    /// The job ran and failed; its failure has been reported to the server
    #[error("job process: {0}")]
    Process(#[from] ProcessError),

    /// Reporting the failed state failed, the server may still show the job running
    #[error("job failed: {0}")]
    ReportFailure(#[source] ClientError),

    /// Reporting the success state failed, the server may still show the job running
    #[error("job finished: {0}")]
    ReportSuccess(#[source] ClientError),
}

impl LifecycleError {
    /// Whether the terminal `update job` call was lost
    pub fn is_terminal_report(&self) -> bool {
        matches!(
            self,
            LifecycleError::ReportFailure(_) | LifecycleError::ReportSuccess(_)
        )
    }

    /// Whether the server refused this runner
    pub fn is_forbidden(&self) -> bool {
        matches!(self, LifecycleError::RequestJob(e) if e.is_forbidden())
    }
}

/// Why a job failed
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("prepare workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("git clone: {0}")]
    Clone(#[source] ExecutorError),

    #[error("executor: {0}")]
    Executor(#[source] ExecutorError),

    /// A script of the named step failed
    #[error("{step}: {source}")]
    Step {
        step: String,
        #[source]
        source: ExecutorError,
    },

    #[error("artifact pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("artifact {0}: no such file or directory")]
    MissingArtifact(String),

    #[error("upload {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("cancelled")]
    Cancelled,
}
