//! Executors
//!
//! An executor runs one shell command line at a time inside the job's
//! working directory and returns the combined stdout/stderr output.
//!
//! Backends are looked up by name in an [`ExecutorRegistry`]. The registry
//! hands out a fresh executor for every lifecycle run, so the working
//! directory bound through [`Executor::set_working_directory`] is never
//! shared between two jobs.

mod podman;
mod shell;

pub use podman::{PodmanExecutor, check_podman_available};
pub use shell::ShellExecutor;

use async_trait::async_trait;
use gantry_core::domain::job::JobVariables;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Output substituted for a successful command that printed nothing
pub const EMPTY_OUTPUT: &str = "ok";

/// Registry key of the host shell backend
pub const SHELL: &str = "shell";

/// Registry key of the podman backend
pub const PODMAN: &str = "podman";

/// Backends available in [`ExecutorRegistry::with_defaults`]
pub const BUILTIN_EXECUTORS: &[&str] = &[SHELL, PODMAN];

/// Errors returned by an executor
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The command interpreter could not be started
    #[error("{0}")]
    Spawn(#[from] std::io::Error),

    /// The command ran and exited unsuccessfully
    #[error("{}", describe_failure(*code, output))]
    Failed {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Combined output captured up to the failure
        output: String,
    },

    #[error("timed out after {0}s")]
    TimedOut(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("unknown executor: {0}")]
    Unknown(String),
}

fn describe_failure(code: Option<i32>, output: &str) -> String {
    let status = match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    };

    let output = output.trim_end();
    if output.is_empty() {
        status
    } else {
        format!("{}: {}", status, output)
    }
}

/// Runs command lines for a single lifecycle run
#[async_trait]
pub trait Executor: Send + Sync {
    /// Binds the directory every following command runs in
    fn set_working_directory(&mut self, path: &Path);

    /// Exports job variables to every following command
    fn set_variables(&mut self, variables: &JobVariables);

    /// Runs a command line
    ///
    /// # Returns
    /// The combined stdout/stderr output, [`EMPTY_OUTPUT`] when the command
    /// succeeded silently. A failing command returns
    /// [`ExecutorError::Failed`] carrying whatever output was captured.
    async fn execute(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError>;
}

/// Shared post-processing of a finished command
pub(crate) fn finish(
    status: std::process::ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<String, ExecutorError> {
    let mut output = String::from_utf8_lossy(stdout).to_string();
    output.push_str(&String::from_utf8_lossy(stderr));

    if !status.success() {
        return Err(ExecutorError::Failed {
            code: status.code(),
            output,
        });
    }

    if output.is_empty() {
        output = EMPTY_OUTPUT.to_string();
    }

    Ok(output)
}

/// Wraps a command so the shell writes stderr into the stdout pipe
pub(crate) fn interleaved(command: &str) -> String {
    format!("exec 2>&1\n{}", command)
}

type ExecutorBuilder = Box<dyn Fn() -> Box<dyn Executor> + Send + Sync>;

/// Executor backends keyed by name
pub struct ExecutorRegistry {
    builders: HashMap<String, ExecutorBuilder>,
}

impl ExecutorRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in backends
    ///
    /// # Arguments
    /// * `image` - Container image used by the podman backend
    pub fn with_defaults(image: &str) -> Self {
        let image = image.to_string();

        let mut registry = Self::new();
        registry.register(SHELL, || Box::new(ShellExecutor::new()));
        registry.register(PODMAN, move || Box::new(PodmanExecutor::new(image.clone())));
        registry
    }

    /// Registers a backend, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn() -> Box<dyn Executor> + Send + Sync + 'static,
    {
        self.builders.insert(name.to_string(), Box::new(builder));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Builds a fresh executor for one lifecycle run
    pub fn create(&self, name: &str) -> Result<Box<dyn Executor>, ExecutorError> {
        self.builders
            .get(name)
            .map(|builder| builder())
            .ok_or_else(|| ExecutorError::Unknown(name.to_string()))
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
