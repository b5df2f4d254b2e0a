//! Shell executor
//!
//! Runs scripts with `bash -c` on the host machine.

use async_trait::async_trait;
use gantry_core::domain::job::JobVariables;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Executor, ExecutorError, finish, interleaved};

/// Executor that runs scripts on the host
pub struct ShellExecutor {
    shell: String,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::with_shell("bash")
    }

    /// Uses another POSIX shell, e.g. `sh` on minimal hosts
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            working_dir: None,
            env: Vec::new(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    fn set_working_directory(&mut self, path: &Path) {
        self.working_dir = Some(path.to_path_buf());
    }

    fn set_variables(&mut self, variables: &JobVariables) {
        self.env = variables
            .iter()
            .map(|var| (var.key.clone(), var.value.clone()))
            .collect();
    }

    async fn execute(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError> {
        debug!(shell = %self.shell, cwd = ?self.working_dir, "Executing command: {}", command);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(interleaved(command))
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        // Dropping the pending output future kills the child
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
            output = cmd.output() => output?,
        };

        finish(output.status, &output.stdout, &output.stderr)
    }
}
