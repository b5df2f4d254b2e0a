//! Podman executor
//!
//! Runs every script in a throwaway container:
//! - The job working directory is mounted at `/builds`
//! - Job variables are passed with `-e`
//! - The container is removed when the script exits

use anyhow::{Context, Result};
use async_trait::async_trait;
use gantry_core::domain::job::JobVariables;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Executor, ExecutorError, finish, interleaved};

/// Mount point of the job working directory inside the container
const CONTAINER_WORKDIR: &str = "/builds";

/// Checks if podman is installed and available
pub async fn check_podman_available() -> Result<()> {
    let output = Command::new("podman")
        .arg("--version")
        .output()
        .await
        .context("Failed to execute 'podman --version'. Is podman installed?")?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

/// Executor that runs scripts inside podman containers
pub struct PodmanExecutor {
    image: String,
    working_dir: Option<PathBuf>,
    env: Vec<String>,
}

impl PodmanExecutor {
    /// Creates a new podman executor
    ///
    /// # Arguments
    /// * `image` - Container image (e.g., docker.io/alpine/git:latest)
    pub fn new(image: String) -> Self {
        Self {
            image,
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Arguments of the `podman run` invocation for a command
    fn run_args(&self, command: &str) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if let Some(dir) = &self.working_dir {
            args.push("-v".to_string());
            args.push(format!("{}:{}", dir.display(), CONTAINER_WORKDIR));
            args.push("-w".to_string());
            args.push(CONTAINER_WORKDIR.to_string());
        }

        for var in &self.env {
            args.push("-e".to_string());
            args.push(var.clone());
        }

        // Override any image entrypoint so `sh -c` always works
        args.push("--entrypoint".to_string());
        args.push("/bin/sh".to_string());
        args.push(self.image.clone());
        args.push("-c".to_string());
        args.push(interleaved(command));

        args
    }
}

#[async_trait]
impl Executor for PodmanExecutor {
    fn set_working_directory(&mut self, path: &Path) {
        self.working_dir = Some(path.to_path_buf());
    }

    fn set_variables(&mut self, variables: &JobVariables) {
        self.env = variables
            .iter()
            .map(|var| format!("{}={}", var.key, var.value))
            .collect();
    }

    async fn execute(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError> {
        debug!(image = %self.image, "Executing in container: {}", command);

        let mut cmd = Command::new("podman");
        cmd.args(self.run_args(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
            output = cmd.output() => output?,
        };

        finish(output.status, &output.stdout, &output.stderr)
    }
}
