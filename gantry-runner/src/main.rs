//! Gantry Runner
//!
//! A CI build agent. It registers with a coordination server, polls it for
//! jobs, runs each job's scripts through an executor, streams the output back
//! as an incremental trace and reports the final state.
//!
//! Architecture:
//! - Configuration: YAML file with environment overrides
//! - Executors: Backends running one command line at a time (shell, podman)
//! - Services: The job lifecycle (trace, artifacts, terminal report)
//! - Scheduler: Interval polling with bounded concurrency and an error queue

mod config;
mod executor;
mod scheduler;
mod service;
mod shutdown;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gantry_client::{Coordinator, CoordinatorClient};
use gantry_core::domain::runner::RunnerIdentity;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LogConfig};
use crate::executor::{ExecutorRegistry, PODMAN, check_podman_available};
use crate::scheduler::{ERROR_QUEUE_CAPACITY, JobPoller, error_queue};
use crate::service::LifecycleEngine;
use crate::shutdown::install_shutdown_handler;

#[derive(Parser)]
#[command(name = "gantry-runner", version)]
#[command(about = "CI build agent", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        env = "GANTRY_CONFIG",
        default_value = "config.yml",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Exchange a registration token for a runner token and store it
    Register {
        /// Registration token issued by the server
        #[arg(long, env = "GANTRY_REGISTRATION_TOKEN")]
        token: String,
    },
    /// Poll for jobs until interrupted (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    init_tracing(&config.log);
    config.validate()?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let client: Arc<dyn Coordinator> = Arc::new(CoordinatorClient::with_client(config.api_url(), http));

    info!("Coordination server: {}", config.api_url());

    match cli.command.unwrap_or(Command::Run) {
        Command::Register { token } => register(&cli.config, &config, client.as_ref(), &token).await,
        Command::Run => run(config, client).await,
    }
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(log: &LogConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Registers the runner and writes the issued token into the config file
async fn register(
    path: &Path,
    config: &Config,
    client: &dyn Coordinator,
    registration_token: &str,
) -> Result<()> {
    let identity = config.identity();
    if identity.is_registered() {
        warn!("Runner already has a token, it will be replaced");
    }

    info!(name = %identity.name, tags = %identity.tag_list(), "Registering runner");
    let token = register_with_retry(client, registration_token, &identity).await?;

    Config::persist_token(path, &token)?;
    info!("Runner registered, token stored in {}", path.display());

    Ok(())
}

/// Register with the server with retry logic and exponential backoff
///
/// This handles the case where the server may not be ready yet when the
/// runner starts (common in container environments).
async fn register_with_retry(
    client: &dyn Coordinator,
    registration_token: &str,
    identity: &RunnerIdentity,
) -> Result<String> {
    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.register(registration_token, identity).await {
            Ok(token) => {
                if attempt > 1 {
                    info!("Successfully registered after {} attempt(s)", attempt);
                }
                return Ok(token);
            }
            Err(e) if e.is_client_error() || e.is_forbidden() => {
                // Retrying will not make a rejected token valid
                return Err(anyhow::anyhow!("Registration rejected: {}", e));
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to register after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to register runner: {}", e));
                }

                warn!(
                    "Failed to register (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}

/// Polls for jobs until SIGINT/SIGTERM
async fn run(config: Config, client: Arc<dyn Coordinator>) -> Result<()> {
    let identity = config.identity();
    if !identity.is_registered() {
        warn!("Runner token is empty, run `gantry-runner register --token <token>` first");
        return Ok(());
    }

    if identity.executor == PODMAN {
        check_podman_available().await?;
    }

    tokio::fs::create_dir_all(&config.runner.workspace)
        .await
        .with_context(|| {
            format!(
                "Failed to create workspace {}",
                config.runner.workspace.display()
            )
        })?;

    info!(
        name = %identity.name,
        executor = %identity.executor,
        workspace = %config.runner.workspace.display(),
        "Runner initialized"
    );

    let executors = Arc::new(ExecutorRegistry::with_defaults(&config.runner.image));
    let engine = Arc::new(LifecycleEngine::new(
        client,
        executors,
        identity,
        config.runner.workspace.clone(),
        config.runner.cleanup,
    ));

    let (reporter, consumer) = error_queue(ERROR_QUEUE_CAPACITY);
    let consumer = tokio::spawn(consumer.run());

    let poller = JobPoller::new(
        engine,
        config.poll_interval(),
        config.runner.concurrency,
        reporter,
        config.shutdown_timeout(),
    );

    poller.run(install_shutdown_handler()).await;
    drop(poller);

    match consumer.await {
        Ok(reported) => info!("Runner stopped, {} error(s) reported", reported),
        Err(e) => warn!("Error consumer failed: {}", e),
    }

    Ok(())
}
