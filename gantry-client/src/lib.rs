//! Gantry HTTP Client
//!
//! Typed bindings for the five coordination server operations a runner needs:
//! register, request job, patch trace, update job and upload artifact.
//!
//! Every call is a single request with no built-in retry; a failed attempt is
//! returned to the caller as a [`ClientError`].
//!
//! # Example
//!
//! ```no_run
//! use gantry_client::{Coordinator, CoordinatorClient};
//! use gantry_core::dto::job::JobRequest;
//!
//! #[tokio::main]
//! async fn main() -> gantry_client::Result<()> {
//!     let client = CoordinatorClient::new("https://gitlab.example.com/api/v4");
//!
//!     let request = JobRequest {
//!         token: "runner-token".to_string(),
//!         ..Default::default()
//!     };
//!
//!     match client.request_job(&request).await? {
//!         Some(job) => println!("Got job {}", job.id),
//!         None => println!("No job available"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod artifacts;
mod jobs;
mod runners;
mod trace;

#[cfg(test)]
mod test_server;

// Re-export commonly used types
pub use error::{ClientError, Result};

use async_trait::async_trait;
use gantry_core::domain::job::{ArtifactOptions, Job};
use gantry_core::domain::runner::RunnerIdentity;
use gantry_core::dto::job::{JobRequest, UpdateJobRequest};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Header carrying the job-scoped token
pub const JOB_TOKEN_HEADER: &str = "JOB-TOKEN";

/// The coordination server operations used by the runner
///
/// Implemented over HTTP by [`CoordinatorClient`]; the lifecycle engine only
/// depends on this trait so tests can substitute an in-memory fake.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Registers a runner with a registration token, returning the runner token
    async fn register(&self, token: &str, identity: &RunnerIdentity) -> Result<String>;

    /// Asks for a pending job; `Ok(None)` means no job is available
    async fn request_job(&self, request: &JobRequest) -> Result<Option<Job>>;

    /// Appends `content` to the job trace at `start_offset`
    ///
    /// Returns the offset the next append must start at.
    async fn patch_trace(
        &self,
        job_id: i64,
        job_token: &str,
        start_offset: usize,
        content: &[u8],
    ) -> Result<usize>;

    /// Reports the terminal state of a job
    async fn update_job(&self, job_id: i64, request: &UpdateJobRequest) -> Result<()>;

    /// Uploads one file as a job artifact
    async fn upload_artifact(
        &self,
        job_id: i64,
        job_token: &str,
        path: &Path,
        options: &ArtifactOptions,
    ) -> Result<()>;
}

/// HTTP client for the coordination server API
///
/// Stateless apart from the connection pool held by the inner reqwest client.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    /// Base URL of the API (e.g., "https://gitlab.com/api/v4")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl CoordinatorClient {
    /// Create a new coordination client
    ///
    /// # Example
    /// ```
    /// use gantry_client::CoordinatorClient;
    ///
    /// let client = CoordinatorClient::new("https://gitlab.com/api/v4/");
    /// assert_eq!(client.base_url(), "https://gitlab.com/api/v4");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new coordination client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use gantry_client::CoordinatorClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = CoordinatorClient::with_client("https://gitlab.com/api/v4", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the coordination API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Fail with an API error unless the status code is at most `max_status`
    async fn ensure_status(
        response: reqwest::Response,
        max_status: u16,
    ) -> Result<reqwest::Response> {
        let status = response.status();

        if status.as_u16() > max_status {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Deserialize a JSON response body
    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let bytes = response.bytes().await?;

        serde_json::from_slice(&bytes).map_err(|e| ClientError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl Coordinator for CoordinatorClient {
    async fn register(&self, token: &str, identity: &RunnerIdentity) -> Result<String> {
        self.register_runner(token, identity).await
    }

    async fn request_job(&self, request: &JobRequest) -> Result<Option<Job>> {
        self.request_job(request).await
    }

    async fn patch_trace(
        &self,
        job_id: i64,
        job_token: &str,
        start_offset: usize,
        content: &[u8],
    ) -> Result<usize> {
        self.patch_trace(job_id, job_token, start_offset, content)
            .await
    }

    async fn update_job(&self, job_id: i64, request: &UpdateJobRequest) -> Result<()> {
        self.update_job(job_id, request).await
    }

    async fn upload_artifact(
        &self,
        job_id: i64,
        job_token: &str,
        path: &Path,
        options: &ArtifactOptions,
    ) -> Result<()> {
        self.upload_artifact(job_id, job_token, path, options).await
    }
}
