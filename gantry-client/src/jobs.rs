//! Job request and job update endpoints

use crate::CoordinatorClient;
use crate::error::{ClientError, Result};
use gantry_core::domain::job::Job;
use gantry_core::dto::job::{JobRequest, UpdateJobRequest};
use reqwest::StatusCode;
use tracing::debug;

impl CoordinatorClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Ask the coordination server for a pending job
    ///
    /// # Returns
    /// * `Ok(Some(job))` on 201
    /// * `Ok(None)` on 204, no job is pending
    /// * `Err(ClientError::Forbidden)` on 403, the runner is not allowed to pick jobs
    /// * `Err(ClientError::ApiError)` for any other status
    pub async fn request_job(&self, request: &JobRequest) -> Result<Option<Job>> {
        let url = format!("{}/jobs/request", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        match response.status() {
            StatusCode::CREATED => {}
            StatusCode::NO_CONTENT => {
                debug!("No job available");
                return Ok(None);
            }
            StatusCode::FORBIDDEN => return Err(ClientError::Forbidden),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                return Err(ClientError::api_error(status.as_u16(), error_text));
            }
        }

        let job = Self::parse_json(response).await?;
        Ok(Some(job))
    }

    /// Report the terminal state of a job
    ///
    /// Any status up to 202 is a success.
    pub async fn update_job(&self, job_id: i64, request: &UpdateJobRequest) -> Result<()> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self.client.put(&url).json(request).send().await?;

        Self::ensure_status(response, 202).await?;
        Ok(())
    }
}
