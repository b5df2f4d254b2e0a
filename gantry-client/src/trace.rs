//! Incremental job trace endpoint

use crate::error::{ClientError, Result};
use crate::{CoordinatorClient, JOB_TOKEN_HEADER};
use reqwest::StatusCode;
use reqwest::header::CONTENT_RANGE;

/// Inclusive byte range covered by an append, `start-end`
pub(crate) fn content_range(start_offset: usize, len: usize) -> String {
    format!("{}-{}", start_offset, start_offset + len - 1)
}

impl CoordinatorClient {
    // =============================================================================
    // Job Trace
    // =============================================================================

    /// Append bytes to a job trace
    ///
    /// The server only accepts contiguous ranges, so `start_offset` must be
    /// the offset returned by the previous append. Only 202 is a success.
    ///
    /// # Returns
    /// `start_offset + content.len()`, the start of the next append.
    /// An empty `content` is not sent and returns `start_offset` unchanged.
    pub async fn patch_trace(
        &self,
        job_id: i64,
        job_token: &str,
        start_offset: usize,
        content: &[u8],
    ) -> Result<usize> {
        if content.is_empty() {
            return Ok(start_offset);
        }

        let url = format!("{}/jobs/{}/trace", self.base_url, job_id);
        let response = self
            .client
            .patch(&url)
            .header(JOB_TOKEN_HEADER, job_token)
            .header(CONTENT_RANGE, content_range(start_offset, content.len()))
            .body(content.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(start_offset + content.len())
    }
}
