//! Artifact upload endpoint

use crate::error::Result;
use crate::{CoordinatorClient, JOB_TOKEN_HEADER};
use gantry_core::domain::job::ArtifactOptions;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use tracing::debug;

/// Query parameters for the upload, empty options are left out
fn upload_query(options: &ArtifactOptions) -> Vec<(&'static str, &str)> {
    [
        ("expire_in", options.expire_in.as_str()),
        ("artifact_format", options.format.as_str()),
        ("artifact_type", options.artifact_type.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .collect()
}

impl CoordinatorClient {
    // =============================================================================
    // Artifacts
    // =============================================================================

    /// Upload a file as a job artifact
    ///
    /// The file is sent as the multipart field `file`; expiry, format and type
    /// travel as query parameters. Any status up to 204 is a success.
    pub async fn upload_artifact(
        &self,
        job_id: i64,
        job_token: &str,
        path: &Path,
        options: &ArtifactOptions,
    ) -> Result<()> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());

        debug!(job_id, path = %path.display(), size = contents.len(), "Uploading artifact");

        let form = Form::new().part("file", Part::bytes(contents).file_name(file_name));
        let url = format!("{}/jobs/{}/artifacts", self.base_url, job_id);

        let response = self
            .client
            .post(&url)
            .query(&upload_query(options))
            .header(JOB_TOKEN_HEADER, job_token)
            .multipart(form)
            .send()
            .await?;

        Self::ensure_status(response, 204).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use crate::test_server::{self, Responses};
    use axum::http::StatusCode;

    #[test]
    fn test_upload_query_skips_empty_options() {
        let options = ArtifactOptions {
            expire_in: "1 week".to_string(),
            format: "zip".to_string(),
            ..Default::default()
        };

        assert_eq!(
            upload_query(&options),
            vec![("expire_in", "1 week"), ("artifact_format", "zip")]
        );
    }

    #[tokio::test]
    async fn test_upload_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, b"all green").unwrap();

        let (url, recorded) = test_server::start(Responses::default()).await;
        let client = CoordinatorClient::new(url);

        let options = ArtifactOptions {
            name: "report".to_string(),
            artifact_type: "archive".to_string(),
            format: "raw".to_string(),
            expire_in: "2 days".to_string(),
        };
        client
            .upload_artifact(2, "job-token", &path, &options)
            .await
            .unwrap();

        let recorded = recorded.lock().unwrap();
        let (name, data) = recorded.upload_file.clone().unwrap();
        assert_eq!(name, "report.txt");
        assert_eq!(data, b"all green");
        assert_eq!(recorded.upload_token.as_deref(), Some("job-token"));

        let query = recorded.upload_query.clone().unwrap();
        assert_eq!(query["expire_in"], "2 days");
        assert_eq!(query["artifact_format"], "raw");
        assert_eq!(query["artifact_type"], "archive");
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = CoordinatorClient::new("http://127.0.0.1:9");

        let err = client
            .upload_artifact(2, "job-token", &dir.path().join("nope"), &ArtifactOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[tokio::test]
    async fn test_upload_bad_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, b"x").unwrap();

        let responses = Responses {
            upload: StatusCode::PAYLOAD_TOO_LARGE,
            ..Default::default()
        };
        let (url, _) = test_server::start(responses).await;
        let client = CoordinatorClient::new(url);

        let err = client
            .upload_artifact(2, "job-token", &path, &ArtifactOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ApiError { status: 413, .. }));
    }
}
