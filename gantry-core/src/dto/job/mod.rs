//! Job DTOs for runner/server communication

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobOutcome, JobState};

/// Failure reason reported for every failed job
pub const SCRIPT_FAILURE: &str = "script_failure";

/// Body of `POST /jobs/request`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub info: VersionInfo,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_update: String,
}

/// Runner build information sent along with job requests and updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub executor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shell: String,
    #[serde(default)]
    pub features: FeaturesInfo,
}

/// Feature flags advertised to the coordination server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesInfo {
    #[serde(default)]
    pub variables: bool,
    #[serde(default)]
    pub artifacts: bool,
    #[serde(default)]
    pub upload_multiple_artifacts: bool,
    #[serde(default)]
    pub artifacts_exclude: bool,
    #[serde(default)]
    pub multi_build_steps: bool,
    #[serde(default)]
    pub cancelable: bool,
    #[serde(default)]
    pub return_exit_code: bool,
}

impl FeaturesInfo {
    /// Features implemented by this runner
    pub fn supported() -> Self {
        Self {
            variables: true,
            artifacts: true,
            upload_multiple_artifacts: true,
            artifacts_exclude: true,
            multi_build_steps: true,
            cancelable: false,
            return_exit_code: true,
        }
    }
}

/// Body of `PUT /jobs/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJobRequest {
    #[serde(default)]
    pub info: VersionInfo,
    pub token: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,
    #[serde(default)]
    pub output: JobTraceOutput,
    pub exit_code: i32,
}

impl UpdateJobRequest {
    /// Builds the terminal update for an outcome
    ///
    /// Every failure is reported as `script_failure` with exit code 1.
    pub fn from_outcome(token: impl Into<String>, outcome: &JobOutcome) -> Self {
        let failure_reason = match outcome {
            JobOutcome::Succeeded => String::new(),
            JobOutcome::Failed { .. } => SCRIPT_FAILURE.to_string(),
        };

        Self {
            info: VersionInfo::default(),
            token: token.into(),
            state: outcome.state(),
            failure_reason,
            output: JobTraceOutput::default(),
            exit_code: outcome.exit_code(),
        }
    }
}

/// Trace summary attached to the terminal update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTraceOutput {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    #[serde(default)]
    pub bytesize: usize,
}
