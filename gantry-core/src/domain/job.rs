//! Job domain types

use serde::{Deserialize, Serialize};

/// Job payload handed out by the coordination server
///
/// Created by a successful job request and never mutated afterwards; the
/// lifecycle run only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// Job-scoped token, sent as `JOB-TOKEN` on trace and artifact calls
    pub token: String,
    #[serde(default)]
    pub allow_git_fetch: bool,
    #[serde(default)]
    pub variables: JobVariables,
    #[serde(default)]
    pub git_info: GitInfo,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// A named group of shell command lines executed in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub script: Vec<String>,
    /// Seconds allowed for all scripts of the step, 0 means unbounded
    #[serde(default)]
    pub timeout: u64,
    /// Not evaluated by the runner, steps always run
    #[serde(default)]
    pub when: String,
    /// Parsed but not evaluated, the first failing script fails the job
    #[serde(default)]
    pub allow_failure: bool,
}

/// Artifact declaration: which files to collect after the steps ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub untracked: bool,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub when: String,
    #[serde(flatten)]
    pub options: ArtifactOptions,
}

impl Artifact {
    /// Whether this declaration applies to a job whose steps all succeeded
    ///
    /// An empty `when` behaves like `on_success`.
    pub fn uploads_on_success(&self) -> bool {
        matches!(self.when.as_str(), "" | "on_success" | "always")
    }
}

/// Upload options forwarded as query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOptions {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artifact_type: String,
    #[serde(default, rename = "artifact_format")]
    pub format: String,
    #[serde(default)]
    pub expire_in: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    #[serde(default)]
    pub repo_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobVariable {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub masked: bool,
}

/// Ordered list of job variables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobVariables(pub Vec<JobVariable>);

impl JobVariables {
    /// Finds the value of the first variable with the given key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|var| var.key == key)
            .map(|var| var.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobVariable> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Terminal state of a job, reported exactly once per job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed { reason: String },
}

impl JobOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        JobOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }

    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded => JobState::Success,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            JobOutcome::Succeeded => 0,
            JobOutcome::Failed { .. } => 1,
        }
    }
}

/// Job state as understood by the coordination server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Success,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Success => write!(f, "success"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB_RESPONSE: &str = r#"{
        "id": 42,
        "token": "job-token",
        "allow_git_fetch": true,
        "variables": [
            {"key": "CI_JOB_ID", "value": "42", "public": true, "masked": false},
            {"key": "SECRET", "value": "hunter2", "public": false, "masked": true}
        ],
        "git_info": {"repo_url": "https://example.com/group/project.git", "ref": "main"},
        "steps": [
            {"name": "script", "script": ["make", "make test"], "timeout": 3600, "when": "on_success", "allow_failure": false}
        ],
        "artifacts": [
            {"untracked": false, "paths": ["target/*.tar.gz"], "exclude": ["target/tmp*"], "when": "on_success",
             "name": "bundle", "artifact_type": "archive", "artifact_format": "zip", "expire_in": "1 week"}
        ],
        "image": null
    }"#;

    #[test]
    fn test_deserialize_job_response() {
        let job: Job = serde_json::from_str(JOB_RESPONSE).unwrap();

        assert_eq!(job.id, 42);
        assert_eq!(job.token, "job-token");
        assert!(job.allow_git_fetch);
        assert_eq!(
            job.git_info.repo_url,
            "https://example.com/group/project.git"
        );
        assert_eq!(job.steps.len(), 1);
        assert_eq!(job.steps[0].script, vec!["make", "make test"]);
        assert_eq!(job.steps[0].timeout, 3600);

        let artifact = &job.artifacts[0];
        assert_eq!(artifact.paths, vec!["target/*.tar.gz"]);
        assert_eq!(artifact.exclude, vec!["target/tmp*"]);
        assert_eq!(artifact.options.name, "bundle");
        assert_eq!(artifact.options.artifact_type, "archive");
        assert_eq!(artifact.options.format, "zip");
        assert_eq!(artifact.options.expire_in, "1 week");
    }

    #[test]
    fn test_minimal_job_defaults() {
        let job: Job = serde_json::from_str(r#"{"id": 1, "token": "t"}"#).unwrap();
        assert!(job.steps.is_empty());
        assert!(job.artifacts.is_empty());
        assert!(job.git_info.repo_url.is_empty());
        assert!(job.variables.is_empty());
    }

    #[test]
    fn test_job_variables_get() {
        let job: Job = serde_json::from_str(JOB_RESPONSE).unwrap();
        assert_eq!(job.variables.get("SECRET"), Some("hunter2"));
        assert_eq!(job.variables.get("MISSING"), None);
    }

    #[test]
    fn test_artifact_when() {
        let mut artifact = Artifact::default();
        assert!(artifact.uploads_on_success());

        artifact.when = "always".to_string();
        assert!(artifact.uploads_on_success());

        artifact.when = "on_failure".to_string();
        assert!(!artifact.uploads_on_success());
    }

    #[test]
    fn test_outcome_state_and_exit_code() {
        assert_eq!(JobOutcome::Succeeded.state(), JobState::Success);
        assert_eq!(JobOutcome::Succeeded.exit_code(), 0);

        let failed = JobOutcome::failed("boom");
        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(failed.exit_code(), 1);
        assert!(!failed.is_success());
    }
}
