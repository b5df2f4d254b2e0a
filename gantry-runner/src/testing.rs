//! In-memory fakes shared by the runner tests

use async_trait::async_trait;
use gantry_client::{ClientError, Coordinator, Result as ClientResult};
use gantry_core::domain::job::{ArtifactOptions, Job, JobVariables};
use gantry_core::domain::runner::RunnerIdentity;
use gantry_core::dto::job::{JobRequest, UpdateJobRequest};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::executor::{EMPTY_OUTPUT, Executor, ExecutorError, ExecutorRegistry, SHELL};

/// Answer of the fake to one job request
#[derive(Debug, Clone)]
pub enum JobReply {
    Job(Job),
    NoJob,
    Forbidden,
    ServerError(u16),
}

#[derive(Debug, Clone)]
pub struct TraceCall {
    pub job_id: i64,
    pub token: String,
    pub start: usize,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadCall {
    pub job_id: i64,
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub options: ArtifactOptions,
}

#[derive(Default)]
struct CoordinatorState {
    replies: VecDeque<JobReply>,
    requests: Vec<JobRequest>,
    traces: Vec<TraceCall>,
    failing_traces: HashSet<usize>,
    updates: Vec<(i64, UpdateJobRequest)>,
    fail_updates: bool,
    uploads: Vec<UploadCall>,
    fail_uploads: bool,
}

/// Coordinator recording every call, answering job requests from a queue
///
/// An empty queue answers "no job".
#[derive(Clone, Default)]
pub struct FakeCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
}

impl FakeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: JobReply) -> Self {
        let fake = Self::new();
        fake.push_reply(reply);
        fake
    }

    pub fn push_reply(&self, reply: JobReply) {
        self.state.lock().unwrap().replies.push_back(reply);
    }

    /// Makes the n-th trace call (zero based) fail
    pub fn fail_trace_call(&self, index: usize) {
        self.state.lock().unwrap().failing_traces.insert(index);
    }

    pub fn fail_updates(&self) {
        self.state.lock().unwrap().fail_updates = true;
    }

    pub fn fail_uploads(&self) {
        self.state.lock().unwrap().fail_uploads = true;
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn traces(&self) -> Vec<TraceCall> {
        self.state.lock().unwrap().traces.clone()
    }

    /// Concatenation of every trace call, accepted or not
    pub fn trace_text(&self) -> String {
        let bytes: Vec<u8> = self
            .traces()
            .into_iter()
            .flat_map(|call| call.content)
            .collect();
        String::from_utf8(bytes).unwrap()
    }

    pub fn updates(&self) -> Vec<(i64, UpdateJobRequest)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn uploads(&self) -> Vec<UploadCall> {
        self.state.lock().unwrap().uploads.clone()
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn register(&self, _token: &str, _identity: &RunnerIdentity) -> ClientResult<String> {
        Ok("runner-token".to_string())
    }

    async fn request_job(&self, request: &JobRequest) -> ClientResult<Option<Job>> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        match state.replies.pop_front().unwrap_or(JobReply::NoJob) {
            JobReply::Job(job) => Ok(Some(job)),
            JobReply::NoJob => Ok(None),
            JobReply::Forbidden => Err(ClientError::Forbidden),
            JobReply::ServerError(status) => Err(ClientError::api_error(status, "some err")),
        }
    }

    async fn patch_trace(
        &self,
        job_id: i64,
        job_token: &str,
        start_offset: usize,
        content: &[u8],
    ) -> ClientResult<usize> {
        let mut state = self.state.lock().unwrap();
        let index = state.traces.len();
        state.traces.push(TraceCall {
            job_id,
            token: job_token.to_string(),
            start: start_offset,
            content: content.to_vec(),
        });

        if state.failing_traces.contains(&index) {
            return Err(ClientError::api_error(416, "range not satisfiable"));
        }
        Ok(start_offset + content.len())
    }

    async fn update_job(&self, job_id: i64, request: &UpdateJobRequest) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.updates.push((job_id, request.clone()));

        if state.fail_updates {
            return Err(ClientError::api_error(500, "some err"));
        }
        Ok(())
    }

    async fn upload_artifact(
        &self,
        job_id: i64,
        _job_token: &str,
        path: &Path,
        options: &ArtifactOptions,
    ) -> ClientResult<()> {
        let contents = std::fs::read(path)?;

        let mut state = self.state.lock().unwrap();
        state.uploads.push(UploadCall {
            job_id,
            path: path.to_path_buf(),
            contents,
            options: options.clone(),
        });

        if state.fail_uploads {
            return Err(ClientError::api_error(413, "too large"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct ExecutorState {
    commands: Vec<String>,
    working_dirs: Vec<PathBuf>,
    variables: Vec<JobVariables>,
    outputs: HashMap<String, String>,
    failures: HashMap<String, String>,
    writes: HashMap<String, Vec<(PathBuf, String)>>,
    active: usize,
    max_active: usize,
}

/// Executor answering from canned outputs
///
/// Clones share their recording, so one fake can back every executor a
/// registry hands out.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<ExecutorState>>,
    delay: Duration,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn set_output(&self, command: &str, output: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .outputs
            .insert(command.to_string(), output.to_string());
    }

    /// Makes `command` fail with a spawn error carrying `message`
    pub fn set_failure(&self, command: &str, message: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .failures
            .insert(command.to_string(), message.to_string());
    }

    /// Makes `command` write a file relative to the working directory
    pub fn set_write(&self, command: &str, path: &str, contents: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .writes
            .entry(command.to_string())
            .or_default()
            .push((PathBuf::from(path), contents.to_string()));
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn working_dirs(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().working_dirs.clone()
    }

    pub fn variables(&self) -> Vec<JobVariables> {
        self.state.lock().unwrap().variables.clone()
    }

    /// Highest number of commands observed running at once
    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    /// Registry whose `shell` backend hands out clones of this fake
    pub fn registry(&self) -> ExecutorRegistry {
        let fake = self.clone();
        let mut registry = ExecutorRegistry::new();
        registry.register(SHELL, move || Box::new(fake.clone()));
        registry
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    fn set_working_directory(&mut self, path: &Path) {
        self.state
            .lock()
            .unwrap()
            .working_dirs
            .push(path.to_path_buf());
    }

    fn set_variables(&mut self, variables: &JobVariables) {
        self.state.lock().unwrap().variables.push(variables.clone());
    }

    async fn execute(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ExecutorError> {
        {
            let mut state = self.state.lock().unwrap();
            state.commands.push(command.to_string());
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
        }

        let cancelled = if self.delay.is_zero() {
            cancel.is_cancelled()
        } else {
            tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(self.delay) => false,
            }
        };

        let mut state = self.state.lock().unwrap();
        state.active -= 1;

        if cancelled {
            return Err(ExecutorError::Cancelled);
        }
        if let Some(message) = state.failures.get(command) {
            return Err(ExecutorError::Spawn(std::io::Error::other(message.clone())));
        }
        if let (Some(writes), Some(dir)) = (state.writes.get(command), state.working_dirs.last()) {
            for (path, contents) in writes {
                let target = dir.join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, contents)?;
            }
        }
        Ok(state
            .outputs
            .get(command)
            .cloned()
            .unwrap_or_else(|| EMPTY_OUTPUT.to_string()))
    }
}
