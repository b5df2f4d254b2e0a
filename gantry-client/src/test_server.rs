//! Minimal coordination server used by the client tests
//!
//! Every route answers with the status configured in [`Responses`] and
//! records what it received in [`Recorded`].

use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{patch, post, put},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub register_form: Option<HashMap<String, String>>,
    pub job_request: Option<serde_json::Value>,
    pub trace_headers: Vec<(String, String)>,
    pub trace_body: Vec<u8>,
    pub update: Option<(i64, serde_json::Value)>,
    pub upload_query: Option<HashMap<String, String>>,
    pub upload_file: Option<(String, Vec<u8>)>,
    pub upload_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Responses {
    pub register: (StatusCode, String),
    pub job_request: (StatusCode, String),
    pub trace: StatusCode,
    pub update: StatusCode,
    pub upload: StatusCode,
}

impl Default for Responses {
    fn default() -> Self {
        Self {
            register: (
                StatusCode::CREATED,
                r#"{"id": 7, "token": "runner-token"}"#.to_string(),
            ),
            job_request: (StatusCode::NO_CONTENT, String::new()),
            trace: StatusCode::ACCEPTED,
            update: StatusCode::OK,
            upload: StatusCode::CREATED,
        }
    }
}

#[derive(Clone)]
struct ServerState {
    responses: Arc<Responses>,
    recorded: Arc<Mutex<Recorded>>,
}

/// Starts the server on an ephemeral port
///
/// Returns the base URL and the shared record of received requests.
pub async fn start(responses: Responses) -> (String, Arc<Mutex<Recorded>>) {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let state = ServerState {
        responses: Arc::new(responses),
        recorded: Arc::clone(&recorded),
    };

    let router = Router::new()
        .route("/runners", post(register))
        .route("/jobs/request", post(job_request))
        .route("/jobs/{id}/trace", patch(trace))
        .route("/jobs/{id}", put(update))
        .route("/jobs/{id}/artifacts", post(upload))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), recorded)
}

async fn register(
    State(state): State<ServerState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, String) {
    state.recorded.lock().unwrap().register_form = Some(form);
    state.responses.register.clone()
}

async fn job_request(
    State(state): State<ServerState>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, String) {
    state.recorded.lock().unwrap().job_request = Some(body);
    state.responses.job_request.clone()
}

async fn trace(
    State(state): State<ServerState>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let mut recorded = state.recorded.lock().unwrap();
    for name in ["job-token", "content-range"] {
        if let Some(value) = headers.get(name) {
            recorded
                .trace_headers
                .push((name.to_string(), value.to_str().unwrap().to_string()));
        }
    }
    recorded.trace_body.extend_from_slice(&body);
    state.responses.trace
}

async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    state.recorded.lock().unwrap().update = Some((id, body));
    state.responses.update
}

async fn upload(
    State(state): State<ServerState>,
    Path(_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> StatusCode {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.unwrap().to_vec();
            file = Some((name, data));
        }
    }

    let mut recorded = state.recorded.lock().unwrap();
    recorded.upload_query = Some(query);
    recorded.upload_file = file;
    recorded.upload_token = headers
        .get("job-token")
        .map(|v| v.to_str().unwrap().to_string());
    state.responses.upload
}
