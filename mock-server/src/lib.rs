//! In-memory stand-in for the Sift REST API.
//!
//! Serves the events, score and labels endpoints under any `/v<N>/`
//! prefix, checks the API key the same way the real service does, and
//! records every request it sees. Tests can queue scripted responses to
//! force edge cases (304, non-JSON bodies, slow replies).

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const DEFAULT_API_KEY: &str = "test-api-key";

/// Score handed to users that have events but no explicit score.
pub const DEFAULT_SCORE: f64 = 0.5;

const INVALID_API_KEY: (i64, &str) = (51, "Invalid API Key. Please check your credentials and try again.");
const NO_SCOREABLE_EVENTS: (i64, &str) = (54, "Specified user_id has no scoreable events");
const MISSING_FIELD: (i64, &str) = (55, "Missing required field");
const INVALID_JSON: (i64, &str) = (56, "Invalid JSON in request");
const INVALID_VERSION: (i64, &str) = (104, "Invalid API version");

/// A request as the server received it.
#[derive(Clone, Debug, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// A canned reply returned instead of the normal handler.
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
    pub delay: Option<Duration>,
}

impl ScriptedResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: None,
        }
    }

    #[must_use]
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl IntoResponse for ScriptedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, "application/json")], self.body).into_response()
    }
}

#[derive(Default)]
struct Inner {
    requests: Vec<RecordedRequest>,
    scripted: VecDeque<ScriptedResponse>,
    labels: HashMap<String, Value>,
    scores: HashMap<String, f64>,
}

/// Shared server state. Cloning yields another handle to the same state,
/// so tests keep one and pass one to `app`.
#[derive(Clone)]
pub struct MockState {
    api_key: Arc<str>,
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new(DEFAULT_API_KEY)
    }
}

impl MockState {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: Arc::from(api_key),
            inner: Arc::default(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Queue a reply for the next request, whatever its route.
    pub fn push_response(&self, response: ScriptedResponse) {
        self.lock().scripted.push_back(response);
    }

    pub fn set_score(&self, user_id: &str, score: f64) {
        self.lock().scores.insert(user_id.to_string(), score);
    }

    /// The label currently stored for `user_id`.
    pub fn label(&self, user_id: &str) -> Option<Value> {
        self.lock().labels.get(user_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn app(state: MockState) -> Router {
    Router::new()
        .route("/{version}/events", post(track_event))
        .route("/{version}/score/{user_id}", get(get_score))
        .route(
            "/{version}/users/{user_id}/labels",
            post(label_user).delete(unlabel_user),
        )
        .layer(middleware::from_fn_with_state(state.clone(), record_and_script))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

/// Record the request, then either answer with the next scripted response
/// or hand the request on to the router.
async fn record_and_script(State(state): State<MockState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let recorded = RecordedRequest {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    };
    tracing::info!(method = %recorded.method, path = %recorded.path, "request");

    let scripted = {
        let mut inner = state.lock();
        inner.requests.push(recorded);
        inner.scripted.pop_front()
    };
    if let Some(scripted) = scripted {
        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }
        return scripted.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

type ApiReply = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, (code, message): (i64, &str)) -> ApiReply {
    (status, Json(json!({"status": code, "error_message": message})))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn check_version(version: &str) -> Result<(), ApiReply> {
    match version.strip_prefix('v').map(str::parse::<u32>) {
        Some(Ok(_)) => Ok(()),
        _ => Err(api_error(StatusCode::NOT_FOUND, INVALID_VERSION)),
    }
}

/// Parse a JSON object body and check its `$api_key`.
fn authenticated_body(state: &MockState, body: &Bytes) -> Result<serde_json::Map<String, Value>, ApiReply> {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return Err(api_error(StatusCode::BAD_REQUEST, INVALID_JSON));
    };
    if fields.get("$api_key").and_then(Value::as_str) != Some(state.api_key()) {
        return Err(api_error(StatusCode::BAD_REQUEST, INVALID_API_KEY));
    }
    Ok(fields)
}

fn check_query_key(state: &MockState, query: &HashMap<String, String>) -> Result<(), ApiReply> {
    if query.get("api_key").map(String::as_str) != Some(state.api_key()) {
        return Err(api_error(StatusCode::BAD_REQUEST, INVALID_API_KEY));
    }
    Ok(())
}

async fn track_event(
    State(state): State<MockState>,
    Path(version): Path<String>,
    body: Bytes,
) -> Result<ApiReply, ApiReply> {
    check_version(&version)?;
    let fields = authenticated_body(&state, &body)?;
    if fields.get("$type").and_then(Value::as_str).is_none() {
        return Err(api_error(StatusCode::BAD_REQUEST, MISSING_FIELD));
    }

    let user_id = fields
        .get("$user_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let score = user_id.as_ref().map(|user| {
        *state
            .lock()
            .scores
            .entry(user.clone())
            .or_insert(DEFAULT_SCORE)
    });

    let mut reply = json!({
        "status": 0,
        "error_message": "OK",
        "time": now(),
        "request": String::from_utf8_lossy(&body),
    });
    if fields.get("return_score") == Some(&Value::Bool(true)) {
        reply["user_id"] = json!(user_id.unwrap_or_default());
        reply["score"] = json!(score.unwrap_or_default());
    }
    if fields.get("return_action") == Some(&Value::Bool(true)) {
        reply["actions"] = json!([]);
    }
    Ok((StatusCode::OK, Json(reply)))
}

async fn get_score(
    State(state): State<MockState>,
    Path((version, user_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<ApiReply, ApiReply> {
    check_version(&version)?;
    check_query_key(&state, &query)?;

    let inner = state.lock();
    let Some(score) = inner.scores.get(&user_id).copied() else {
        return Err(api_error(StatusCode::BAD_REQUEST, NO_SCOREABLE_EVENTS));
    };
    let mut reply = json!({
        "status": 0,
        "error_message": "OK",
        "user_id": user_id,
        "score": score,
        "reasons": [{"name": "UsersPerDevice", "value": 1, "details": {"users": user_id}}],
    });
    if let Some(label) = inner.labels.get(&user_id) {
        reply["latest_label"] = label.clone();
    }
    Ok((StatusCode::OK, Json(reply)))
}

async fn label_user(
    State(state): State<MockState>,
    Path((version, user_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<ApiReply, ApiReply> {
    check_version(&version)?;
    let fields = authenticated_body(&state, &body)?;
    let Some(is_bad) = fields.get("$is_bad").and_then(Value::as_bool) else {
        return Err(api_error(StatusCode::BAD_REQUEST, MISSING_FIELD));
    };

    let time = now();
    let label = json!({
        "is_bad": is_bad,
        "time": time,
        "reasons": fields.get("$reasons").cloned().unwrap_or_else(|| json!([])),
        "description": fields.get("$description").cloned().unwrap_or_else(|| json!("")),
    });
    state.lock().labels.insert(user_id, label);

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": 0,
            "error_message": "OK",
            "time": time,
            "request": String::from_utf8_lossy(&body),
        })),
    ))
}

async fn unlabel_user(
    State(state): State<MockState>,
    Path((version, user_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<StatusCode, ApiReply> {
    check_version(&version)?;
    check_query_key(&state, &query)?;
    state.lock().labels.remove(&user_id);
    Ok(StatusCode::NO_CONTENT)
}
