use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, RawQuery, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

/// Instant every health response reports, 2021-12-03T09:58:55.483Z.
pub const HEALTH_STAMP_MILLIS: i64 = 1638525535483;

#[derive(Deserialize)]
pub struct HealthRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub date1: String,
    pub date2: DateTime<Utc>,
    pub message: String,
    pub non_date1: String,
    pub non_date2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: u32,
    pub post_id: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct CreateComment {
    pub text: String,
}

#[derive(Deserialize)]
pub struct UpdateComment {
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Default)]
pub struct Comments {
    next_id: u32,
    items: HashMap<(String, u32), Comment>,
}

pub type Db = Arc<RwLock<Comments>>;

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Comments::default()));
    Router::new()
        .route("/api/v1/health", post(health))
        .route("/api/v1/health/echo", post(echo_query))
        .route("/api/v1/health/echo-body", post(echo_body))
        .route("/api/v1/health/error/with-code", get(error_with_code))
        .route("/api/v1/health/error/without-code", get(error_without_code))
        .route("/api/v1/health/headers", get(echo_headers))
        .route("/api/v1/health/ping", get(ping).options(ping_options))
        .route("/api/v1/health/old-ping", get(old_ping))
        .route("/post/{post_id}/comment", post(create_comment))
        .route(
            "/post/{post_id}/comment/{comment_id}",
            get(get_comment)
                .put(replace_comment)
                .patch(update_comment)
                .delete(delete_comment),
        )
        .with_state(db)
        .layer(middleware::from_fn(log_request))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    debug!(%method, %uri, status = response.status().as_u16(), "handled request");
    response
}

async fn health(Json(input): Json<HealthRequest>) -> Json<HealthResponse> {
    Json(HealthResponse {
        date1: "2021-12-03T09:58:55.483Z".to_string(),
        date2: DateTime::from_timestamp_millis(HEALTH_STAMP_MILLIS).unwrap_or_default(),
        message: format!("Hello {}!", input.name),
        non_date1: HEALTH_STAMP_MILLIS.to_string(),
        non_date2: "December 17, 1995 03:24:00".to_string(),
    })
}

/// The query string is one percent-encoded JSON document; send it back as
/// the response body.
async fn echo_query(RawQuery(query): RawQuery) -> Result<Json<serde_json::Value>, ApiError> {
    let query = query.ok_or_else(|| bad_request("MISSING_QUERY", "no query string".into()))?;
    let decoded = urlencoding::decode(&query)
        .map_err(|e| bad_request("MALFORMED_QUERY", e.to_string()))?;
    let value = serde_json::from_str(&decoded)
        .map_err(|e| bad_request("MALFORMED_QUERY", e.to_string()))?;
    Ok(Json(value))
}

async fn echo_body(headers: HeaderMap, body: String) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("text/plain"));
    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn error_with_code() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "code": "SOMETHING_WENT_WRONG" })),
    )
}

async fn error_without_code() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(serde_json::Value::Null))
}

async fn echo_headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    Json(map)
}

async fn ping() -> &'static str {
    "pong"
}

async fn ping_options() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(header::ALLOW, "GET, HEAD, OPTIONS")])
}

async fn old_ping() -> Redirect {
    Redirect::temporary("/api/v1/health/ping")
}

async fn create_comment(
    State(db): State<Db>,
    Path(post_id): Path<String>,
    Json(input): Json<CreateComment>,
) -> (StatusCode, Json<Comment>) {
    let mut comments = db.write().await;
    comments.next_id += 1;
    let comment = Comment {
        id: comments.next_id,
        post_id: post_id.clone(),
        text: input.text,
    };
    comments.items.insert((post_id, comment.id), comment.clone());
    debug!(id = comment.id, post = %comment.post_id, "comment created");
    (StatusCode::CREATED, Json(comment))
}

async fn get_comment(
    State(db): State<Db>,
    Path((post_id, comment_id)): Path<(String, u32)>,
) -> Result<Json<Comment>, ApiError> {
    let comments = db.read().await;
    comments
        .items
        .get(&(post_id, comment_id))
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(comment_id))
}

async fn replace_comment(
    State(db): State<Db>,
    Path((post_id, comment_id)): Path<(String, u32)>,
    Json(input): Json<CreateComment>,
) -> Result<Json<Comment>, ApiError> {
    let mut comments = db.write().await;
    let comment = comments
        .items
        .get_mut(&(post_id, comment_id))
        .ok_or_else(|| not_found(comment_id))?;
    comment.text = input.text;
    Ok(Json(comment.clone()))
}

async fn update_comment(
    State(db): State<Db>,
    Path((post_id, comment_id)): Path<(String, u32)>,
    Json(input): Json<UpdateComment>,
) -> Result<Json<Comment>, ApiError> {
    let mut comments = db.write().await;
    let comment = comments
        .items
        .get_mut(&(post_id, comment_id))
        .ok_or_else(|| not_found(comment_id))?;
    if let Some(text) = input.text {
        comment.text = text;
    }
    Ok(Json(comment.clone()))
}

async fn delete_comment(
    State(db): State<Db>,
    Path((post_id, comment_id)): Path<(String, u32)>,
) -> Result<StatusCode, ApiError> {
    let mut comments = db.write().await;
    comments
        .items
        .remove(&(post_id, comment_id))
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| not_found(comment_id))
}

fn bad_request(code: &str, message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            code: code.to_string(),
            message,
        }),
    )
}

fn not_found(comment_id: u32) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            code: "COMMENT_NOT_FOUND".to_string(),
            message: format!("comment {comment_id} does not exist"),
        }),
    )
}
