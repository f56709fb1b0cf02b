use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, FromRequest, FromRequestParts, Query, Request},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{
    audit::{AuditError, AuditLog, LogPage, MAX_PAGE_LIMIT},
    auth::{ApiKey, AuthError, check_api_key},
    config::Config,
    state::{StateSnapshot, StateStore},
};

pub const API_KEY_HEADER: &str = "x-api-key";

const DEFAULT_PAGE_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct AppState {
    pub api_key: Option<ApiKey>,
    pub state: Arc<Mutex<StateStore>>,
    pub audit: AuditLog,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    message: String,
    status: StatusCode,
    details: Map<String, Value>,
}

impl ApiError {
    fn new(code: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status,
            details: Map::new(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request", StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", StatusCode::NOT_FOUND, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(
            "storage_error",
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal", StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        ApiError::unauthorized(value.to_string())
    }
}

impl From<AuditError> for ApiError {
    fn from(value: AuditError) -> Self {
        ApiError::storage(value.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    details: Map<String, Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    axum::Json<T>: FromRequest<S>,
    <axum::Json<T> as FromRequest<S>>::Rejection: std::fmt::Display,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::invalid_request(e.to_string()))?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S>,
    <Query<T> as FromRequestParts<S>>::Rejection: std::fmt::Display,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_request(e.to_string()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub counter: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    state: StateSnapshot,
    timestamp: String,
    uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
struct UpdateResponse {
    state: StateSnapshot,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

pub fn build_router(config: Config, state: Arc<Mutex<StateStore>>, audit: AuditLog) -> Router {
    let app_state = AppState {
        api_key: config.api_key(),
        state,
        audit,
        started_at: Utc::now(),
    };

    Router::new()
        .route("/status", get(get_status))
        .route("/update", post(update_state))
        .route("/logs", get(list_logs))
        .fallback(fallback_not_found)
        .layer(Extension(app_state))
}

async fn get_status(Extension(app): Extension<AppState>) -> Json<StatusResponse> {
    let snapshot = app.state.lock().await.read();
    let now = Utc::now();
    let uptime_seconds = (now - app.started_at).num_seconds().max(0);

    Json(StatusResponse {
        state: snapshot,
        timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
        uptime_seconds,
    })
}

/// Ordered: guard, validate, mutate, append, respond. The state lock is held
/// only for the read-modify-write; the audit append is a separate resource
/// and is not rolled back if it fails after the mutation (the caller gets a
/// storage_error and the in-memory state keeps the new value).
async fn update_state(
    Extension(app): Extension<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UpdateRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    check_api_key(app.api_key.as_ref(), provided)?;

    if req.counter.is_none() && req.message.is_none() {
        return Err(ApiError::invalid_request(
            "at least one of counter or message must be provided",
        ));
    }

    let (old, new) = {
        let mut store = app.state.lock().await;
        store.apply(req.counter, req.message)
    };

    let audit = app.audit.clone();
    let appended = tokio::task::spawn_blocking({
        let (old, new) = (old.clone(), new.clone());
        move || audit.append(&old, &new)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?;

    if let Err(err) = &appended {
        tracing::warn!(error = %err, "audit append failed after state mutation");
    }
    appended?;

    Ok(Json(UpdateResponse { state: new }))
}

async fn list_logs(
    Extension(app): Extension<AppState>,
    ApiQuery(query): ApiQuery<LogsQuery>,
) -> Result<Json<LogPage>, ApiError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    if page < 1 {
        return Err(ApiError::invalid_request("page must be at least 1"));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ApiError::invalid_request(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }

    let audit = app.audit.clone();
    let logs = tokio::task::spawn_blocking(move || audit.list(page, limit))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(logs))
}

async fn fallback_not_found() -> ApiError {
    ApiError::not_found("not found")
}
