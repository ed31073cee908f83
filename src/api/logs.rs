use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::auth::RequireAuth;
use super::ApiState;
use crate::gateway::LocalLogError;
use crate::store::{LogFileInfo, StoreError};

/// Tail length served when the caller does not pass `?n=`.
const DEFAULT_TAIL_LINES: usize = 200;

impl IntoResponse for LocalLogError {
    fn into_response(self) -> Response {
        let status = match &self {
            LocalLogError::UnknownName(_) => StatusCode::NOT_FOUND,
            LocalLogError::Store(StoreError::UnknownDevice(_)) => StatusCode::NOT_FOUND,
            LocalLogError::Store(StoreError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Serialize)]
pub(super) struct LogList {
    items: Vec<LogFileInfo>,
}

pub(super) async fn list(
    _: RequireAuth,
    State(state): State<ApiState>,
) -> Result<Json<LogList>, LocalLogError> {
    let items = state.gateway.list_local_logs().await?;
    Ok(Json(LogList { items }))
}

pub(super) async fn append(
    _: RequireAuth,
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: String,
) -> Response {
    let lines = split_lines(&body);
    if lines.is_empty() {
        return (StatusCode::BAD_REQUEST, "No lines provided").into_response();
    }

    match state.gateway.append_local_log(&name, &lines).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn append_by_device_id(
    _: RequireAuth,
    State(state): State<ApiState>,
    Path(device_id): Path<String>,
    body: String,
) -> Response {
    let lines = split_lines(&body);
    if lines.is_empty() {
        return (StatusCode::BAD_REQUEST, "No lines provided").into_response();
    }

    match state
        .gateway
        .append_local_log_by_device_id(&device_id, &lines)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize)]
pub(super) struct TailParams {
    n: Option<usize>,
}

pub(super) async fn tail(
    _: RequireAuth,
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(params): Query<TailParams>,
) -> Result<String, LocalLogError> {
    let n = params.n.unwrap_or(DEFAULT_TAIL_LINES);
    state.gateway.tail_local_log(&name, n).await
}

pub(super) async fn clear(
    _: RequireAuth,
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, LocalLogError> {
    state.gateway.clear_local_log(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Splits an incoming plain-text body into lines, normalizing line
/// endings and dropping empty lines.
fn split_lines(body: &str) -> Vec<String> {
    body.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
