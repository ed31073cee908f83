use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::auth::RequireAuth;
use super::ApiState;
use crate::gateway::{DeviceLogError, Direction, TriggerError};

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let status = match &self {
            TriggerError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            TriggerError::MissingProperty { .. } => StatusCode::BAD_REQUEST,
            TriggerError::Publish(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for DeviceLogError {
    fn into_response(self) -> Response {
        let status = match &self {
            DeviceLogError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            DeviceLogError::MissingLogProperty(_) => StatusCode::BAD_REQUEST,
            DeviceLogError::Read(_) | DeviceLogError::Publish(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Serialize)]
pub(super) struct DeviceList {
    devices: Vec<String>,
}

pub(super) async fn list_devices(
    _: RequireAuth,
    State(state): State<ApiState>,
) -> Json<DeviceList> {
    Json(DeviceList {
        devices: state.gateway.list_devices().await,
    })
}

pub(super) async fn trigger(
    _: RequireAuth,
    State(state): State<ApiState>,
    Path((device, direction)): Path<(String, String)>,
) -> Response {
    let direction: Direction = match direction.parse() {
        Ok(direction) => direction,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    match state.gateway.trigger(&device, direction).await {
        Ok(_) => (StatusCode::OK, format!("Triggered {device} {direction}")).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn read_device_log(
    _: RequireAuth,
    State(state): State<ApiState>,
    Path(device): Path<String>,
) -> Response {
    match state.gateway.read_device_log(&device).await {
        Ok(log) => log.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn clear_device_log(
    _: RequireAuth,
    State(state): State<ApiState>,
    Path(device): Path<String>,
) -> Response {
    match state.gateway.clear_device_log(&device).await {
        Ok(_) => (
            StatusCode::OK,
            format!("Cleared debug log for {device}"),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
