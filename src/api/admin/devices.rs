//! Device authorization endpoints

use axum::extract::{Path, State};
use serde::Serialize;
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::access_key::PendingDevice;

use super::access_keys::AccessKeyResponse;

#[derive(Debug, Clone, Serialize)]
pub struct DevicesResponse {
    pub key: String,
    pub used_devices: Vec<String>,
    pub pending_devices: Vec<PendingDevice>,
}

/// GET /admin/access-keys/{key}/devices
pub async fn list_devices(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DevicesResponse>, ApiError> {
    let devices = state.access_key_service.list_devices(&key).await?;

    Ok(Json(DevicesResponse {
        key,
        used_devices: devices.used,
        pending_devices: devices.pending,
    }))
}

/// POST /admin/access-keys/{key}/devices/{device_id}/authorize
pub async fn authorize_device(
    State(state): State<AppState>,
    Path((key, device_id)): Path<(String, String)>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    debug!(key = %key, device_id = %device_id, "Admin authorizing device");

    let access_key = state
        .access_key_service
        .authorize_device(&key, &device_id)
        .await?;

    Ok(Json(AccessKeyResponse::from(&access_key)))
}

/// POST /admin/access-keys/{key}/devices/{device_id}/reject
pub async fn reject_device(
    State(state): State<AppState>,
    Path((key, device_id)): Path<(String, String)>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    debug!(key = %key, device_id = %device_id, "Admin rejecting device");

    let access_key = state
        .access_key_service
        .reject_device(&key, &device_id)
        .await?;

    Ok(Json(AccessKeyResponse::from(&access_key)))
}

/// DELETE /admin/access-keys/{key}/devices/{device_id}
pub async fn unauthorize_device(
    State(state): State<AppState>,
    Path((key, device_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(key = %key, device_id = %device_id, "Admin unauthorizing device");

    if !state
        .access_key_service
        .unauthorize_device(&key, &device_id)
        .await?
    {
        return Err(ApiError::not_found(format!(
            "Device '{}' is not authorized for access key '{}'",
            device_id, key
        )));
    }

    Ok(Json(serde_json::json!({
        "unauthorized": true,
        "key": key,
        "device_id": device_id
    })))
}
