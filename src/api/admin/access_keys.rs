//! Access key administration endpoints

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::access_key::{
    AccessKey, KeyStatus, KeyStatusKind, PanelTypeRestriction, PenaltyDuration, PendingDevice,
};
use crate::infrastructure::access_key::CreateAccessKey;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAccessKeyRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub panel_type_restriction: Option<PanelTypeRestriction>,
    #[serde(default)]
    pub daily_limit: u32,
    #[serde(default)]
    pub device_bound: bool,
    #[serde(default)]
    pub max_devices: Option<u32>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl From<CreateAccessKeyRequest> for CreateAccessKey {
    fn from(req: CreateAccessKeyRequest) -> Self {
        Self {
            key: req.key,
            panel_type_restriction: req.panel_type_restriction,
            daily_limit: req.daily_limit,
            device_bound: req.device_bound,
            max_devices: req.max_devices,
            created_by: req.created_by,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// Ban body; `duration` is `permanent` or `<n>h`, `<n>d`, `<n>w`
#[derive(Debug, Clone, Deserialize)]
pub struct BanRequest {
    #[serde(default = "default_ban_duration")]
    pub duration: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub banned_by: Option<String>,
}

fn default_ban_duration() -> String {
    "permanent".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuspendRequest {
    #[serde(default)]
    pub reason: Option<String>,
    /// Omitted means until unsuspended
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsRequest {
    #[serde(default)]
    pub daily_limit: Option<u32>,
    #[serde(default)]
    pub panel_type_restriction: Option<PanelTypeRestriction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessKeyResponse {
    pub key: String,
    pub status: KeyStatus,
    pub panel_type_restriction: PanelTypeRestriction,
    pub daily_limit: u32,
    pub daily_usage: u32,
    pub usage_count: u64,
    pub last_used_at: Option<String>,
    pub device_bound: bool,
    pub max_devices: Option<u32>,
    pub used_devices: Vec<String>,
    pub pending_devices: Vec<PendingDevice>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&AccessKey> for AccessKeyResponse {
    fn from(key: &AccessKey) -> Self {
        Self {
            key: key.key().to_string(),
            status: key.status().clone(),
            panel_type_restriction: key.panel_type_restriction(),
            daily_limit: key.daily_limit(),
            daily_usage: key.daily_usage(),
            usage_count: key.usage_count(),
            last_used_at: key.last_used_at().map(|dt| dt.to_rfc3339()),
            device_bound: key.is_device_bound(),
            max_devices: key.max_devices(),
            used_devices: key.used_devices().to_vec(),
            pending_devices: key.pending_devices().to_vec(),
            created_by: key.created_by().map(String::from),
            created_at: key.created_at().to_rfc3339(),
            updated_at: key.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListAccessKeysResponse {
    pub access_keys: Vec<AccessKeyResponse>,
    pub total: usize,
}

/// GET /admin/access-keys?status=
pub async fn list_access_keys(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListAccessKeysResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<KeyStatusKind>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e).with_param("status"))?;

    debug!(status = ?status, "Admin listing access keys");

    let keys = state.access_key_service.list(status).await?;
    let access_keys: Vec<AccessKeyResponse> = keys.iter().map(AccessKeyResponse::from).collect();
    let total = access_keys.len();

    Ok(Json(ListAccessKeysResponse { access_keys, total }))
}

/// POST /admin/access-keys
pub async fn create_access_key(
    State(state): State<AppState>,
    Json(request): Json<CreateAccessKeyRequest>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    debug!(device_bound = request.device_bound, "Admin creating access key");

    let created = state.access_key_service.create(request.into()).await?;
    Ok(Json(AccessKeyResponse::from(&created)))
}

/// GET /admin/access-keys/{key}
pub async fn get_access_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    let access_key = state.access_key_service.get(&key).await?;
    Ok(Json(AccessKeyResponse::from(&access_key)))
}

/// DELETE /admin/access-keys/{key}
pub async fn delete_access_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(key = %key, "Admin deleting access key");

    if !state.access_key_service.delete(&key).await? {
        return Err(ApiError::not_found(format!("Access key '{}' not found", key)));
    }

    Ok(Json(serde_json::json!({
        "deleted": true,
        "key": key
    })))
}

/// POST /admin/access-keys/{key}/ban
pub async fn ban_access_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<BanRequest>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    let duration = PenaltyDuration::parse(&request.duration)?;

    let banned = state
        .access_key_service
        .ban(&key, duration, request.reason, request.banned_by)
        .await?;

    Ok(Json(AccessKeyResponse::from(&banned)))
}

/// POST /admin/access-keys/{key}/unban
pub async fn unban_access_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    let access_key = state.access_key_service.unban(&key).await?;
    Ok(Json(AccessKeyResponse::from(&access_key)))
}

/// POST /admin/access-keys/{key}/suspend
pub async fn suspend_access_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<SuspendRequest>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    let duration = request
        .duration
        .as_deref()
        .map(PenaltyDuration::parse)
        .transpose()?;

    let suspended = state
        .access_key_service
        .suspend(&key, request.reason, duration)
        .await?;

    Ok(Json(AccessKeyResponse::from(&suspended)))
}

/// POST /admin/access-keys/{key}/unsuspend
pub async fn unsuspend_access_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    let access_key = state.access_key_service.unsuspend(&key).await?;
    Ok(Json(AccessKeyResponse::from(&access_key)))
}

/// POST /admin/access-keys/{key}/limits
pub async fn update_limits(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<LimitsRequest>,
) -> Result<Json<AccessKeyResponse>, ApiError> {
    if request.daily_limit.is_none() && request.panel_type_restriction.is_none() {
        return Err(ApiError::bad_request(
            "Provide daily_limit and/or panel_type_restriction",
        ));
    }

    let service = &state.access_key_service;
    let mut updated = None;

    if let Some(limit) = request.daily_limit {
        updated = Some(service.set_daily_limit(&key, limit).await?);
    }
    if let Some(restriction) = request.panel_type_restriction {
        updated = Some(service.set_panel_type_restriction(&key, restriction).await?);
    }

    let access_key = match updated {
        Some(access_key) => access_key,
        None => service.get(&key).await?,
    };

    Ok(Json(AccessKeyResponse::from(&access_key)))
}
