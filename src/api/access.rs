//! Public endpoints used by the panel front end
//!
//! Bodies keep the `{valid, message}` / `{success, message}` shape the
//! clients expect, so failures here are not rendered as [`ApiError`].
//!
//! [`ApiError`]: crate::api::types::ApiError

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::api::state::AppState;
use crate::api::types::Json;
use crate::domain::access_key::{
    ActivationOutcome, Decision, Denial, DenialKind, PanelType, UsageSnapshot, ValidationRequest,
};
use crate::domain::DomainError;

const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQuery {
    pub access_key: Option<String>,
    pub device_id: Option<String>,
    pub panel_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ValidationDetails {
    Usage(UsageSnapshot),
    Denial(Denial),
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ValidationDetails>,
}

impl ValidateResponse {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    pub access_key: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActivationOutcome>,
}

impl ActivationResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            outcome: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn denial_status(denial: &Denial) -> StatusCode {
    match denial.kind() {
        DenialKind::NotFound => StatusCode::UNAUTHORIZED,
        DenialKind::Forbidden => StatusCode::FORBIDDEN,
        DenialKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
    }
}

fn decision_response(decision: Decision) -> Response {
    match decision {
        Decision::Allowed(usage) => (
            StatusCode::OK,
            Json(ValidateResponse {
                valid: true,
                message: "Access key is valid.".to_string(),
                details: Some(ValidationDetails::Usage(usage)),
            }),
        )
            .into_response(),
        Decision::Denied(denial) => {
            let status = denial_status(&denial);
            let retry_after = match &denial {
                Denial::RateLimited {
                    retry_after_secs, ..
                } => Some(*retry_after_secs),
                _ => None,
            };

            let body = ValidateResponse {
                valid: false,
                message: denial.message(),
                details: (denial != Denial::NotFound).then_some(ValidationDetails::Denial(denial)),
            };

            let mut response = (status, Json(body)).into_response();
            if let Some(secs) = retry_after {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            response
        }
    }
}

/// GET /api/validate-access-key?accessKey=&deviceId=&panelType=
pub async fn validate_access_key(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    let Some(access_key) = non_empty(query.access_key) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidateResponse::invalid("Access key is required.")),
        )
            .into_response();
    };

    let panel_type = match non_empty(query.panel_type)
        .map(|p| p.parse::<PanelType>())
        .transpose()
    {
        Ok(panel_type) => panel_type,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(ValidateResponse::invalid(message)))
                .into_response();
        }
    };

    let device_id = non_empty(query.device_id);
    let mut request = ValidationRequest::new();
    if let Some(device_id) = device_id.as_deref() {
        request = request.with_device(device_id);
    }
    if let Some(panel_type) = panel_type {
        request = request.with_panel_type(panel_type);
    }

    match state.access_key_service.admit(&access_key, request).await {
        Ok(decision) => {
            debug!(allowed = decision.is_allowed(), "Validation request handled");
            decision_response(decision)
        }
        Err(e) => {
            error!(error = %e, "Access key validation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValidateResponse::invalid(INTERNAL_ERROR_MESSAGE)),
            )
                .into_response()
        }
    }
}

/// POST /api/request-activation
pub async fn request_activation(
    State(state): State<AppState>,
    Json(body): Json<ActivationRequest>,
) -> Response {
    let (Some(access_key), Some(device_id)) =
        (non_empty(body.access_key), non_empty(body.device_id))
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActivationResponse::failure(
                "Access key and device ID are required.",
            )),
        )
            .into_response();
    };

    match state
        .access_key_service
        .request_activation(&access_key, &device_id)
        .await
    {
        Ok(outcome) => {
            let message = match outcome {
                ActivationOutcome::Requested => "Activation request sent to admin.",
                ActivationOutcome::AlreadyPending => "Activation request is already pending.",
                ActivationOutcome::AlreadyAuthorized => "Device is already authorized.",
            };

            (
                StatusCode::OK,
                Json(ActivationResponse {
                    success: true,
                    message: message.to_string(),
                    outcome: Some(outcome),
                }),
            )
                .into_response()
        }
        Err(DomainError::NotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(ActivationResponse::failure("Access key not found.")),
        )
            .into_response(),
        Err(DomainError::Validation { message }) => (
            StatusCode::BAD_REQUEST,
            Json(ActivationResponse::failure(message)),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Activation request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActivationResponse::failure(INTERNAL_ERROR_MESSAGE)),
            )
                .into_response()
        }
    }
}
