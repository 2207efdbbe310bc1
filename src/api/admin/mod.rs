//! Admin API endpoints for managing access keys and devices

pub mod access_keys;
pub mod devices;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create admin API router
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route(
            "/access-keys",
            get(access_keys::list_access_keys).post(access_keys::create_access_key),
        )
        .route(
            "/access-keys/{key}",
            get(access_keys::get_access_key).delete(access_keys::delete_access_key),
        )
        .route("/access-keys/{key}/ban", post(access_keys::ban_access_key))
        .route("/access-keys/{key}/unban", post(access_keys::unban_access_key))
        .route("/access-keys/{key}/suspend", post(access_keys::suspend_access_key))
        .route(
            "/access-keys/{key}/unsuspend",
            post(access_keys::unsuspend_access_key),
        )
        .route("/access-keys/{key}/limits", post(access_keys::update_limits))
        // Device authorization
        .route("/access-keys/{key}/devices", get(devices::list_devices))
        .route(
            "/access-keys/{key}/devices/{device_id}",
            axum::routing::delete(devices::unauthorize_device),
        )
        .route(
            "/access-keys/{key}/devices/{device_id}/authorize",
            post(devices::authorize_device),
        )
        .route(
            "/access-keys/{key}/devices/{device_id}/reject",
            post(devices::reject_device),
        )
}
