use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::access;
use super::admin;
use super::health;
use super::middleware::logging_middleware;
use super::state::AppState;

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // Public endpoints used by the panel
        .route("/api/validate-access-key", get(access::validate_access_key))
        .route("/api/request-activation", post(access::request_activation))
        // Admin API
        .nest("/admin", admin::create_admin_router())
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::access_key::{
        AccessKey, AccessKeyId, AccessKeyRepository, BurstCooldown, KeyStatus,
        PanelTypeRestriction,
    };
    use crate::infrastructure::access_key::{AccessKeyService, InMemoryAccessKeyRepository};
    use crate::infrastructure::notification::{LogSink, Notifier};

    fn key(id: &str) -> AccessKey {
        AccessKey::new(AccessKeyId::new(id).unwrap())
    }

    fn app(keys: Vec<AccessKey>) -> Router {
        let repository = Arc::new(InMemoryAccessKeyRepository::with_keys(keys));
        let service = AccessKeyService::new(repository, Notifier::new(Arc::new(LogSink::new())));
        create_router(AppState::new(Arc::new(service)))
    }

    async fn get_uri(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> Response {
        app.oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = app(vec![]);

        let response = get_uri(app.clone(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = get_uri(app.clone(), "/live").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_uri(app, "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_validate_allows_active_key() {
        let app = app(vec![key("good-key").with_daily_limit(10)]);

        let response = get_uri(app, "/api/validate-access-key?accessKey=good-key").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["details"]["daily_usage"], 1);
        assert_eq!(body["details"]["remaining_today"], 9);
    }

    #[tokio::test]
    async fn test_validate_missing_key_is_bad_request() {
        let response = get_uri(app(vec![]), "/api/validate-access-key").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn test_validate_unknown_key_is_unauthorized() {
        let response = get_uri(app(vec![]), "/api/validate-access-key?accessKey=nope").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["valid"], false);
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_validate_banned_key_is_forbidden() {
        let banned = key("banned-key").with_status(KeyStatus::Banned {
            reason: Some("abuse".to_string()),
            permanent: true,
            expires_at: None,
            banned_at: Utc::now(),
            banned_by: None,
        });

        let response =
            get_uri(app(vec![banned]), "/api/validate-access-key?accessKey=banned-key").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["details"]["status"], "banned");
        assert_eq!(body["details"]["permanent"], true);
    }

    #[tokio::test]
    async fn test_validate_panel_type_restriction() {
        let restricted = key("public-only").with_panel_type_restriction(PanelTypeRestriction::Public);
        let app = app(vec![restricted]);

        let response = get_uri(
            app.clone(),
            "/api/validate-access-key?accessKey=public-only&panelType=private",
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = get_uri(
            app,
            "/api/validate-access-key?accessKey=public-only&panelType=sideways",
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validate_daily_limit_is_too_many_requests() {
        let app = app(vec![key("limited").with_daily_limit(1)]);

        let first = get_uri(app.clone(), "/api/validate-access-key?accessKey=limited").await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = get_uri(app, "/api/validate-access-key?accessKey=limited").await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(!second.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_validate_burst_cooldown_sets_retry_after() {
        let now = Utc::now();
        let mut cooling = key("cooling");
        cooling.start_burst_cooldown(
            BurstCooldown {
                message: "Please slow down.".to_string(),
                started_at: now - Duration::seconds(10),
                duration_secs: 300,
            },
            now,
        );

        let repository = Arc::new(InMemoryAccessKeyRepository::with_keys(vec![cooling]));
        let service = AccessKeyService::new(repository, Notifier::new(Arc::new(LogSink::new())))
            .with_burst_guard(crate::infrastructure::access_key::BurstGuard::new(
                crate::infrastructure::access_key::BurstPolicy::enabled(),
            ));
        let app = create_router(AppState::new(Arc::new(service)));

        let response = get_uri(app, "/api/validate-access-key?accessKey=cooling").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let body = body_json(response).await;
        assert_eq!(body["message"], "Please slow down.");
    }

    #[tokio::test]
    async fn test_device_activation_flow() {
        let repository = Arc::new(InMemoryAccessKeyRepository::with_keys(vec![
            key("bound").with_device_binding(Some(2)),
        ]));
        let service = AccessKeyService::new(
            repository.clone(),
            Notifier::new(Arc::new(LogSink::new())),
        );
        let app = create_router(AppState::new(Arc::new(service)));

        let response = get_uri(
            app.clone(),
            "/api/validate-access-key?accessKey=bound&deviceId=dev-1",
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = post_json(
            app.clone(),
            "/api/request-activation",
            json!({ "accessKey": "bound", "deviceId": "dev-1" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["outcome"], "requested");

        let response = post_json(
            app.clone(),
            "/admin/access-keys/bound/devices/dev-1/authorize",
            json!({}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_uri(
            app.clone(),
            "/api/validate-access-key?accessKey=bound&deviceId=dev-1",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = repository
            .get(&AccessKeyId::new("bound").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.used_devices(), ["dev-1".to_string()]);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/admin/access-keys/bound/devices/dev-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_activation_for_unknown_key_is_not_found() {
        let response = post_json(
            app(vec![]),
            "/api/request-activation",
            json!({ "accessKey": "ghost", "deviceId": "dev-1" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_activation_missing_fields_is_bad_request() {
        let response = post_json(
            app(vec![]),
            "/api/request-activation",
            json!({ "accessKey": "ghost" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_create_and_duplicate_conflicts() {
        let app = app(vec![]);

        let response = post_json(
            app.clone(),
            "/admin/access-keys",
            json!({ "key": "fresh-key", "daily_limit": 5 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["key"], "fresh-key");
        assert_eq!(body["status"]["state"], "active");

        let response = post_json(
            app,
            "/admin/access-keys",
            json!({ "key": "fresh-key" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "conflict_error");
    }

    #[tokio::test]
    async fn test_admin_create_generates_key() {
        let response = post_json(app(vec![]), "/admin/access-keys", json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["key"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_admin_ban_and_unban() {
        let app = app(vec![key("target")]);

        let response = post_json(
            app.clone(),
            "/admin/access-keys/target/ban",
            json!({ "duration": "2d", "reason": "abuse" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"]["state"], "banned");
        assert_eq!(body["status"]["permanent"], false);

        let response = get_uri(app.clone(), "/admin/access-keys?status=banned").await;
        let body = body_json(response).await;
        assert_eq!(body["total"], 1);

        let response = post_json(app.clone(), "/admin/access-keys/target/unban", json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = post_json(app, "/admin/access-keys/target/unban", json!({})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_rejects_bad_input() {
        let app = app(vec![key("target")]);

        let response = post_json(
            app.clone(),
            "/admin/access-keys/target/ban",
            json!({ "duration": "forever-ish" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get_uri(app.clone(), "/admin/access-keys?status=sleeping").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = post_json(app.clone(), "/admin/access-keys/target/limits", json!({})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get_uri(app, "/admin/access-keys/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_suspend_blocks_validation() {
        let app = app(vec![key("target")]);

        let response = post_json(
            app.clone(),
            "/admin/access-keys/target/suspend",
            json!({ "reason": "review" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_uri(app.clone(), "/api/validate-access-key?accessKey=target").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response =
            post_json(app.clone(), "/admin/access-keys/target/unsuspend", json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_uri(app, "/api/validate-access-key?accessKey=target").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_update_limits() {
        let app = app(vec![key("target")]);

        let response = post_json(
            app,
            "/admin/access-keys/target/limits",
            json!({ "daily_limit": 3, "panel_type_restriction": "private" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["daily_limit"], 3);
        assert_eq!(body["panel_type_restriction"], "private");
    }

    #[tokio::test]
    async fn test_admin_authorize_without_request_conflicts() {
        let app = app(vec![key("bound").with_device_binding(None)]);

        let response = post_json(
            app,
            "/admin/access-keys/bound/devices/dev-9/authorize",
            json!({}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "device_not_pending");
    }
}
