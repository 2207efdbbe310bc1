//! Access Key Gate
//!
//! Validates caller-supplied access keys before panel provisioning:
//! - Status lifecycle (active, suspended, banned) with time-boxed penalties
//! - Daily usage limits and panel type restrictions
//! - Device binding with admin approval over Telegram
//! - Optional randomized burst guard

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use config::StorageBackend;
use domain::access_key::AccessKeyRepository;
use domain::notification::NotificationSink;
use domain::DomainError;
use infrastructure::access_key::{
    AccessKeyService, BurstGuard, InMemoryAccessKeyRepository, PostgresAccessKeyRepository,
    PostgresConfig,
};
use infrastructure::notification::{LogSink, Notifier, TelegramConfig, TelegramSink};
use tracing::info;

/// Create the application state from configuration
pub async fn create_app_state(config: &AppConfig) -> Result<AppState, DomainError> {
    let repository = create_repository(config).await?;
    let sink = create_notification_sink(config)?;

    let burst_guard = BurstGuard::new(config.burst_guard.clone());
    if burst_guard.is_enabled() {
        info!(
            threshold = config.burst_guard.threshold,
            window_secs = config.burst_guard.window_secs,
            "Burst guard enabled"
        );
    }

    let service = AccessKeyService::new(repository, Notifier::new(sink))
        .with_burst_guard(burst_guard);

    Ok(AppState::new(Arc::new(service)))
}

async fn create_repository(
    config: &AppConfig,
) -> Result<Arc<dyn AccessKeyRepository>, DomainError> {
    info!("Storage backend: {:?}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryAccessKeyRepository::new())),
        StorageBackend::Postgres => {
            let url = config.storage.database_url.as_deref().ok_or_else(|| {
                DomainError::configuration("storage.database_url is required for postgres")
            })?;

            info!("Connecting to PostgreSQL...");
            let pg_config =
                PostgresConfig::new(url).with_max_connections(config.storage.max_connections);
            let repository = PostgresAccessKeyRepository::connect(&pg_config).await?;
            info!("PostgreSQL connection established");

            Ok(Arc::new(repository))
        }
    }
}

fn create_notification_sink(config: &AppConfig) -> Result<Arc<dyn NotificationSink>, DomainError> {
    let telegram = &config.telegram;

    match telegram.bot_token.as_deref() {
        Some(token) if telegram.is_configured() => {
            info!(chats = telegram.admin_chat_ids.len(), "Telegram notifications enabled");
            let sink = TelegramSink::new(
                TelegramConfig::new(token, telegram.admin_chat_ids.clone())
                    .with_api_base(telegram.api_base.clone()),
            )?;
            Ok(Arc::new(sink))
        }
        _ => {
            info!("Telegram not configured, admin notifications will only be logged");
            Ok(Arc::new(LogSink::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_uses_memory_store() {
        let state = create_app_state(&AppConfig::default()).await.unwrap();

        assert!(state.access_key_service.repository().ping().await.is_ok());
        assert!(state.access_key_service.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_postgres_without_url_is_configuration_error() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Postgres;

        let result = create_app_state(&config).await;
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_telegram_settings_select_telegram_sink() {
        let mut config = AppConfig::default();
        config.telegram.bot_token = Some("123:abc".to_string());
        config.telegram.admin_chat_ids = vec!["100".to_string()];

        assert!(create_app_state(&config).await.is_ok());
    }
}
