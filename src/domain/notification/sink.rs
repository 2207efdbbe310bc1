use std::fmt::Debug;

use async_trait::async_trait;

use super::event::Notification;
use crate::domain::DomainError;

/// Delivers notifications to administrators
#[async_trait]
pub trait NotificationSink: Send + Sync + Debug {
    async fn deliver(&self, notification: &Notification) -> Result<(), DomainError>;
}
