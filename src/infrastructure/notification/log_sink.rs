use async_trait::async_trait;
use tracing::info;

use crate::domain::notification::{Notification, NotificationSink};
use crate::domain::DomainError;

/// Sink that only writes notifications to the log, used when no bot is configured
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DomainError> {
        info!(
            key = %notification.key(),
            audience = ?notification.audience(),
            text = %notification.render_html(),
            "Admin notification"
        );
        Ok(())
    }
}
