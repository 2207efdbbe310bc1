//! Fire-and-forget notification dispatch

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::domain::notification::{Notification, NotificationSink};

/// Hands notifications to a sink on a background task
///
/// Delivery failures are logged and never reach the caller.
#[derive(Debug, Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Dispatch `notification`; the handle is only useful to tests
    pub fn notify(&self, notification: Notification) -> JoinHandle<()> {
        let sink = self.sink.clone();

        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&notification).await {
                warn!(
                    key = %notification.key(),
                    error = %e,
                    "Failed to deliver admin notification"
                );
            }
        })
    }
}
