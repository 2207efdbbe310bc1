use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::format::escape_html;

/// Telegram rejects inline buttons whose `callback_data` exceeds 64 bytes
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

/// Something administrators should hear about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    ActivationRequested {
        key: String,
        device_id: String,
    },
    DeviceAuthorized {
        key: String,
        device_id: String,
    },
    DeviceRejected {
        key: String,
        device_id: String,
    },
    KeyBanned {
        key: String,
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },
    KeySuspended {
        key: String,
        reason: Option<String>,
        until: Option<DateTime<Utc>>,
    },
}

/// Who receives a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The first configured admin chat
    PrimaryAdmin,
    /// Every configured admin chat
    AllAdmins,
}

/// Inline button attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub label: String,
    pub callback_data: String,
}

impl Notification {
    pub fn audience(&self) -> Audience {
        match self {
            Self::ActivationRequested { .. } => Audience::PrimaryAdmin,
            _ => Audience::AllAdmins,
        }
    }

    /// Key the event is about
    pub fn key(&self) -> &str {
        match self {
            Self::ActivationRequested { key, .. }
            | Self::DeviceAuthorized { key, .. }
            | Self::DeviceRejected { key, .. }
            | Self::KeyBanned { key, .. }
            | Self::KeySuspended { key, .. } => key,
        }
    }

    /// Approve / reject buttons for activation requests
    ///
    /// Left out when the callback data would not fit; the message text then
    /// points at the admin endpoints instead.
    pub fn actions(&self) -> Vec<NotificationAction> {
        match self {
            Self::ActivationRequested { key, device_id } => {
                if !buttons_fit(key, device_id) {
                    warn!(
                        key = %key,
                        device_id_len = device_id.len(),
                        "Activation buttons dropped: callback data exceeds {} bytes",
                        MAX_CALLBACK_DATA_BYTES
                    );
                    return Vec::new();
                }

                vec![
                    NotificationAction {
                        label: "✅ Authorize".to_string(),
                        callback_data: authorize_data(key, device_id),
                    },
                    NotificationAction {
                        label: "❌ Reject".to_string(),
                        callback_data: reject_data(key, device_id),
                    },
                ]
            }
            _ => Vec::new(),
        }
    }

    /// Message body in Telegram HTML
    pub fn render_html(&self) -> String {
        match self {
            Self::ActivationRequested { key, device_id } => {
                let mut text = format!(
                    "<b>New device authorization request</b>\n🔑 Access key: <code>{}</code>\n🖥️ Device ID: <code>{}</code>\n\nAuthorize or reject this device.",
                    escape_html(key),
                    escape_html(device_id)
                );
                if !buttons_fit(key, device_id) {
                    text.push_str(&format!(
                        "\nUse <code>POST /admin/access-keys/{}/devices/{}/authorize</code> or <code>.../reject</code>.",
                        escape_html(key),
                        escape_html(device_id)
                    ));
                }
                text
            }
            Self::DeviceAuthorized { key, device_id } => format!(
                "✅ Device <code>{}</code> authorized for access key <code>{}</code>.",
                escape_html(device_id),
                escape_html(key)
            ),
            Self::DeviceRejected { key, device_id } => format!(
                "❌ Device <code>{}</code> rejected for access key <code>{}</code>.",
                escape_html(device_id),
                escape_html(key)
            ),
            Self::KeyBanned {
                key,
                reason,
                expires_at,
            } => format!(
                "🚫 Access key <code>{}</code> banned.\nReason: {}\nUntil: {}",
                escape_html(key),
                escape_html(reason.as_deref().unwrap_or("No reason given.")),
                expires_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "Permanent".to_string())
            ),
            Self::KeySuspended { key, reason, until } => format!(
                "⏸️ Access key <code>{}</code> suspended.\nReason: {}\nUntil: {}",
                escape_html(key),
                escape_html(reason.as_deref().unwrap_or("No reason given.")),
                until
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "Lifted by an admin".to_string())
            ),
        }
    }
}

fn authorize_data(key: &str, device_id: &str) -> String {
    format!("authorize_device_{}_{}", key, device_id)
}

fn reject_data(key: &str, device_id: &str) -> String {
    format!("reject_device_{}_{}", key, device_id)
}

// "authorize_device_" is the longer prefix
fn buttons_fit(key: &str, device_id: &str) -> bool {
    authorize_data(key, device_id).len() <= MAX_CALLBACK_DATA_BYTES
}
