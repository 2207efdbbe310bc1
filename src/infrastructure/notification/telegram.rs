//! Telegram Bot API notification sink

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::notification::{Audience, Notification, NotificationAction, NotificationSink};
use crate::domain::DomainError;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot credentials and recipients
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Admin chats; the first one receives activation requests
    pub admin_chat_ids: Vec<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, admin_chat_ids: Vec<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            admin_chat_ids,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: 10,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

fn keyboard(actions: &[NotificationAction]) -> Option<InlineKeyboardMarkup<'_>> {
    if actions.is_empty() {
        return None;
    }

    let row = actions
        .iter()
        .map(|action| InlineKeyboardButton {
            text: &action.label,
            callback_data: &action.callback_data,
        })
        .collect();

    Some(InlineKeyboardMarkup {
        inline_keyboard: vec![row],
    })
}

/// Sends notifications to admin chats through `sendMessage`
#[derive(Debug, Clone)]
pub struct TelegramSink {
    client: Client,
    config: TelegramConfig,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig) -> Result<Self, DomainError> {
        if config.bot_token.trim().is_empty() {
            return Err(DomainError::configuration("Telegram bot token is empty"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    fn recipients(&self, audience: Audience) -> &[String] {
        match audience {
            Audience::PrimaryAdmin => self.config.admin_chat_ids.get(..1).unwrap_or(&[]),
            Audience::AllAdmins => &self.config.admin_chat_ids,
        }
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        actions: &[NotificationAction],
    ) -> Result<(), DomainError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );

        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            reply_markup: keyboard(actions),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // Strip the URL, it carries the bot token
                DomainError::notification(format!(
                    "Telegram request failed: {}",
                    e.without_url()
                ))
            })?;

        let status = response.status();
        let parsed: TelegramResponse = response.json().await.map_err(|e| {
            DomainError::notification(format!(
                "Invalid Telegram response (HTTP {}): {}",
                status,
                e.without_url()
            ))
        })?;

        if !parsed.ok {
            return Err(DomainError::notification(format!(
                "Telegram rejected message to chat {}: {}",
                chat_id,
                parsed.description.unwrap_or_else(|| status.to_string())
            )));
        }

        debug!(chat_id = %chat_id, "Telegram message sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DomainError> {
        let recipients = self.recipients(notification.audience());
        if recipients.is_empty() {
            return Err(DomainError::configuration("No Telegram admin chats configured"));
        }

        let text = notification.render_html();
        let actions = notification.actions();

        let mut failures = Vec::new();
        for chat_id in recipients {
            if let Err(e) = self.send_message(chat_id, &text, &actions).await {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DomainError::notification(failures.join("; ")))
        }
    }
}
