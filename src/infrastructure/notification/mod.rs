//! Notification sinks and dispatch

mod log_sink;
mod notifier;
mod telegram;

pub use log_sink::LogSink;
pub use notifier::Notifier;
pub use telegram::{TelegramConfig, TelegramSink, DEFAULT_API_BASE};
