//! Infrastructure layer - storage backends, notification sinks and services

pub mod access_key;
pub mod logging;
pub mod notification;
