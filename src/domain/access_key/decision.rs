//! Validation outcomes

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entity::{AccessKey, PanelType, PanelTypeRestriction};

/// Outcome of validating an access key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Allowed(UsageSnapshot),
    Denied(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Allowed(_) => None,
            Self::Denied(denial) => Some(denial),
        }
    }
}

/// Counters after a successful validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub usage_count: u64,
    pub daily_usage: u32,
    pub daily_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_today: Option<u32>,
}

impl From<&AccessKey> for UsageSnapshot {
    fn from(key: &AccessKey) -> Self {
        Self {
            usage_count: key.usage_count(),
            daily_usage: key.daily_usage(),
            daily_limit: key.daily_limit(),
            remaining_today: key.remaining_today(),
        }
    }
}

/// Why a key may not be used right now
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Denial {
    NotFound,
    DeviceUnauthorized {
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
        /// The device has asked for activation and is waiting for an admin
        pending: bool,
    },
    Suspended {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// `None` means until lifted
        until: Option<DateTime<Utc>>,
    },
    Banned {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        permanent: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
    PanelTypeNotAllowed {
        restriction: PanelTypeRestriction,
        requested: PanelType,
    },
    DailyLimitReached {
        limit: u32,
    },
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },
}

/// Denial class, mapped onto transport status codes by the API layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    NotFound,
    Forbidden,
    RateLimited,
}

impl Denial {
    pub fn kind(&self) -> DenialKind {
        match self {
            Self::NotFound => DenialKind::NotFound,
            Self::DeviceUnauthorized { .. }
            | Self::Suspended { .. }
            | Self::Banned { .. }
            | Self::PanelTypeNotAllowed { .. } => DenialKind::Forbidden,
            Self::DailyLimitReached { .. } | Self::RateLimited { .. } => DenialKind::RateLimited,
        }
    }

    /// Human readable explanation for the caller
    pub fn message(&self) -> String {
        match self {
            Self::NotFound => "Access key is invalid or was not found.".to_string(),
            Self::DeviceUnauthorized { pending: true, .. } => {
                "This device is waiting for admin authorization.".to_string()
            }
            Self::DeviceUnauthorized { device_id: None, .. } => {
                "A device ID is required for this access key.".to_string()
            }
            Self::DeviceUnauthorized { .. } => {
                "This device is not authorized for the access key. Request activation first."
                    .to_string()
            }
            Self::Suspended { until: Some(until), .. } => {
                format!("Access key is suspended until {}.", until.to_rfc3339())
            }
            Self::Suspended { until: None, .. } => "Access key is suspended.".to_string(),
            Self::Banned { permanent: true, .. } => {
                "Access key has been permanently banned.".to_string()
            }
            Self::Banned { expires_at, .. } => match expires_at {
                Some(at) => format!("Access key is banned until {}.", at.to_rfc3339()),
                None => "Access key has been banned.".to_string(),
            },
            Self::PanelTypeNotAllowed { restriction, .. } => {
                format!("Access key may only create {} panels.", restriction)
            }
            Self::DailyLimitReached { limit } => {
                format!("Daily usage limit of {} reached. Try again tomorrow.", limit)
            }
            Self::RateLimited { message, .. } => message.clone(),
        }
    }
}
