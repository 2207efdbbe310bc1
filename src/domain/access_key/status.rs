//! Access key status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an access key
///
/// Suspensions carry an optional end; bans are either permanent or time-boxed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyStatus {
    /// Key can be used
    #[default]
    Active,
    /// Key is temporarily unusable; `until = None` means until lifted by an admin
    Suspended {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<DateTime<Utc>>,
        suspended_at: DateTime<Utc>,
    },
    /// Key has been banned
    Banned {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        permanent: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
        banned_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        banned_by: Option<String>,
    },
}

impl KeyStatus {
    pub fn kind(&self) -> KeyStatusKind {
        match self {
            Self::Active => KeyStatusKind::Active,
            Self::Suspended { .. } => KeyStatusKind::Suspended,
            Self::Banned { .. } => KeyStatusKind::Banned,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether a suspension or non-permanent ban has run out at `now`
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Active => false,
            Self::Suspended { until, .. } => until.is_some_and(|until| now > until),
            Self::Banned {
                permanent,
                expires_at,
                ..
            } => !permanent && expires_at.is_some_and(|expires_at| now > expires_at),
        }
    }
}

/// Status discriminant, used for filtering and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatusKind {
    Active,
    Suspended,
    Banned,
}

impl KeyStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }
}

impl std::fmt::Display for KeyStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeyStatusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "banned" => Ok(Self::Banned),
            other => Err(format!("Unknown key status: {}", other)),
        }
    }
}
