//! Device authorization types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A device waiting for admin approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDevice {
    pub device_id: String,
    pub requested_at: DateTime<Utc>,
}

impl PendingDevice {
    pub fn new(device_id: impl Into<String>, requested_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            requested_at,
        }
    }
}

/// Result of asking for a device to be activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationOutcome {
    /// Newly queued for approval
    Requested,
    /// Already waiting; nothing changed
    AlreadyPending,
    /// Device is already authorized
    AlreadyAuthorized,
}

/// Why a device state transition was refused
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTransitionError {
    #[error("device is not pending")]
    NotPending,

    #[error("device limit of {0} reached")]
    LimitReached(u32),
}
