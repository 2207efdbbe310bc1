//! Access key entity and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::device::{DeviceTransitionError, PendingDevice};
use super::status::KeyStatus;
use super::validation::{validate_access_key_id, AccessKeyValidationError};

/// Number of recent usage instants kept for burst detection
pub const USAGE_HISTORY_LIMIT: usize = 20;

/// Access key identifier, the credential value itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKeyId(String);

impl AccessKeyId {
    /// Create a new AccessKeyId after validation
    pub fn new(key: impl Into<String>) -> Result<Self, AccessKeyValidationError> {
        let key = key.into();
        validate_access_key_id(&key)?;
        Ok(Self(key))
    }

    /// Wrap a value produced by the key generator (always lowercase hex)
    pub(crate) fn from_trusted(key: String) -> Self {
        debug_assert!(validate_access_key_id(&key).is_ok());
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccessKeyId {
    type Error = AccessKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccessKeyId> for String {
    fn from(id: AccessKeyId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AccessKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of panel a caller wants to provision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelType {
    Public,
    Private,
}

impl std::str::FromStr for PanelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!("Unknown panel type: {}", other)),
        }
    }
}

impl std::fmt::Display for PanelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Which panel types a key may provision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PanelTypeRestriction {
    Public,
    Private,
    #[default]
    Both,
}

impl PanelTypeRestriction {
    pub fn allows(&self, panel_type: PanelType) -> bool {
        match self {
            Self::Both => true,
            Self::Public => panel_type == PanelType::Public,
            Self::Private => panel_type == PanelType::Private,
        }
    }
}

impl std::str::FromStr for PanelTypeRestriction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "both" => Ok(Self::Both),
            other => Err(format!("Unknown panel type restriction: {}", other)),
        }
    }
}

impl std::fmt::Display for PanelTypeRestriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
            Self::Both => f.write_str("both"),
        }
    }
}

/// Rejection window recorded by the burst guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstCooldown {
    /// Message replayed to every request inside the window
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
}

impl BurstCooldown {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(self.duration_secs as i64)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.ends_at()
    }

    /// Whole seconds left in the window, at least 1 while active
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        let left = (self.ends_at() - now).num_seconds();
        left.max(1) as u64
    }
}

/// Access key entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKey {
    key: AccessKeyId,
    #[serde(default)]
    status: KeyStatus,
    #[serde(default)]
    panel_type_restriction: PanelTypeRestriction,
    /// 0 = unlimited
    #[serde(default)]
    daily_limit: u32,
    #[serde(default)]
    daily_usage: u32,
    #[serde(default)]
    usage_count: u64,
    /// Most recent successful uses, oldest first
    #[serde(default)]
    usage_timestamps: Vec<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
    /// Whether validation requires an authorized device
    #[serde(default)]
    device_bound: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_devices: Option<u32>,
    #[serde(default)]
    used_devices: Vec<String>,
    #[serde(default)]
    pending_devices: Vec<PendingDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    burst_cooldown: Option<BurstCooldown>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
}

impl AccessKey {
    /// Create a new active access key with no limits
    pub fn new(key: AccessKeyId) -> Self {
        let now = Utc::now();

        Self {
            key,
            status: KeyStatus::Active,
            panel_type_restriction: PanelTypeRestriction::Both,
            daily_limit: 0,
            daily_usage: 0,
            usage_count: 0,
            usage_timestamps: Vec::new(),
            last_used_at: None,
            device_bound: false,
            max_devices: None,
            used_devices: Vec::new(),
            pending_devices: Vec::new(),
            burst_cooldown: None,
            created_at: now,
            updated_at: now,
            created_by: None,
        }
    }

    pub fn with_panel_type_restriction(mut self, restriction: PanelTypeRestriction) -> Self {
        self.panel_type_restriction = restriction;
        self
    }

    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    pub fn with_device_binding(mut self, max_devices: Option<u32>) -> Self {
        self.device_bound = true;
        self.max_devices = max_devices;
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_status(mut self, status: KeyStatus) -> Self {
        self.status = status;
        self
    }

    /// Seed usage counters, e.g. when importing existing documents
    pub fn with_usage(mut self, daily_usage: u32, last_used_at: Option<DateTime<Utc>>) -> Self {
        self.daily_usage = daily_usage;
        self.last_used_at = last_used_at;
        self
    }

    pub fn with_usage_timestamps(mut self, timestamps: Vec<DateTime<Utc>>) -> Self {
        self.usage_timestamps = timestamps;
        self.trim_usage_history();
        self
    }

    pub fn with_authorized_device(mut self, device_id: impl Into<String>) -> Self {
        self.used_devices.push(device_id.into());
        self
    }

    // Getters

    pub fn key(&self) -> &AccessKeyId {
        &self.key
    }

    pub fn status(&self) -> &KeyStatus {
        &self.status
    }

    pub fn panel_type_restriction(&self) -> PanelTypeRestriction {
        self.panel_type_restriction
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn daily_usage(&self) -> u32 {
        self.daily_usage
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn usage_timestamps(&self) -> &[DateTime<Utc>] {
        &self.usage_timestamps
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn is_device_bound(&self) -> bool {
        self.device_bound
    }

    pub fn max_devices(&self) -> Option<u32> {
        self.max_devices
    }

    pub fn used_devices(&self) -> &[String] {
        &self.used_devices
    }

    pub fn pending_devices(&self) -> &[PendingDevice] {
        &self.pending_devices
    }

    pub fn burst_cooldown(&self) -> Option<&BurstCooldown> {
        self.burst_cooldown.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    // Status

    /// Revert a lapsed suspension or timed ban to active. Returns true if reverted.
    pub fn lift_lapsed_penalty(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.has_lapsed(now) {
            self.status = KeyStatus::Active;
            self.touch(now);
            true
        } else {
            false
        }
    }

    pub fn suspend(
        &mut self,
        reason: Option<String>,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.status = KeyStatus::Suspended {
            reason,
            until,
            suspended_at: now,
        };
        self.touch(now);
    }

    pub fn ban(
        &mut self,
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        banned_by: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = KeyStatus::Banned {
            reason,
            permanent: expires_at.is_none(),
            expires_at,
            banned_at: now,
            banned_by,
        };
        self.touch(now);
    }

    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.status = KeyStatus::Active;
        self.touch(now);
    }

    pub fn set_daily_limit(&mut self, limit: u32, now: DateTime<Utc>) {
        self.daily_limit = limit;
        self.touch(now);
    }

    pub fn set_panel_type_restriction(
        &mut self,
        restriction: PanelTypeRestriction,
        now: DateTime<Utc>,
    ) {
        self.panel_type_restriction = restriction;
        self.touch(now);
    }

    // Usage

    /// Reset the daily counter when the last use was not today (UTC). Returns true if reset.
    pub fn roll_daily_usage(&mut self, now: DateTime<Utc>) -> bool {
        let used_today = self
            .last_used_at
            .is_some_and(|last| last.date_naive() == now.date_naive());

        if !used_today && self.daily_usage != 0 {
            self.daily_usage = 0;
            self.touch(now);
            true
        } else {
            false
        }
    }

    pub fn daily_limit_reached(&self) -> bool {
        self.daily_limit > 0 && self.daily_usage >= self.daily_limit
    }

    /// Uses left today, `None` when unlimited
    pub fn remaining_today(&self) -> Option<u32> {
        (self.daily_limit > 0).then(|| self.daily_limit.saturating_sub(self.daily_usage))
    }

    /// Record one successful use
    pub fn record_usage(&mut self, now: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.daily_usage = self.daily_usage.saturating_add(1);
        self.last_used_at = Some(now);
        self.usage_timestamps.push(now);
        self.trim_usage_history();
        self.touch(now);
    }

    /// Number of recorded uses strictly after `now - window`
    pub fn recent_usage_count(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let since = now - window;
        self.usage_timestamps.iter().filter(|t| **t > since).count()
    }

    pub fn start_burst_cooldown(&mut self, cooldown: BurstCooldown, now: DateTime<Utc>) {
        self.burst_cooldown = Some(cooldown);
        self.touch(now);
    }

    /// Drop a recorded cooldown. Returns true if there was one.
    pub fn clear_burst_cooldown(&mut self, now: DateTime<Utc>) -> bool {
        if self.burst_cooldown.take().is_some() {
            self.touch(now);
            true
        } else {
            false
        }
    }

    // Devices

    pub fn is_device_authorized(&self, device_id: &str) -> bool {
        self.used_devices.iter().any(|d| d == device_id)
    }

    pub fn is_device_pending(&self, device_id: &str) -> bool {
        self.pending_devices.iter().any(|d| d.device_id == device_id)
    }

    /// Queue a device for admin approval. Returns false if it was already pending.
    pub fn request_device(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        if self.is_device_pending(device_id) {
            return false;
        }

        self.pending_devices.push(PendingDevice::new(device_id, now));
        self.touch(now);
        true
    }

    /// Move a pending device to the authorized set
    pub fn authorize_device(
        &mut self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DeviceTransitionError> {
        if !self.is_device_pending(device_id) {
            return Err(DeviceTransitionError::NotPending);
        }

        if let Some(max) = self.max_devices {
            if self.used_devices.len() >= max as usize {
                return Err(DeviceTransitionError::LimitReached(max));
            }
        }

        self.pending_devices.retain(|d| d.device_id != device_id);
        if !self.is_device_authorized(device_id) {
            self.used_devices.push(device_id.to_string());
        }
        self.touch(now);
        Ok(())
    }

    /// Drop a pending request
    pub fn reject_device(
        &mut self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DeviceTransitionError> {
        if !self.is_device_pending(device_id) {
            return Err(DeviceTransitionError::NotPending);
        }

        self.pending_devices.retain(|d| d.device_id != device_id);
        self.touch(now);
        Ok(())
    }

    /// Remove an authorized device. Returns true if it was authorized.
    pub fn unauthorize_device(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        let before = self.used_devices.len();
        self.used_devices.retain(|d| d != device_id);

        if self.used_devices.len() != before {
            self.touch(now);
            true
        } else {
            false
        }
    }

    fn trim_usage_history(&mut self) {
        if self.usage_timestamps.len() > USAGE_HISTORY_LIMIT {
            let excess = self.usage_timestamps.len() - USAGE_HISTORY_LIMIT;
            self.usage_timestamps.drain(..excess);
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
