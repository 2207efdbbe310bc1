//! Access key service
//!
//! Validation, device authorization and key administration. Every state
//! transition is a single [`AccessKeyRepository::mutate`] call, so concurrent
//! requests against the same key never lose updates.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::domain::access_key::{
    evaluate, evaluate_with, AccessKey, AccessKeyId, AccessKeyRepository, ActivationOutcome,
    Decision, Denial, DeviceTransitionError, Evaluation, KeyStatus, KeyStatusKind,
    MutationOutcome, PanelTypeRestriction, PenaltyDuration, PendingDevice, ValidationRequest,
};
use crate::domain::notification::Notification;
use crate::domain::DomainError;
use crate::infrastructure::notification::Notifier;

use super::burst_guard::BurstGuard;
use super::generator::AccessKeyGenerator;

const MAX_DEVICE_ID_LENGTH: usize = 128;

/// Parameters for a new access key
#[derive(Debug, Clone, Default)]
pub struct CreateAccessKey {
    /// Explicit key value; a random one is generated when absent
    pub key: Option<String>,
    pub panel_type_restriction: Option<PanelTypeRestriction>,
    /// 0 = unlimited
    pub daily_limit: u32,
    pub device_bound: bool,
    pub max_devices: Option<u32>,
    pub created_by: Option<String>,
}

/// Authorized and pending devices of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList {
    pub used: Vec<String>,
    pub pending: Vec<PendingDevice>,
}

/// Access key service
#[derive(Debug)]
pub struct AccessKeyService {
    repository: Arc<dyn AccessKeyRepository>,
    generator: AccessKeyGenerator,
    burst_guard: BurstGuard,
    notifier: Notifier,
}

fn parse_key(key: &str) -> Result<AccessKeyId, DomainError> {
    AccessKeyId::new(key).map_err(|e| DomainError::invalid_id(e.to_string()))
}

fn validate_device_id(device_id: &str) -> Result<(), DomainError> {
    if device_id.trim().is_empty() {
        return Err(DomainError::validation("Device ID cannot be empty"));
    }

    if device_id.chars().count() > MAX_DEVICE_ID_LENGTH {
        return Err(DomainError::validation(format!(
            "Device ID cannot exceed {} characters",
            MAX_DEVICE_ID_LENGTH
        )));
    }

    Ok(())
}

fn key_not_found(key: &AccessKeyId) -> DomainError {
    DomainError::not_found(format!("Access key '{}' not found", key))
}

fn device_error(key: &AccessKeyId, device_id: &str, error: DeviceTransitionError) -> DomainError {
    match error {
        DeviceTransitionError::NotPending => DomainError::not_pending(key.as_str(), device_id),
        DeviceTransitionError::LimitReached(max) => DomainError::conflict(format!(
            "Access key '{}' already has the maximum of {} authorized devices",
            key, max
        )),
    }
}

impl AccessKeyService {
    /// Create a service with the burst guard disabled
    pub fn new(repository: Arc<dyn AccessKeyRepository>, notifier: Notifier) -> Self {
        Self {
            repository,
            generator: AccessKeyGenerator::new(),
            burst_guard: BurstGuard::disabled(),
            notifier,
        }
    }

    pub fn with_burst_guard(mut self, burst_guard: BurstGuard) -> Self {
        self.burst_guard = burst_guard;
        self
    }

    pub fn repository(&self) -> &Arc<dyn AccessKeyRepository> {
        &self.repository
    }

    /// Run `change` against one key and commit only when it succeeds
    async fn apply<T, F>(
        &self,
        key: &AccessKeyId,
        mut change: F,
    ) -> Result<(AccessKey, T), DomainError>
    where
        T: Send,
        F: FnMut(&mut AccessKey) -> Result<T, DomainError> + Send,
    {
        let mut result = None;

        let stored = self
            .repository
            .mutate(key, &mut |access_key: &mut AccessKey| match change(access_key) {
                Ok(value) => {
                    result = Some(Ok(value));
                    MutationOutcome::Commit
                }
                Err(e) => {
                    result = Some(Err(e));
                    MutationOutcome::Discard
                }
            })
            .await?
            .ok_or_else(|| key_not_found(key))?;

        match result {
            Some(Ok(value)) => Ok((stored, value)),
            Some(Err(e)) => Err(e),
            None => Err(DomainError::internal("Mutation did not run")),
        }
    }

    /// Run a checking closure that reports whether it changed the key
    async fn check(
        &self,
        key: &str,
        mut run: impl FnMut(&mut AccessKey) -> Evaluation + Send,
    ) -> Result<Decision, DomainError> {
        let Ok(id) = AccessKeyId::new(key) else {
            return Ok(Decision::Denied(Denial::NotFound));
        };

        let mut decision = None;

        let stored = self
            .repository
            .mutate(&id, &mut |access_key: &mut AccessKey| {
                let evaluation = run(access_key);
                decision = Some(evaluation.decision);

                if evaluation.changed {
                    MutationOutcome::Commit
                } else {
                    MutationOutcome::Discard
                }
            })
            .await?;

        let decision = match (stored, decision) {
            (Some(_), Some(decision)) => decision,
            _ => Decision::Denied(Denial::NotFound),
        };

        debug!(key = %id, allowed = decision.is_allowed(), "Access key checked");
        Ok(decision)
    }

    // Validation

    /// Validate a key and record the use when allowed
    pub async fn validate(
        &self,
        key: &str,
        request: ValidationRequest<'_>,
    ) -> Result<Decision, DomainError> {
        let now = Utc::now();
        self.check(key, |access_key| evaluate(access_key, &request, now))
            .await
    }

    /// Apply the burst guard only; usage counters are not touched
    pub async fn record_burst_and_maybe_reject(&self, key: &str) -> Result<Decision, DomainError> {
        let now = Utc::now();
        self.check(key, |access_key| self.burst_guard.check(access_key, now))
            .await
    }

    /// Validation with the burst guard applied to otherwise usable keys, in
    /// one atomic update
    ///
    /// Device, status and panel type denials win over the guard, so a key
    /// that is refused anyway never picks up a cooldown.
    pub async fn admit(
        &self,
        key: &str,
        request: ValidationRequest<'_>,
    ) -> Result<Decision, DomainError> {
        let now = Utc::now();

        self.check(key, |access_key| {
            evaluate_with(access_key, &request, now, |access_key| {
                self.burst_guard.check(access_key, now)
            })
        })
        .await
    }

    // Devices

    /// Queue a device for admin approval
    pub async fn request_activation(
        &self,
        key: &str,
        device_id: &str,
    ) -> Result<ActivationOutcome, DomainError> {
        validate_device_id(device_id)?;
        let id = parse_key(key).map_err(|_| DomainError::not_found("Access key not found"))?;
        let now = Utc::now();

        let mut outcome = ActivationOutcome::AlreadyPending;
        self.repository
            .mutate(&id, &mut |access_key: &mut AccessKey| {
                if access_key.is_device_authorized(device_id) {
                    outcome = ActivationOutcome::AlreadyAuthorized;
                    MutationOutcome::Discard
                } else if access_key.request_device(device_id, now) {
                    outcome = ActivationOutcome::Requested;
                    MutationOutcome::Commit
                } else {
                    outcome = ActivationOutcome::AlreadyPending;
                    MutationOutcome::Discard
                }
            })
            .await?
            .ok_or_else(|| key_not_found(&id))?;

        if outcome == ActivationOutcome::Requested {
            info!(key = %id, device_id = %device_id, "Device activation requested");
            self.notifier.notify(Notification::ActivationRequested {
                key: id.to_string(),
                device_id: device_id.to_string(),
            });
        }

        Ok(outcome)
    }

    /// Move a pending device to the authorized set
    pub async fn authorize_device(
        &self,
        key: &str,
        device_id: &str,
    ) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();

        let (access_key, _) = self
            .apply(&id, |access_key| {
                access_key
                    .authorize_device(device_id, now)
                    .map_err(|e| device_error(&id, device_id, e))
            })
            .await?;

        info!(key = %id, device_id = %device_id, "Device authorized");
        self.notifier.notify(Notification::DeviceAuthorized {
            key: id.to_string(),
            device_id: device_id.to_string(),
        });

        Ok(access_key)
    }

    /// Drop a pending activation request
    pub async fn reject_device(&self, key: &str, device_id: &str) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();

        let (access_key, _) = self
            .apply(&id, |access_key| {
                access_key
                    .reject_device(device_id, now)
                    .map_err(|e| device_error(&id, device_id, e))
            })
            .await?;

        info!(key = %id, device_id = %device_id, "Device rejected");
        self.notifier.notify(Notification::DeviceRejected {
            key: id.to_string(),
            device_id: device_id.to_string(),
        });

        Ok(access_key)
    }

    /// Revoke an authorized device. Returns whether it was authorized.
    pub async fn unauthorize_device(&self, key: &str, device_id: &str) -> Result<bool, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();

        let mut removed = false;
        self.repository
            .mutate(&id, &mut |access_key: &mut AccessKey| {
                removed = access_key.unauthorize_device(device_id, now);
                if removed {
                    MutationOutcome::Commit
                } else {
                    MutationOutcome::Discard
                }
            })
            .await?
            .ok_or_else(|| key_not_found(&id))?;

        if removed {
            info!(key = %id, device_id = %device_id, "Device unauthorized");
        }

        Ok(removed)
    }

    pub async fn list_devices(&self, key: &str) -> Result<DeviceList, DomainError> {
        let access_key = self.get(key).await?;

        Ok(DeviceList {
            used: access_key.used_devices().to_vec(),
            pending: access_key.pending_devices().to_vec(),
        })
    }

    pub async fn list_pending_devices(&self, key: &str) -> Result<Vec<PendingDevice>, DomainError> {
        Ok(self.list_devices(key).await?.pending)
    }

    // Administration

    /// Create a new access key
    pub async fn create(&self, request: CreateAccessKey) -> Result<AccessKey, DomainError> {
        let id = match request.key.as_deref() {
            Some(key) => parse_key(key)?,
            None => self.generator.generate(),
        };

        let mut access_key = AccessKey::new(id.clone())
            .with_panel_type_restriction(request.panel_type_restriction.unwrap_or_default())
            .with_daily_limit(request.daily_limit);

        if request.device_bound {
            if request.max_devices == Some(0) {
                return Err(DomainError::validation("max_devices must be at least 1"));
            }
            access_key = access_key.with_device_binding(request.max_devices);
        }

        if let Some(created_by) = request.created_by {
            access_key = access_key.with_created_by(created_by);
        }

        let created = self.repository.create(access_key).await?;
        info!(key = %id, device_bound = created.is_device_bound(), "Access key created");

        Ok(created)
    }

    pub async fn get(&self, key: &str) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        self.repository
            .get(&id)
            .await?
            .ok_or_else(|| key_not_found(&id))
    }

    pub async fn list(&self, status: Option<KeyStatusKind>) -> Result<Vec<AccessKey>, DomainError> {
        self.repository.list(status).await
    }

    /// Physically remove a key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let id = parse_key(key)?;
        let deleted = self.repository.delete(&id).await?;

        if deleted {
            info!(key = %id, "Access key deleted");
        }

        Ok(deleted)
    }

    pub async fn ban(
        &self,
        key: &str,
        duration: PenaltyDuration,
        reason: Option<String>,
        banned_by: Option<String>,
    ) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();
        let expires_at = duration.ends_at(now)?;

        let (access_key, _) = self
            .apply(&id, |access_key| {
                access_key.ban(reason.clone(), expires_at, banned_by.clone(), now);
                Ok(())
            })
            .await?;

        info!(key = %id, permanent = duration.is_permanent(), "Access key banned");
        self.notifier.notify(Notification::KeyBanned {
            key: id.to_string(),
            reason,
            expires_at,
        });

        Ok(access_key)
    }

    pub async fn unban(&self, key: &str) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();

        let (access_key, _) = self
            .apply(&id, |access_key| {
                if !matches!(access_key.status(), KeyStatus::Banned { .. }) {
                    return Err(DomainError::validation(format!(
                        "Access key '{}' is not banned",
                        id
                    )));
                }
                access_key.activate(now);
                Ok(())
            })
            .await?;

        info!(key = %id, "Access key unbanned");
        Ok(access_key)
    }

    /// Suspend a key, indefinitely when `duration` is `None` or permanent
    pub async fn suspend(
        &self,
        key: &str,
        reason: Option<String>,
        duration: Option<PenaltyDuration>,
    ) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();
        let until = duration.map(|d| d.ends_at(now)).transpose()?.flatten();

        let (access_key, _) = self
            .apply(&id, |access_key| {
                access_key.suspend(reason.clone(), until, now);
                Ok(())
            })
            .await?;

        info!(key = %id, until = ?until, "Access key suspended");
        self.notifier.notify(Notification::KeySuspended {
            key: id.to_string(),
            reason,
            until,
        });

        Ok(access_key)
    }

    pub async fn unsuspend(&self, key: &str) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();

        let (access_key, _) = self
            .apply(&id, |access_key| {
                if !matches!(access_key.status(), KeyStatus::Suspended { .. }) {
                    return Err(DomainError::validation(format!(
                        "Access key '{}' is not suspended",
                        id
                    )));
                }
                access_key.activate(now);
                Ok(())
            })
            .await?;

        info!(key = %id, "Access key unsuspended");
        Ok(access_key)
    }

    /// Set the daily cap, 0 for unlimited
    pub async fn set_daily_limit(&self, key: &str, limit: u32) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();

        let (access_key, _) = self
            .apply(&id, |access_key| {
                access_key.set_daily_limit(limit, now);
                Ok(())
            })
            .await?;

        info!(key = %id, limit = limit, "Daily limit updated");
        Ok(access_key)
    }

    pub async fn set_panel_type_restriction(
        &self,
        key: &str,
        restriction: PanelTypeRestriction,
    ) -> Result<AccessKey, DomainError> {
        let id = parse_key(key)?;
        let now = Utc::now();

        let (access_key, _) = self
            .apply(&id, |access_key| {
                access_key.set_panel_type_restriction(restriction, now);
                Ok(())
            })
            .await?;

        info!(key = %id, restriction = %restriction, "Panel type restriction updated");
        Ok(access_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access_key::mock::FailingAccessKeyRepository;
    use crate::domain::access_key::PanelType;
    use crate::domain::notification::mock::RecordingSink;
    use crate::infrastructure::access_key::{BurstPolicy, InMemoryAccessKeyRepository};

    fn service_with(keys: Vec<AccessKey>) -> (AccessKeyService, Arc<RecordingSink>) {
        let repository = Arc::new(InMemoryAccessKeyRepository::with_keys(keys));
        let sink = Arc::new(RecordingSink::new());
        let service = AccessKeyService::new(repository, Notifier::new(sink.clone()));
        (service, sink)
    }

    fn key(id: &str) -> AccessKey {
        AccessKey::new(AccessKeyId::new(id).unwrap())
    }

    fn denial(decision: &Decision) -> &Denial {
        decision.denial().expect("expected a denial")
    }

    #[tokio::test]
    async fn test_validate_unknown_key() {
        let (service, _) = service_with(vec![]);

        let decision = service.validate("missing", ValidationRequest::new()).await.unwrap();
        assert_eq!(denial(&decision), &Denial::NotFound);

        let decision = service.validate("not a key!", ValidationRequest::new()).await.unwrap();
        assert_eq!(denial(&decision), &Denial::NotFound);
    }

    #[tokio::test]
    async fn test_validate_records_usage() {
        let (service, _) = service_with(vec![key("k1").with_daily_limit(2)]);

        assert!(service.validate("k1", ValidationRequest::new()).await.unwrap().is_allowed());
        assert!(service.validate("k1", ValidationRequest::new()).await.unwrap().is_allowed());

        let third = service.validate("k1", ValidationRequest::new()).await.unwrap();
        assert_eq!(denial(&third), &Denial::DailyLimitReached { limit: 2 });

        let stored = service.get("k1").await.unwrap();
        assert_eq!(stored.usage_count(), 2);
        assert_eq!(stored.daily_usage(), 2);
    }

    #[tokio::test]
    async fn test_validate_panel_type_restriction() {
        let (service, _) =
            service_with(vec![key("k1").with_panel_type_restriction(PanelTypeRestriction::Public)]);

        let decision = service
            .validate("k1", ValidationRequest::new().with_panel_type(PanelType::Private))
            .await
            .unwrap();

        assert!(matches!(denial(&decision), Denial::PanelTypeNotAllowed { .. }));
        assert_eq!(service.get("k1").await.unwrap().usage_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_validations_respect_daily_limit() {
        let (service, _) = service_with(vec![key("k1").with_daily_limit(5)]);
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .validate("k1", ValidationRequest::new())
                    .await
                    .unwrap()
                    .is_allowed()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 5);
        assert_eq!(service.get("k1").await.unwrap().daily_usage(), 5);
    }

    #[tokio::test]
    async fn test_device_flow() {
        let (service, sink) = service_with(vec![key("k1").with_device_binding(Some(1))]);
        let request = ValidationRequest::new().with_device("dev-1");

        let decision = service.validate("k1", request).await.unwrap();
        assert!(matches!(
            denial(&decision),
            Denial::DeviceUnauthorized { pending: false, .. }
        ));

        let outcome = service.request_activation("k1", "dev-1").await.unwrap();
        assert_eq!(outcome, ActivationOutcome::Requested);
        let again = service.request_activation("k1", "dev-1").await.unwrap();
        assert_eq!(again, ActivationOutcome::AlreadyPending);

        let decision = service.validate("k1", request).await.unwrap();
        assert!(matches!(
            denial(&decision),
            Denial::DeviceUnauthorized { pending: true, .. }
        ));

        service.authorize_device("k1", "dev-1").await.unwrap();
        assert!(service.validate("k1", request).await.unwrap().is_allowed());
        assert_eq!(
            service.request_activation("k1", "dev-1").await.unwrap(),
            ActivationOutcome::AlreadyAuthorized
        );

        assert!(service.unauthorize_device("k1", "dev-1").await.unwrap());
        assert!(!service.unauthorize_device("k1", "dev-1").await.unwrap());
        let decision = service.validate("k1", request).await.unwrap();
        assert!(matches!(denial(&decision), Denial::DeviceUnauthorized { .. }));

        let delivered = sink.wait_for(2).await;
        assert!(delivered
            .iter()
            .any(|n| matches!(n, Notification::ActivationRequested { .. })));
        assert!(delivered
            .iter()
            .any(|n| matches!(n, Notification::DeviceAuthorized { .. })));
    }

    #[tokio::test]
    async fn test_authorize_requires_pending_and_respects_max_devices() {
        let (service, _) = service_with(vec![key("k1")
            .with_device_binding(Some(1))
            .with_authorized_device("dev-1")]);

        let err = service.authorize_device("k1", "dev-2").await.unwrap_err();
        assert!(matches!(err, DomainError::NotPending { .. }));

        service.request_activation("k1", "dev-2").await.unwrap();
        let err = service.authorize_device("k1", "dev-2").await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        let devices = service.list_devices("k1").await.unwrap();
        assert_eq!(devices.used, vec!["dev-1".to_string()]);
        assert_eq!(devices.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_device() {
        let (service, sink) = service_with(vec![key("k1").with_device_binding(None)]);

        service.request_activation("k1", "dev-1").await.unwrap();
        service.reject_device("k1", "dev-1").await.unwrap();

        assert!(service.list_pending_devices("k1").await.unwrap().is_empty());
        let err = service.reject_device("k1", "dev-1").await.unwrap_err();
        assert!(matches!(err, DomainError::NotPending { .. }));

        let delivered = sink.wait_for(2).await;
        assert!(delivered
            .iter()
            .any(|n| matches!(n, Notification::DeviceRejected { .. })));
    }

    #[tokio::test]
    async fn test_request_activation_errors() {
        let (service, _) = service_with(vec![key("k1")]);

        let err = service.request_activation("missing", "dev-1").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let err = service.request_activation("k1", "  ").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_ban_and_unban() {
        let (service, sink) = service_with(vec![key("k1")]);

        let banned = service
            .ban(
                "k1",
                PenaltyDuration::parse("1d").unwrap(),
                Some("abuse".to_string()),
                Some("admin".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(banned.status().kind(), KeyStatusKind::Banned);

        let decision = service.validate("k1", ValidationRequest::new()).await.unwrap();
        assert!(matches!(
            denial(&decision),
            Denial::Banned { permanent: false, .. }
        ));

        let unbanned = service.unban("k1").await.unwrap();
        assert!(unbanned.status().is_active());

        let err = service.unban("k1").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let delivered = sink.wait_for(1).await;
        assert!(matches!(delivered[0], Notification::KeyBanned { .. }));
    }

    #[tokio::test]
    async fn test_suspend_and_unsuspend() {
        let (service, _) = service_with(vec![key("k1")]);

        service
            .suspend("k1", Some("review".to_string()), None)
            .await
            .unwrap();

        let decision = service.validate("k1", ValidationRequest::new()).await.unwrap();
        assert!(matches!(denial(&decision), Denial::Suspended { until: None, .. }));

        assert!(service.unsuspend("k1").await.unwrap().status().is_active());
        assert!(service.unsuspend("k1").await.is_err());
    }

    #[tokio::test]
    async fn test_create_generates_key_and_rejects_duplicates() {
        let (service, _) = service_with(vec![]);

        let generated = service.create(CreateAccessKey::default()).await.unwrap();
        assert_eq!(generated.key().as_str().len(), 32);

        let explicit = CreateAccessKey {
            key: Some("custom-key".to_string()),
            daily_limit: 10,
            device_bound: true,
            max_devices: Some(2),
            ..Default::default()
        };
        let created = service.create(explicit.clone()).await.unwrap();
        assert!(created.is_device_bound());
        assert_eq!(created.max_devices(), Some(2));

        let err = service.create(explicit).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        assert_eq!(service.list(None).await.unwrap().len(), 2);
        assert!(service.delete("custom-key").await.unwrap());
        assert!(matches!(
            service.get("custom-key").await.unwrap_err(),
            DomainError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_admin_limits() {
        let (service, _) = service_with(vec![key("k1")]);

        let updated = service.set_daily_limit("k1", 3).await.unwrap();
        assert_eq!(updated.daily_limit(), 3);

        let updated = service
            .set_panel_type_restriction("k1", PanelTypeRestriction::Private)
            .await
            .unwrap();
        assert_eq!(updated.panel_type_restriction(), PanelTypeRestriction::Private);

        let err = service.set_daily_limit("missing", 3).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_admit_applies_burst_guard_to_usable_keys() {
        let now = Utc::now();
        let busy = key("k1").with_usage_timestamps(vec![now, now, now]);
        let (service, _) = service_with(vec![busy]);
        let service = service.with_burst_guard(BurstGuard::with_seed(
            BurstPolicy::enabled().with_rejection_probability(1.0),
            42,
        ));

        let decision = service.admit("k1", ValidationRequest::new()).await.unwrap();
        assert!(matches!(denial(&decision), Denial::RateLimited { .. }));

        let stored = service.get("k1").await.unwrap();
        assert_eq!(stored.usage_count(), 0);
        assert!(stored.burst_cooldown().is_some());

        let replayed = service.record_burst_and_maybe_reject("k1").await.unwrap();
        match (denial(&decision), denial(&replayed)) {
            (
                Denial::RateLimited { message: first, .. },
                Denial::RateLimited { message: second, .. },
            ) => assert_eq!(first, second),
            other => panic!("expected two rate limited denials, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admit_reports_real_denial_before_burst_guard() {
        let now = Utc::now();
        let busy = key("k1")
            .with_usage_timestamps(vec![now, now, now])
            .with_status(KeyStatus::Banned {
                reason: Some("abuse".to_string()),
                permanent: true,
                expires_at: None,
                banned_at: now,
                banned_by: None,
            });
        let (service, _) = service_with(vec![busy]);
        let service = service.with_burst_guard(BurstGuard::with_seed(
            BurstPolicy::enabled().with_rejection_probability(1.0),
            1,
        ));

        let decision = service.admit("k1", ValidationRequest::new()).await.unwrap();
        assert!(matches!(
            denial(&decision),
            Denial::Banned { permanent: true, .. }
        ));
        assert!(service.get("k1").await.unwrap().burst_cooldown().is_none());

        let unbanned = service.unban("k1").await.unwrap();
        assert!(unbanned.status().is_active());
        assert!(unbanned.burst_cooldown().is_none());
    }

    #[tokio::test]
    async fn test_admit_device_and_panel_denials_skip_burst_guard() {
        let now = Utc::now();
        let bound = key("bound")
            .with_usage_timestamps(vec![now, now, now])
            .with_device_binding(None);
        let public_only = key("public-only")
            .with_usage_timestamps(vec![now, now, now])
            .with_panel_type_restriction(PanelTypeRestriction::Public);
        let (service, _) = service_with(vec![bound, public_only]);
        let service = service.with_burst_guard(BurstGuard::with_seed(
            BurstPolicy::enabled().with_rejection_probability(1.0),
            5,
        ));

        let decision = service
            .admit("bound", ValidationRequest::new().with_device("dev-1"))
            .await
            .unwrap();
        assert!(matches!(denial(&decision), Denial::DeviceUnauthorized { .. }));

        let decision = service
            .admit(
                "public-only",
                ValidationRequest::new().with_panel_type(PanelType::Private),
            )
            .await
            .unwrap();
        assert!(matches!(denial(&decision), Denial::PanelTypeNotAllowed { .. }));

        for id in ["bound", "public-only"] {
            assert!(service.get(id).await.unwrap().burst_cooldown().is_none());
        }
    }

    #[tokio::test]
    async fn test_ban_with_unrepresentable_end_is_rejected() {
        let (service, sink) = service_with(vec![key("k1")]);
        let duration = PenaltyDuration::parse("100000000w").unwrap();

        let err = service
            .ban("k1", duration, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = service
            .suspend("k1", None, Some(duration))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        assert!(service.get("k1").await.unwrap().status().is_active());
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_an_error() {
        let repository = Arc::new(FailingAccessKeyRepository::new());
        repository.create(key("k1")).await.unwrap();
        repository.set_should_fail(true).await;

        let service =
            AccessKeyService::new(repository, Notifier::new(Arc::new(RecordingSink::new())));

        let err = service.validate("k1", ValidationRequest::new()).await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_fail_operation() {
        let repository = Arc::new(InMemoryAccessKeyRepository::with_keys(vec![key("k1")]));
        let sink = Arc::new(RecordingSink::failing());
        let service = AccessKeyService::new(repository, Notifier::new(sink.clone()));

        let banned = service
            .ban("k1", PenaltyDuration::Permanent, None, None)
            .await
            .unwrap();

        assert_eq!(banned.status().kind(), KeyStatusKind::Banned);
        sink.wait_for(1).await;
    }
}
