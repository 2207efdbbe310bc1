//! Access key validation state machine
//!
//! [`evaluate`] runs inside a single repository mutation, so the checks and
//! the counter updates land together.

use chrono::{DateTime, Utc};

use super::decision::{Decision, Denial, UsageSnapshot};
use super::entity::{AccessKey, PanelType};
use super::status::KeyStatus;

/// What the caller presents alongside the key
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationRequest<'a> {
    pub device_id: Option<&'a str>,
    pub panel_type: Option<PanelType>,
}

impl<'a> ValidationRequest<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device_id: &'a str) -> Self {
        self.device_id = Some(device_id);
        self
    }

    pub fn with_panel_type(mut self, panel_type: PanelType) -> Self {
        self.panel_type = Some(panel_type);
        self
    }
}

/// Decision plus whether the key document was modified
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub changed: bool,
}

impl Evaluation {
    /// Allowed with the key's current counters
    pub fn allowed(key: &AccessKey, changed: bool) -> Self {
        Self {
            decision: Decision::Allowed(UsageSnapshot::from(key)),
            changed,
        }
    }

    fn denied(denial: Denial, changed: bool) -> Self {
        Self {
            decision: Decision::Denied(denial),
            changed,
        }
    }
}

/// Decide whether `key` may be used at `now`, recording the use on success
///
/// Order: device binding, status (lapsed penalties are lifted first),
/// panel type, daily limit. A lifted penalty or a daily reset is kept even
/// when a later check denies.
pub fn evaluate(key: &mut AccessKey, request: &ValidationRequest<'_>, now: DateTime<Utc>) -> Evaluation {
    evaluate_with(key, request, now, |key| Evaluation::allowed(key, false))
}

/// [`evaluate`] with `gate` consulted once the key is known to be usable
/// for this request, before the daily limit is checked and the use recorded
///
/// A denial from `gate` ends the evaluation; its `changed` flag is merged
/// either way.
pub fn evaluate_with(
    key: &mut AccessKey,
    request: &ValidationRequest<'_>,
    now: DateTime<Utc>,
    gate: impl FnOnce(&mut AccessKey) -> Evaluation,
) -> Evaluation {
    if key.is_device_bound() {
        match request.device_id {
            None => {
                return Evaluation::denied(
                    Denial::DeviceUnauthorized {
                        device_id: None,
                        pending: false,
                    },
                    false,
                );
            }
            Some(device_id) if !key.is_device_authorized(device_id) => {
                return Evaluation::denied(
                    Denial::DeviceUnauthorized {
                        device_id: Some(device_id.to_string()),
                        pending: key.is_device_pending(device_id),
                    },
                    false,
                );
            }
            Some(_) => {}
        }
    }

    let mut changed = key.lift_lapsed_penalty(now);

    match key.status() {
        KeyStatus::Active => {}
        KeyStatus::Suspended { reason, until, .. } => {
            return Evaluation::denied(
                Denial::Suspended {
                    reason: reason.clone(),
                    until: *until,
                },
                changed,
            );
        }
        KeyStatus::Banned {
            reason,
            permanent,
            expires_at,
            ..
        } => {
            return Evaluation::denied(
                Denial::Banned {
                    reason: reason.clone(),
                    permanent: *permanent,
                    expires_at: *expires_at,
                },
                changed,
            );
        }
    }

    if let Some(requested) = request.panel_type {
        let restriction = key.panel_type_restriction();
        if !restriction.allows(requested) {
            return Evaluation::denied(
                Denial::PanelTypeNotAllowed {
                    restriction,
                    requested,
                },
                changed,
            );
        }
    }

    let gated = gate(key);
    changed |= gated.changed;
    if let Decision::Denied(denial) = gated.decision {
        return Evaluation::denied(denial, changed);
    }

    changed |= key.roll_daily_usage(now);

    if key.daily_limit_reached() {
        return Evaluation::denied(
            Denial::DailyLimitReached {
                limit: key.daily_limit(),
            },
            changed,
        );
    }

    key.record_usage(now);

    Evaluation::allowed(key, true)
}
