//! Access key domain
//!
//! Types and traits for access keys: status lifecycle, usage limits,
//! device authorization and the validation state machine.

mod decision;
mod device;
mod duration;
mod entity;
mod repository;
mod status;
mod validation;
mod validator;

pub use decision::{Decision, Denial, DenialKind, UsageSnapshot};
pub use device::{ActivationOutcome, DeviceTransitionError, PendingDevice};
pub use duration::PenaltyDuration;
pub use entity::{
    AccessKey, AccessKeyId, BurstCooldown, PanelType, PanelTypeRestriction, USAGE_HISTORY_LIMIT,
};
pub use repository::{AccessKeyRepository, Mutation, MutationOutcome};
pub use status::{KeyStatus, KeyStatusKind};
pub use validation::{validate_access_key_id, AccessKeyValidationError};
pub use validator::{evaluate, evaluate_with, Evaluation, ValidationRequest};

#[cfg(test)]
pub use repository::mock;
