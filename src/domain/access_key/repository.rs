//! Access key repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{AccessKey, AccessKeyId};
use super::status::KeyStatusKind;
use crate::domain::DomainError;

/// Whether a mutation's changes should be written back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Commit,
    Discard,
}

/// In-place change applied to a single key document while the repository holds it exclusively
pub type Mutation<'a> = dyn FnMut(&mut AccessKey) -> MutationOutcome + Send + 'a;

/// Repository trait for access key storage
#[async_trait]
pub trait AccessKeyRepository: Send + Sync + Debug {
    /// Get an access key
    async fn get(&self, key: &AccessKeyId) -> Result<Option<AccessKey>, DomainError>;

    /// Create a new access key, failing with `Conflict` if it exists
    async fn create(&self, access_key: AccessKey) -> Result<AccessKey, DomainError>;

    /// Atomically read, change and (on `Commit`) write back one key.
    ///
    /// No other mutation of the same key may interleave. Returns the document
    /// as stored afterwards, or `None` if the key does not exist.
    async fn mutate(
        &self,
        key: &AccessKeyId,
        mutation: &mut Mutation<'_>,
    ) -> Result<Option<AccessKey>, DomainError>;

    /// Delete an access key
    async fn delete(&self, key: &AccessKeyId) -> Result<bool, DomainError>;

    /// List access keys (optionally filtered by status)
    async fn list(&self, status: Option<KeyStatusKind>) -> Result<Vec<AccessKey>, DomainError>;

    /// Count access keys (optionally filtered by status)
    async fn count(&self, status: Option<KeyStatusKind>) -> Result<usize, DomainError>;

    /// Check if an access key exists
    async fn exists(&self, key: &AccessKeyId) -> Result<bool, DomainError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Round-trip to the backing store, used by readiness probes
    async fn ping(&self) -> Result<(), DomainError> {
        self.count(None).await.map(|_| ())
    }
}
