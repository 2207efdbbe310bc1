//! In-memory access key repository implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::access_key::{
    AccessKey, AccessKeyId, AccessKeyRepository, KeyStatusKind, Mutation, MutationOutcome,
};
use crate::domain::DomainError;

/// In-memory implementation of AccessKeyRepository
///
/// Mutations run under the map's write lock, which makes each one atomic.
#[derive(Debug, Default)]
pub struct InMemoryAccessKeyRepository {
    keys: Arc<RwLock<HashMap<String, AccessKey>>>,
}

impl InMemoryAccessKeyRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository with initial keys
    pub fn with_keys(keys: Vec<AccessKey>) -> Self {
        let keys_map: HashMap<String, AccessKey> = keys
            .into_iter()
            .map(|k| (k.key().as_str().to_string(), k))
            .collect();

        Self {
            keys: Arc::new(RwLock::new(keys_map)),
        }
    }
}

fn matches_status(key: &AccessKey, status: Option<KeyStatusKind>) -> bool {
    status.is_none_or(|s| key.status().kind() == s)
}

#[async_trait]
impl AccessKeyRepository for InMemoryAccessKeyRepository {
    async fn get(&self, key: &AccessKeyId) -> Result<Option<AccessKey>, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.get(key.as_str()).cloned())
    }

    async fn create(&self, access_key: AccessKey) -> Result<AccessKey, DomainError> {
        let mut keys = self.keys.write().await;
        let id = access_key.key().as_str().to_string();

        if keys.contains_key(&id) {
            return Err(DomainError::conflict(format!(
                "Access key '{}' already exists",
                id
            )));
        }

        keys.insert(id, access_key.clone());
        Ok(access_key)
    }

    async fn mutate(
        &self,
        key: &AccessKeyId,
        mutation: &mut Mutation<'_>,
    ) -> Result<Option<AccessKey>, DomainError> {
        let mut keys = self.keys.write().await;

        let Some(current) = keys.get_mut(key.as_str()) else {
            return Ok(None);
        };

        let mut candidate = current.clone();

        match mutation(&mut candidate) {
            MutationOutcome::Commit => {
                *current = candidate.clone();
                Ok(Some(candidate))
            }
            MutationOutcome::Discard => Ok(Some(current.clone())),
        }
    }

    async fn delete(&self, key: &AccessKeyId) -> Result<bool, DomainError> {
        let mut keys = self.keys.write().await;
        Ok(keys.remove(key.as_str()).is_some())
    }

    async fn list(&self, status: Option<KeyStatusKind>) -> Result<Vec<AccessKey>, DomainError> {
        let keys = self.keys.read().await;

        let mut result: Vec<AccessKey> = keys
            .values()
            .filter(|k| matches_status(k, status))
            .cloned()
            .collect();
        result.sort_by_key(|k| k.created_at());

        Ok(result)
    }

    async fn count(&self, status: Option<KeyStatusKind>) -> Result<usize, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.values().filter(|k| matches_status(k, status)).count())
    }
}
