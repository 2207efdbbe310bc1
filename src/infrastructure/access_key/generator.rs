//! Access key generation

use rand::RngCore;

use crate::domain::access_key::AccessKeyId;

/// Generator for random access keys
#[derive(Debug, Clone)]
pub struct AccessKeyGenerator {
    /// Number of random bytes; the key is their hex encoding
    key_bytes: usize,
}

impl Default for AccessKeyGenerator {
    fn default() -> Self {
        Self { key_bytes: 16 }
    }
}

impl AccessKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of random bytes
    pub fn with_key_bytes(mut self, bytes: usize) -> Self {
        self.key_bytes = bytes.clamp(1, 64);
        self
    }

    /// Generate a new access key
    pub fn generate(&self) -> AccessKeyId {
        let mut random_bytes = vec![0u8; self.key_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        AccessKeyId::from_trusted(hex::encode(random_bytes))
    }
}
