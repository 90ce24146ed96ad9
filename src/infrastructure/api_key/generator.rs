//! API Key generation
//!
//! Keys are `<prefix><hex>` strings. Only their SHA-256 digest is stored;
//! the full key is shown to the owner once, at creation.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random characters after the namespace kept as display prefix
const DISPLAY_CHARS: usize = 8;

/// Result of generating a new API key
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// The full API key (only shown once at creation)
    pub key: String,
    /// Namespace plus the first random characters, safe to display
    pub prefix: String,
    /// Lowercase hex SHA-256 of `key`
    pub hash: String,
}

/// Generator for secure API keys
#[derive(Debug, Clone)]
pub struct ApiKeyGenerator {
    /// Namespace for all generated keys (e.g., "lnx_live_")
    prefix: String,
    /// Number of random bytes to generate
    key_bytes: usize,
}

impl ApiKeyGenerator {
    /// Create a new API key generator
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            key_bytes: 32,
        }
    }

    /// Create a generator for production keys
    pub fn production() -> Self {
        Self::new("lnx_live_")
    }

    /// Create a generator for test keys
    pub fn test() -> Self {
        Self::new("lnx_test_")
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a new API key
    pub fn generate(&self) -> GeneratedApiKey {
        let mut random_bytes = vec![0u8; self.key_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        let key = format!("{}{}", self.prefix, hex::encode(&random_bytes));
        self.from_full_key(key)
    }

    /// Wrap an externally supplied key (e.g. a bootstrap admin key)
    ///
    /// The digest covers the whole string, whatever its shape.
    pub fn from_full_key(&self, key: impl Into<String>) -> GeneratedApiKey {
        let key = key.into();
        let display_len = if key.starts_with(&self.prefix) {
            self.prefix.len() + DISPLAY_CHARS
        } else {
            DISPLAY_CHARS
        };
        let prefix: String = key.chars().take(display_len).collect();
        let hash = hash_key(&key);

        GeneratedApiKey { key, prefix, hash }
    }
}

impl Default for ApiKeyGenerator {
    fn default() -> Self {
        Self::production()
    }
}

/// Digest a presented key for storage and lookup
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
