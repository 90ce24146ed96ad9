//! API Key infrastructure implementations
//!
//! Key generation, storage, verification and the management service.

mod generator;
mod in_memory;
mod postgres;
mod service;
mod verifier;

pub use generator::{hash_key, ApiKeyGenerator, GeneratedApiKey};
pub use in_memory::InMemoryApiKeyRepository;
pub use postgres::PostgresApiKeyRepository;
pub use service::{ApiKeyService, IssueApiKey, IssuedApiKey};
pub use verifier::{KeyVerifier, VerifyError};
