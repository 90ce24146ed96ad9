//! API Key validation utilities

use thiserror::Error;

/// Errors that can occur during API key validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("API key ID cannot be empty")]
    EmptyId,

    #[error("API key ID exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("API key ID must start and end with a letter or number")]
    InvalidBoundary,

    #[error("API key ID contains invalid character: '{0}'. Only alphanumeric characters and hyphens are allowed")]
    InvalidCharacter(char),

    #[error("API key ID cannot contain consecutive hyphens")]
    ConsecutiveHyphens,

    #[error("API key name cannot be blank")]
    BlankName,

    #[error("API key name exceeds maximum length of {0} characters")]
    NameTooLong(usize),

    #[error("API key prefix must be 1-{0} lowercase alphanumerics or underscores")]
    InvalidPrefix(usize),
}

const MAX_API_KEY_ID_LENGTH: usize = 50;
const MAX_API_KEY_NAME_LENGTH: usize = 100;
const MAX_KEY_PREFIX_LENGTH: usize = 16;

/// Validate an API key ID
///
/// Rules:
/// - 1 to 50 characters
/// - Only alphanumeric characters and hyphens
/// - Must start and end with alphanumeric
/// - No consecutive hyphens
pub fn validate_api_key_id(id: &str) -> Result<(), ApiKeyValidationError> {
    if id.is_empty() {
        return Err(ApiKeyValidationError::EmptyId);
    }

    if id.len() > MAX_API_KEY_ID_LENGTH {
        return Err(ApiKeyValidationError::TooLong(MAX_API_KEY_ID_LENGTH));
    }

    if id.starts_with('-') || id.ends_with('-') {
        return Err(ApiKeyValidationError::InvalidBoundary);
    }

    if let Some(c) = id.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        return Err(ApiKeyValidationError::InvalidCharacter(c));
    }

    if id.contains("--") {
        return Err(ApiKeyValidationError::ConsecutiveHyphens);
    }

    Ok(())
}

/// Validate a display name given to a key by its owner
pub fn validate_api_key_name(name: &str) -> Result<(), ApiKeyValidationError> {
    if name.trim().is_empty() {
        return Err(ApiKeyValidationError::BlankName);
    }

    if name.chars().count() > MAX_API_KEY_NAME_LENGTH {
        return Err(ApiKeyValidationError::NameTooLong(MAX_API_KEY_NAME_LENGTH));
    }

    Ok(())
}

/// Validate the namespace marker prepended to generated keys (e.g. `lnx_live_`)
pub fn validate_key_prefix(prefix: &str) -> Result<(), ApiKeyValidationError> {
    let valid = !prefix.is_empty()
        && prefix.len() <= MAX_KEY_PREFIX_LENGTH
        && prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ApiKeyValidationError::InvalidPrefix(MAX_KEY_PREFIX_LENGTH))
    }
}
