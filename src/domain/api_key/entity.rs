//! API Key entity and related types

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::KeyRejection;
use super::validation::{validate_api_key_id, ApiKeyValidationError};
use crate::domain::owner::OwnerId;

/// API Key identifier - alphanumeric + hyphens, max 50 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiKeyId(String);

impl ApiKeyId {
    /// Create a new ApiKeyId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, ApiKeyValidationError> {
        let id = id.into();
        validate_api_key_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApiKeyId {
    type Error = ApiKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiKeyId> for String {
    fn from(id: ApiKeyId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permission strings attached to a key
///
/// `"*"` grants every permission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyPermissions(BTreeSet<String>);

impl ApiKeyPermissions {
    pub const ALL: &'static str = "*";
    pub const CHAT: &'static str = "chat";
    pub const KEYS_MANAGE: &'static str = "keys:manage";
    pub const USAGE_READ: &'static str = "usage:read";

    /// Create an empty permission set
    pub fn new() -> Self {
        Self::default()
    }

    /// Permissions granted to keys created from the dashboard
    pub fn standard() -> Self {
        Self::from_iter([Self::CHAT, Self::KEYS_MANAGE, Self::USAGE_READ])
    }

    /// Wildcard permission set
    pub fn full_access() -> Self {
        Self::from_iter([Self::ALL])
    }

    /// Add a permission
    pub fn with(mut self, permission: impl Into<String>) -> Self {
        self.0.insert(permission.into());
        self
    }

    /// Check whether a permission is granted
    pub fn allows(&self, permission: &str) -> bool {
        self.0.contains(Self::ALL) || self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ApiKeyPermissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Fixed-window rate limit attached to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests admitted per window
    pub limit: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    /// Whether this policy admits more requests per unit of time than `other`
    pub fn exceeds_rate_of(&self, other: &RateLimitPolicy) -> bool {
        u128::from(self.limit) * u128::from(other.window_ms)
            > u128::from(other.limit) * u128::from(self.window_ms)
    }
}

/// API Key entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Unique identifier for the key
    id: ApiKeyId,
    /// Owner of the key
    owner_id: OwnerId,
    /// Display name for the key
    name: String,
    /// Hex SHA-256 digest of the full key string. Never exposed in API responses.
    #[serde(skip_serializing)]
    secret_hash: String,
    /// Non-secret display prefix (namespace + first random chars)
    key_prefix: String,
    permissions: ApiKeyPermissions,
    rate_limit: RateLimitPolicy,
    /// Expiration timestamp (None = never expires)
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    /// Lifetime count of accepted verifications
    usage_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
    active: bool,
    /// Set once on revocation and never cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Create a new active API key
    pub fn new(
        id: ApiKeyId,
        owner_id: OwnerId,
        name: impl Into<String>,
        secret_hash: impl Into<String>,
        key_prefix: impl Into<String>,
        rate_limit: RateLimitPolicy,
    ) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            secret_hash: secret_hash.into(),
            key_prefix: key_prefix.into(),
            permissions: ApiKeyPermissions::standard(),
            rate_limit,
            expires_at: None,
            usage_count: 0,
            last_used_at: None,
            active: true,
            revoked_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_permissions(mut self, permissions: ApiKeyPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Rebuild the mutable state of a persisted key
    pub fn with_persisted_state(
        mut self,
        usage_count: u64,
        last_used_at: Option<DateTime<Utc>>,
        active: bool,
        revoked_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.usage_count = usage_count;
        self.last_used_at = last_used_at;
        self.active = active;
        self.revoked_at = revoked_at;
        self
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn permissions(&self) -> &ApiKeyPermissions {
        &self.permissions
    }

    pub fn rate_limit(&self) -> RateLimitPolicy {
        self.rate_limit
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
        self.revoked_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // Status checks

    /// Revoked keys stay revoked even if `active` is flipped back
    pub fn is_revoked(&self) -> bool {
        !self.active || self.revoked_at.is_some()
    }

    /// Expiry is strict: the key is still usable at exactly `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Check whether the key may authenticate a request at `now`
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), KeyRejection> {
        if self.is_revoked() {
            return Err(KeyRejection::Revoked);
        }

        if self.is_expired_at(now) {
            return Err(KeyRejection::Expired);
        }

        Ok(())
    }

    /// Whether the key counts against the owner's live-key cap
    pub fn counts_toward_cap(&self, now: DateTime<Utc>) -> bool {
        self.check_usable(now).is_ok()
    }

    // Mutators

    /// Record one accepted verification
    pub fn record_usage(&mut self, now: DateTime<Utc>) {
        self.usage_count += 1;
        self.last_used_at = Some(now);
    }

    /// Soft-revoke the key; the first revocation timestamp is kept
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.active = false;
        if self.revoked_at.is_none() {
            self.revoked_at = Some(now);
        }
    }

    /// Overwrite the active flag without touching `revoked_at`
    ///
    /// Only used to simulate out-of-band edits to the store.
    pub fn force_active_flag(&mut self, active: bool) {
        self.active = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_api_key(id: &str) -> ApiKey {
        ApiKey::new(
            ApiKeyId::new(id).unwrap(),
            OwnerId::new("owner-1").unwrap(),
            "Test Key",
            "hashed_secret",
            "lnx_test_abcd1234",
            RateLimitPolicy::new(10, 1000),
        )
    }

    #[test]
    fn test_api_key_id_valid() {
        let id = ApiKeyId::new("my-api-key-1").unwrap();
        assert_eq!(id.as_str(), "my-api-key-1");
    }

    #[test]
    fn test_api_key_id_generate_is_valid() {
        let id = ApiKeyId::generate();
        assert!(ApiKeyId::new(id.as_str()).is_ok());
    }

    #[test]
    fn test_api_key_id_invalid() {
        assert!(ApiKeyId::new("").is_err());
        assert!(ApiKeyId::new("my_key").is_err());
        assert!(ApiKeyId::new("-key").is_err());
    }

    #[test]
    fn test_permissions() {
        let perms = ApiKeyPermissions::new().with(ApiKeyPermissions::CHAT);
        assert!(perms.allows("chat"));
        assert!(!perms.allows("usage:read"));

        let all = ApiKeyPermissions::full_access();
        assert!(all.allows("chat"));
        assert!(all.allows("anything"));
    }

    #[test]
    fn test_permissions_serialize_as_list() {
        let perms = ApiKeyPermissions::from_iter(["usage:read", "chat"]);
        let json = serde_json::to_string(&perms).unwrap();
        assert_eq!(json, r#"["chat","usage:read"]"#);
    }

    #[test]
    fn test_serialized_key_omits_secret_hash() {
        let json = serde_json::to_value(create_test_api_key("test-key")).unwrap();

        assert!(json.get("secret_hash").is_none());
        assert!(!json.to_string().contains("hashed_secret"));
        assert_eq!(json["key_prefix"], "lnx_test_abcd1234");
    }

    #[test]
    fn test_policy_rate_comparison() {
        let plan = RateLimitPolicy::new(60, 60_000);

        assert!(RateLimitPolicy::new(61, 60_000).exceeds_rate_of(&plan));
        assert!(RateLimitPolicy::new(2, 1_000).exceeds_rate_of(&plan));
        assert!(!RateLimitPolicy::new(60, 60_000).exceeds_rate_of(&plan));
        assert!(!RateLimitPolicy::new(1_440, 86_400_000).exceeds_rate_of(&plan));
        assert!(RateLimitPolicy::new(u32::MAX, 1).exceeds_rate_of(&plan));
    }

    #[test]
    fn test_new_key_is_usable() {
        let key = create_test_api_key("test-key");
        assert!(key.is_active());
        assert_eq!(key.usage_count(), 0);
        assert!(key.check_usable(Utc::now()).is_ok());
    }

    #[test]
    fn test_expiry_is_strict() {
        let expires = Utc::now();
        let key = create_test_api_key("test-key").with_expiration(expires);

        assert!(key.check_usable(expires).is_ok());
        assert_eq!(
            key.check_usable(expires + Duration::milliseconds(1)),
            Err(KeyRejection::Expired)
        );
    }

    #[test]
    fn test_revocation_wins_over_expiry() {
        let now = Utc::now();
        let mut key = create_test_api_key("test-key").with_expiration(now - Duration::hours(1));
        key.revoke(now);

        assert_eq!(key.check_usable(now), Err(KeyRejection::Revoked));
    }

    #[test]
    fn test_revocation_survives_flag_flip() {
        let now = Utc::now();
        let mut key = create_test_api_key("test-key");
        key.revoke(now);
        key.force_active_flag(true);

        assert!(key.is_active());
        assert!(key.is_revoked());
        assert_eq!(key.check_usable(now), Err(KeyRejection::Revoked));
    }

    #[test]
    fn test_revoke_keeps_first_timestamp() {
        let first = Utc::now();
        let mut key = create_test_api_key("test-key");
        key.revoke(first);
        key.revoke(first + Duration::hours(1));

        assert_eq!(key.revoked_at(), Some(first));
    }

    #[test]
    fn test_record_usage() {
        let now = Utc::now();
        let mut key = create_test_api_key("test-key");

        key.record_usage(now);
        key.record_usage(now);

        assert_eq!(key.usage_count(), 2);
        assert_eq!(key.last_used_at(), Some(now));
    }
}
