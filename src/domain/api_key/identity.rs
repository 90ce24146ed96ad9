//! Outcome types of API key verification

use serde::Serialize;

use super::entity::{ApiKeyId, ApiKeyPermissions, RateLimitPolicy};
use crate::domain::owner::{BillingPlan, OwnerId, OwnerRole};

/// Why a presented key was refused
///
/// Never disclosed to clients; all variants map to the same 401 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRejection {
    UnknownKey,
    Revoked,
    Expired,
}

impl KeyRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownKey => "unknown_key",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for KeyRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity resolved from an accepted key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub owner_id: OwnerId,
    pub key_id: ApiKeyId,
    pub role: OwnerRole,
    pub plan: BillingPlan,
    pub permissions: ApiKeyPermissions,
    pub policy: RateLimitPolicy,
}

impl VerifiedIdentity {
    /// Admins implicitly hold every permission
    pub fn allows(&self, permission: &str) -> bool {
        self.role.is_admin() || self.permissions.allows(permission)
    }

    /// Rate-limit bucket for this key
    pub fn bucket_key(&self) -> String {
        format!("key:{}", self.key_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: OwnerRole) -> VerifiedIdentity {
        VerifiedIdentity {
            owner_id: OwnerId::new("owner-1").unwrap(),
            key_id: ApiKeyId::new("key-1").unwrap(),
            role,
            plan: BillingPlan::Free,
            permissions: ApiKeyPermissions::new().with(ApiKeyPermissions::CHAT),
            policy: RateLimitPolicy::new(2, 60_000),
        }
    }

    #[test]
    fn test_member_permissions() {
        let member = identity(OwnerRole::Member);
        assert!(member.allows("chat"));
        assert!(!member.allows("keys:manage"));
    }

    #[test]
    fn test_admin_allows_everything() {
        assert!(identity(OwnerRole::Admin).allows("keys:manage"));
    }

    #[test]
    fn test_bucket_key_uses_key_id() {
        assert_eq!(identity(OwnerRole::Member).bucket_key(), "key:key-1");
    }

    #[test]
    fn test_rejection_strings() {
        assert_eq!(KeyRejection::UnknownKey.to_string(), "unknown_key");
        assert_eq!(KeyRejection::Revoked.to_string(), "revoked");
        assert_eq!(KeyRejection::Expired.to_string(), "expired");
    }
}
