//! Owner entity, roles and billing plans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::api_key::RateLimitPolicy;
use crate::domain::DomainError;

const MAX_OWNER_ID_LENGTH: usize = 64;

/// Owner identifier as issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new OwnerId after validation
    ///
    /// Accepts 1-64 ASCII alphanumerics, hyphens and underscores.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if id.is_empty() {
            return Err(DomainError::invalid_id("Owner ID cannot be empty"));
        }

        if id.len() > MAX_OWNER_ID_LENGTH {
            return Err(DomainError::invalid_id(format!(
                "Owner ID exceeds maximum length of {} characters",
                MAX_OWNER_ID_LENGTH
            )));
        }

        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(DomainError::invalid_id(format!(
                "Owner ID contains invalid character: '{}'",
                c
            )));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of an owner account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRole {
    #[default]
    Member,
    Admin,
}

impl OwnerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Billing tier of an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPlan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl BillingPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// Rate limit applied to new keys when the caller does not pick one
    pub fn default_rate_limit(&self) -> RateLimitPolicy {
        match self {
            Self::Free => RateLimitPolicy::new(60, 60_000),
            Self::Pro => RateLimitPolicy::new(600, 60_000),
            Self::Enterprise => RateLimitPolicy::new(6_000, 60_000),
        }
    }

    /// Token price in micro-dollars per 1K tokens
    pub fn price_per_1k_tokens_micros(&self) -> i64 {
        match self {
            Self::Free => 2_000,
            Self::Pro => 1_500,
            Self::Enterprise => 1_000,
        }
    }

    /// Cost of `tokens` under this plan, in micro-dollars
    pub fn cost_micros(&self, tokens: u64) -> i64 {
        (tokens as i64).saturating_mul(self.price_per_1k_tokens_micros()) / 1000
    }
}

impl std::fmt::Display for BillingPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account that owns API keys and usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    id: OwnerId,
    email: String,
    role: OwnerRole,
    plan: BillingPlan,
    created_at: DateTime<Utc>,
}

impl Owner {
    pub fn new(id: OwnerId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            role: OwnerRole::default(),
            plan: BillingPlan::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_role(mut self, role: OwnerRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_plan(mut self, plan: BillingPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> &OwnerId {
        &self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> OwnerRole {
        self.role
    }

    pub fn plan(&self) -> BillingPlan {
        self.plan
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_plan(&mut self, plan: BillingPlan) {
        self.plan = plan;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_valid() {
        assert!(OwnerId::new("user_2abcDEF").is_ok());
        assert!(OwnerId::new("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn test_owner_id_invalid() {
        assert!(OwnerId::new("").is_err());
        assert!(OwnerId::new("has space").is_err());
        assert!(OwnerId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_plan_defaults() {
        assert_eq!(BillingPlan::Free.default_rate_limit().limit, 60);
        assert_eq!(BillingPlan::Pro.default_rate_limit().limit, 600);
        assert_eq!(BillingPlan::Enterprise.default_rate_limit().window_ms, 60_000);
    }

    #[test]
    fn test_plan_cost() {
        assert_eq!(BillingPlan::Free.cost_micros(1000), 2000);
        assert_eq!(BillingPlan::Pro.cost_micros(2000), 3000);
        assert_eq!(BillingPlan::Enterprise.cost_micros(500), 500);
        assert_eq!(BillingPlan::Free.cost_micros(0), 0);
    }

    #[test]
    fn test_plan_parse_round_trip() {
        for plan in [BillingPlan::Free, BillingPlan::Pro, BillingPlan::Enterprise] {
            assert_eq!(BillingPlan::parse(plan.as_str()), Some(plan));
        }
        assert_eq!(BillingPlan::parse("gold"), None);
    }

    #[test]
    fn test_owner_builder() {
        let owner = Owner::new(OwnerId::new("owner-1").unwrap(), "a@example.com")
            .with_role(OwnerRole::Admin)
            .with_plan(BillingPlan::Pro);

        assert!(owner.role().is_admin());
        assert_eq!(owner.plan(), BillingPlan::Pro);
        assert_eq!(owner.email(), "a@example.com");
    }
}
