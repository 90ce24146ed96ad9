//! Usage record entities

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::api_key::ApiKeyId;
use crate::domain::owner::{BillingPlan, OwnerId};

/// Unique identifier for a usage record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageRecordId(String);

impl UsageRecordId {
    /// Create a new usage record ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique ID
    pub fn generate() -> Self {
        Self(format!("usage-{}", uuid::Uuid::new_v4()))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UsageRecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UsageRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller metadata captured at the edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// One handled, authenticated request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    id: UsageRecordId,
    pub owner_id: OwnerId,
    pub api_key_id: ApiKeyId,
    /// Route path, e.g. `/v1/chat/completions`
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub tokens: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub client: ClientMetadata,
}

impl UsageRecord {
    /// Create a new usage record
    pub fn new(
        owner_id: OwnerId,
        api_key_id: ApiKeyId,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UsageRecordId::generate(),
            owner_id,
            api_key_id,
            endpoint: endpoint.into(),
            method: method.into(),
            status_code: 200,
            latency_ms: 0,
            tokens: 0,
            timestamp,
            client: ClientMetadata::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<UsageRecordId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_latency_ms(mut self, latency: u64) -> Self {
        self.latency_ms = latency;
        self
    }

    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = client;
        self
    }

    /// Get the record ID
    pub fn id(&self) -> &UsageRecordId {
        &self.id
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// 4xx or 5xx status
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

impl From<String> for UsageRecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Half-open time range `[from, to)` for usage queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl UsageWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The `days` days ending at `now`
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self::new(now - chrono::Duration::days(days), now)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// Aggregated usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    /// 2xx responses
    pub success_count: u64,
    /// 4xx and 5xx responses
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub total_tokens: u64,
    /// Cost in micro-dollars under the owner's current plan
    pub total_cost_micros: i64,
}

impl UsageStats {
    /// Create empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a usage record to the aggregate
    pub fn add_record(&mut self, record: &UsageRecord) {
        self.total_requests += 1;

        if record.is_success() {
            self.success_count += 1;
        } else if record.is_error() {
            self.error_count += 1;
        }

        self.total_tokens += u64::from(record.tokens);

        // Update running average latency
        let prev_total = self.avg_latency_ms * (self.total_requests - 1) as f64;
        self.avg_latency_ms = (prev_total + record.latency_ms as f64) / self.total_requests as f64;
    }

    /// Price the token total under `plan`
    pub fn priced(mut self, plan: BillingPlan) -> Self {
        self.total_cost_micros = plan.cost_micros(self.total_tokens);
        self
    }

    /// Get total cost in USD
    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_micros as f64 / 1_000_000.0
    }
}

/// Usage bucketed per UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub requests: u64,
    pub tokens: u64,
    pub errors: u64,
}

impl DailyUsage {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            requests: 0,
            tokens: 0,
            errors: 0,
        }
    }

    pub fn add_record(&mut self, record: &UsageRecord) {
        self.requests += 1;
        self.tokens += u64::from(record.tokens);
        if record.is_error() {
            self.errors += 1;
        }
    }
}
