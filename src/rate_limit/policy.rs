//! Bandwidth Policies
//!
//! Route categories and the static quota each one is bound to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::error::PolicyError;

/// Default quotas (tokens per refill period)
pub const DEFAULT_AUTH_CAPACITY: u64 = 5;
pub const DEFAULT_UPLOAD_CAPACITY: u64 = 3;
pub const DEFAULT_ADMIN_CAPACITY: u64 = 50;
pub const DEFAULT_GENERAL_CAPACITY: u64 = 100;

/// Route categories that can be rate-limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteCategory {
    /// Login, registration and token endpoints
    Auth,
    /// Media upload endpoints
    Upload,
    /// Administrative endpoints
    Admin,
    /// Everything else
    General,
}

impl RouteCategory {
    /// All categories, in classification precedence order
    pub const ALL: [RouteCategory; 4] = [
        RouteCategory::Auth,
        RouteCategory::Upload,
        RouteCategory::Admin,
        RouteCategory::General,
    ];

    /// Name used in rate-limit keys and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteCategory::Auth => "auth",
            RouteCategory::Upload => "upload",
            RouteCategory::Admin => "admin",
            RouteCategory::General => "general",
        }
    }
}

impl fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable quota for one bucket.
///
/// Refill is interval based: every `refill_period_secs` exactly
/// `refill_tokens` tokens are added at once, capped at `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthPolicy {
    /// Maximum tokens (burst size)
    pub capacity: u64,

    /// Tokens added per refill period
    pub refill_tokens: u64,

    /// Refill period in seconds
    pub refill_period_secs: u64,
}

impl BandwidthPolicy {
    /// Create a policy that refills to full every `period`
    pub fn per_period(capacity: u64, period: Duration) -> Self {
        Self {
            capacity,
            refill_tokens: capacity,
            refill_period_secs: period.as_secs(),
        }
    }

    /// Get refill duration
    pub fn refill_period(&self) -> Duration {
        Duration::from_secs(self.refill_period_secs)
    }

    /// Check the policy can ever admit and refill. `name` labels the error.
    pub fn validate(&self, name: &str) -> Result<(), PolicyError> {
        if self.capacity == 0 {
            return Err(PolicyError::ZeroCapacity(name.to_string()));
        }
        if self.refill_tokens == 0 {
            return Err(PolicyError::ZeroRefillTokens(name.to_string()));
        }
        if self.refill_period_secs == 0 {
            return Err(PolicyError::ZeroRefillPeriod(name.to_string()));
        }
        Ok(())
    }
}

/// One policy per route category.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    pub auth: BandwidthPolicy,
    pub upload: BandwidthPolicy,
    pub admin: BandwidthPolicy,
    pub general: BandwidthPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            auth: BandwidthPolicy::per_period(DEFAULT_AUTH_CAPACITY, Duration::from_secs(60)),
            upload: BandwidthPolicy::per_period(DEFAULT_UPLOAD_CAPACITY, Duration::from_secs(300)),
            admin: BandwidthPolicy::per_period(DEFAULT_ADMIN_CAPACITY, Duration::from_secs(60)),
            general: BandwidthPolicy::per_period(DEFAULT_GENERAL_CAPACITY, Duration::from_secs(60)),
        }
    }
}

impl PolicyTable {
    /// Policy bound to a category
    pub fn policy_for(&self, category: RouteCategory) -> &BandwidthPolicy {
        match category {
            RouteCategory::Auth => &self.auth,
            RouteCategory::Upload => &self.upload,
            RouteCategory::Admin => &self.admin,
            RouteCategory::General => &self.general,
        }
    }

    /// Validate every category's policy
    pub fn validate(&self) -> Result<(), PolicyError> {
        for category in RouteCategory::ALL {
            self.policy_for(category).validate(category.as_str())?;
        }
        Ok(())
    }
}
