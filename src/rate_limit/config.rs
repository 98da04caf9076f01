//! Rate Limit Configuration
//!
//! Configuration for the rate limit gate: category policies, classifier
//! rules, identity fingerprinting and per-method limits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::classifier::CategoryClassifier;
use super::error::ConfigError;
use super::identity::DEFAULT_TOKEN_PREFIX_LEN;
use super::policy::{BandwidthPolicy, PolicyTable};

/// Default per-method limit (requests per window)
pub const DEFAULT_METHOD_REQUESTS: u64 = 10;
pub const DEFAULT_METHOD_WINDOW_SECS: u64 = 60;

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Bearer token characters kept as the identity fingerprint
    pub token_prefix_len: usize,

    /// Token operator routes must present; operator routes are closed when unset
    pub admin_token: Option<String>,

    /// Quota per route category
    pub policies: PolicyTable,

    /// Path rules for route classification
    pub classifier: CategoryClassifier,

    /// Named per-method limits
    pub methods: HashMap<String, MethodLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_prefix_len: DEFAULT_TOKEN_PREFIX_LEN,
            admin_token: None,
            policies: PolicyTable::default(),
            classifier: CategoryClassifier::default(),
            methods: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Validate policies, classifier rules and method limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_prefix_len == 0 {
            return Err(ConfigError::ZeroTokenPrefix);
        }
        self.policies.validate()?;
        self.classifier.validate()?;
        for (name, limit) in &self.methods {
            limit.policy().validate(name)?;
        }
        Ok(())
    }
}

/// Limit attached to a single handler rather than a route category.
///
/// Keyed as `identity:<key>` (or `identity:<method name>` when no key is
/// given) and refilled to full every window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodLimit {
    /// Requests allowed per window
    pub requests: u64,

    /// Window length in seconds
    pub window_secs: u64,

    /// Key override shared by several methods
    pub key: Option<String>,
}

impl Default for MethodLimit {
    fn default() -> Self {
        Self {
            requests: DEFAULT_METHOD_REQUESTS,
            window_secs: DEFAULT_METHOD_WINDOW_SECS,
            key: None,
        }
    }
}

impl MethodLimit {
    pub fn new(requests: u64, window_secs: u64) -> Self {
        Self {
            requests,
            window_secs,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Bucket policy for this limit
    pub fn policy(&self) -> BandwidthPolicy {
        BandwidthPolicy::per_period(self.requests, Duration::from_secs(self.window_secs))
    }

    /// Key scope: the override if set, else the method name
    pub fn scope<'a>(&'a self, method_name: &'a str) -> &'a str {
        match self.key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => method_name,
        }
    }
}
