//! Rate Limit Gate
//!
//! The request-time decision point. Classifies the route, resolves the
//! client identity, and consumes one token from the matching bucket.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::bucket::{retry_after_secs, ConsumptionProbe};
use super::config::{MethodLimit, RateLimitConfig};
use super::identity::{IdentityResolver, RequestMeta};
use super::policy::{BandwidthPolicy, PolicyTable, RouteCategory};
use super::registry::BucketRegistry;

/// Result of an admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Seconds until the bucket next refills (0 when allowed)
    pub retry_after_secs: u64,

    /// Tokens left after this request
    pub remaining: u64,

    /// Bucket capacity
    pub limit: u64,

    /// Rate-limit key the request was charged to
    pub key: String,

    /// Route category (absent for method-scoped limits)
    pub category: Option<RouteCategory>,
}

impl Decision {
    fn from_probe(
        key: String,
        category: Option<RouteCategory>,
        policy: &BandwidthPolicy,
        probe: ConsumptionProbe,
    ) -> Self {
        Self {
            allowed: probe.consumed,
            retry_after_secs: if probe.consumed {
                0
            } else {
                retry_after_secs(probe.wait).max(1)
            },
            remaining: probe.remaining,
            limit: policy.capacity,
            key,
            category,
        }
    }

    fn unlimited(key: String, category: Option<RouteCategory>) -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
            remaining: u64::MAX,
            limit: u64::MAX,
            key,
            category,
        }
    }
}

/// Prefix separating method scopes from category names in the key space
pub const METHOD_SCOPE_PREFIX: &str = "method:";

/// Build a rate-limit key from an identity and a scope (category or method)
pub fn rate_limit_key(identity: &str, scope: &str) -> String {
    format!("{}:{}", identity, scope)
}

/// Key scope for a method limit. Never equal to a category name.
pub fn method_scope(limit: &MethodLimit, method_name: &str) -> String {
    format!("{}{}", METHOD_SCOPE_PREFIX, limit.scope(method_name))
}

/// Rate limit gate
#[derive(Debug)]
pub struct RateLimitGate {
    config: RateLimitConfig,
    resolver: IdentityResolver,
    registry: Arc<BucketRegistry>,
}

impl RateLimitGate {
    /// Create a gate over an existing registry
    pub fn new(config: RateLimitConfig, registry: Arc<BucketRegistry>) -> Self {
        Self {
            resolver: IdentityResolver::new(config.token_prefix_len),
            config,
            registry,
        }
    }

    /// Create with default configuration and a fresh registry
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default(), Arc::new(BucketRegistry::new()))
    }

    /// Create a gate that admits everything (for testing)
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled(), Arc::new(BucketRegistry::new()))
    }

    /// Decide whether a request may proceed
    pub fn admit(&self, request: &RequestMeta) -> Decision {
        self.admit_at(request, Instant::now())
    }

    pub fn admit_at(&self, request: &RequestMeta, now: Instant) -> Decision {
        let category = self.config.classifier.classify(&request.path);
        let identity = self.resolver.resolve(request);
        let key = rate_limit_key(&identity, category.as_str());
        let policy = *self.config.policies.policy_for(category);

        self.check(key, Some(category), &policy, now)
    }

    /// Decide whether a call to a specific handler may proceed
    pub fn admit_method(
        &self,
        request: &RequestMeta,
        method_name: &str,
        limit: &MethodLimit,
    ) -> Decision {
        self.admit_method_at(request, method_name, limit, Instant::now())
    }

    pub fn admit_method_at(
        &self,
        request: &RequestMeta,
        method_name: &str,
        limit: &MethodLimit,
        now: Instant,
    ) -> Decision {
        let identity = self.resolver.resolve(request);
        let key = rate_limit_key(&identity, &method_scope(limit, method_name));

        self.check(key, None, &limit.policy(), now)
    }

    fn check(
        &self,
        key: String,
        category: Option<RouteCategory>,
        policy: &BandwidthPolicy,
        now: Instant,
    ) -> Decision {
        if !self.config.enabled {
            return Decision::unlimited(key, category);
        }

        let bucket = self.registry.get_or_create_at(&key, policy, now);
        let probe = bucket.probe_at(1, now);
        let decision = Decision::from_probe(key, category, bucket.policy(), probe);

        if decision.allowed {
            debug!(
                key = %decision.key,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
        } else {
            warn!(
                key = %decision.key,
                retry_after_secs = decision.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Drop the bucket for `key`; the next request starts from a full bucket.
    ///
    /// Returns true if a bucket existed.
    pub fn reset(&self, key: &str) -> bool {
        let removed = self.registry.remove(key);
        info!(key, removed, "Rate limit reset");
        removed
    }

    /// Classify a path with the configured rules
    pub fn classify(&self, path: &str) -> RouteCategory {
        self.config.classifier.classify(path)
    }

    /// Look up a configured per-method limit
    pub fn method_limit(&self, name: &str) -> Option<&MethodLimit> {
        self.config.methods.get(name)
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.config.policies
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the bucket registry (for the dashboard)
    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn upload_gate() -> RateLimitGate {
        let mut config = RateLimitConfig::default();
        config.policies.upload = BandwidthPolicy {
            capacity: 3,
            refill_tokens: 3,
            refill_period_secs: 300,
        };
        RateLimitGate::new(config, Arc::new(BucketRegistry::new()))
    }

    #[test]
    fn test_gate_creation() {
        let gate = RateLimitGate::default_config();
        assert!(gate.is_enabled());
        assert!(gate.registry().is_empty());
    }

    #[test]
    fn test_admit_builds_key() {
        let gate = RateLimitGate::default_config();
        let request = RequestMeta::new("/api/auth/login", "10.1.1.1");

        let decision = gate.admit(&request);
        assert!(decision.allowed);
        assert_eq!(decision.key, "ip:10.1.1.1:auth");
        assert_eq!(decision.category, Some(RouteCategory::Auth));
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.retry_after_secs, 0);
    }

    #[test]
    fn test_upload_scenario() {
        let gate = upload_gate();
        let request = RequestMeta::new("/api/songs/upload", "10.0.0.9").with_method("POST");
        let start = Instant::now();

        for _ in 0..3 {
            assert!(gate.admit_at(&request, start).allowed);
        }

        let denied = gate.admit_at(&request, start + Duration::from_secs(10));
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs > 0);
        assert!(denied.retry_after_secs <= 300);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn test_denied_does_not_consume() {
        let gate = upload_gate();
        let request = RequestMeta::new("/api/songs/upload", "10.0.0.9");
        let start = Instant::now();

        for _ in 0..10 {
            gate.admit_at(&request, start);
        }

        // One refill later exactly three more are admitted
        let later = start + Duration::from_secs(301);
        let admitted = (0..10)
            .filter(|_| gate.admit_at(&request, later).allowed)
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_categories_are_independent() {
        let gate = upload_gate();
        let upload = RequestMeta::new("/api/songs/upload", "10.0.0.9");
        let general = RequestMeta::new("/api/songs", "10.0.0.9");

        for _ in 0..3 {
            gate.admit(&upload);
        }
        assert!(!gate.admit(&upload).allowed);
        assert!(gate.admit(&general).allowed);
    }

    #[test]
    fn test_identities_are_independent() {
        let gate = upload_gate();
        let a = RequestMeta::new("/api/songs/upload", "10.0.0.1");
        let b = RequestMeta::new("/api/songs/upload", "10.0.0.1").with_authorization("Bearer token-b");

        for _ in 0..3 {
            gate.admit(&a);
        }
        assert!(!gate.admit(&a).allowed);

        let decision = gate.admit(&b);
        assert!(decision.allowed);
        assert_eq!(decision.key, "user:token-b:upload");
    }

    #[test]
    fn test_reset_restores_full_capacity() {
        let gate = upload_gate();
        let request = RequestMeta::new("/api/songs/upload", "10.0.0.9");

        for _ in 0..3 {
            gate.admit(&request);
        }
        assert!(!gate.admit(&request).allowed);

        assert!(gate.reset("ip:10.0.0.9:upload"));
        let decision = gate.admit(&request);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);

        assert!(!gate.reset("ip:10.0.0.9:unknown"));
    }

    #[test]
    fn test_disabled_allows_all() {
        let gate = RateLimitGate::disabled();
        let request = RequestMeta::new("/api/auth/login", "10.0.0.9");

        for _ in 0..200 {
            assert!(gate.admit(&request).allowed);
        }
        assert!(gate.registry().is_empty());
    }

    #[test]
    fn test_method_limits() {
        let gate = RateLimitGate::default_config();
        let request = RequestMeta::new("/api/songs", "10.0.0.9");
        let limit = MethodLimit::new(2, 60);

        let first = gate.admit_method(&request, "createSong", &limit);
        assert!(first.allowed);
        assert_eq!(first.key, "ip:10.0.0.9:method:createSong");
        assert_eq!(first.category, None);

        assert!(gate.admit_method(&request, "createSong", &limit).allowed);
        let denied = gate.admit_method(&request, "createSong", &limit);
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs >= 1 && denied.retry_after_secs <= 60);

        // Category bucket is separate from the method bucket
        assert!(gate.admit(&request).allowed);
    }

    #[test]
    fn test_method_limit_shared_key() {
        let gate = RateLimitGate::default_config();
        let request = RequestMeta::new("/api/songs", "10.0.0.9");
        let limit = MethodLimit::new(1, 60).with_key("songs-write");

        assert!(gate.admit_method(&request, "createSong", &limit).allowed);
        let denied = gate.admit_method(&request, "deleteSong", &limit);
        assert!(!denied.allowed);
        assert_eq!(denied.key, "ip:10.0.0.9:method:songs-write");
    }

    #[test]
    fn test_method_named_after_category_keeps_own_bucket() {
        let gate = RateLimitGate::default_config();
        let request = RequestMeta::new("/api/songs", "10.0.0.9");
        let limit = MethodLimit::new(1, 60);

        let method = gate.admit_method(&request, "general", &limit);
        assert!(method.allowed);
        assert_eq!(method.key, "ip:10.0.0.9:method:general");
        assert!(!gate.admit_method(&request, "general", &limit).allowed);

        for expected_remaining in [99, 98] {
            let decision = gate.admit(&request);
            assert!(decision.allowed);
            assert_eq!(decision.key, "ip:10.0.0.9:general");
            assert_eq!(decision.limit, 100);
            assert_eq!(decision.remaining, expected_remaining);
        }
    }

    #[test]
    fn test_method_key_override_cannot_widen_category() {
        let gate = RateLimitGate::default_config();
        let request = RequestMeta::new("/api/songs/upload", "10.0.0.9");
        let limit = MethodLimit::new(100, 60).with_key("upload");

        assert!(gate.admit_method(&request, "storeSong", &limit).allowed);

        let decision = gate.admit(&request);
        assert_eq!(decision.key, "ip:10.0.0.9:upload");
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn test_configured_method_limit_lookup() {
        let mut config = RateLimitConfig::default();
        config
            .methods
            .insert("search".to_string(), MethodLimit::new(60, 60));
        let gate = RateLimitGate::new(config, Arc::new(BucketRegistry::new()));

        assert_eq!(gate.method_limit("search").map(|l| l.requests), Some(60));
        assert!(gate.method_limit("missing").is_none());
    }

    #[test]
    fn test_rate_limit_key() {
        assert_eq!(rate_limit_key("ip:1.2.3.4", "general"), "ip:1.2.3.4:general");
    }
}
