//! Bucket Registry
//!
//! Concurrent map from rate-limit key to its live token bucket. Buckets
//! are created lazily on first access and live until reset.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::bucket::TokenBucket;
use super::policy::BandwidthPolicy;

/// Point-in-time view of one bucket
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BucketSnapshot {
    /// Rate-limit key
    pub key: String,

    /// Maximum tokens
    pub capacity: u64,

    /// Tokens available right now
    pub tokens_available: u64,
}

/// Shared bucket registry.
///
/// Sharded, so lookups and inserts on unrelated keys do not contend.
/// Construct once at startup and hand it to the gate.
#[derive(Debug, Default)]
pub struct BucketRegistry {
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl BucketRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bucket for `key`, creating a full one from `policy` if absent.
    ///
    /// Creation happens under the key's shard lock, so concurrent first
    /// accesses all observe the same instance.
    pub fn get_or_create(&self, key: &str, policy: &BandwidthPolicy) -> Arc<TokenBucket> {
        self.get_or_create_at(key, policy, Instant::now())
    }

    pub fn get_or_create_at(
        &self,
        key: &str,
        policy: &BandwidthPolicy,
        now: Instant,
    ) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        let bucket = self.buckets.entry(key.to_string()).or_insert_with(|| {
            debug!(
                key,
                capacity = policy.capacity,
                refill_period_secs = policy.refill_period_secs,
                "Creating rate limit bucket"
            );
            Arc::new(TokenBucket::new_at(*policy, now))
        });
        Arc::clone(bucket.value())
    }

    /// Get a bucket if it exists
    pub fn get(&self, key: &str) -> Option<Arc<TokenBucket>> {
        self.buckets.get(key).map(|b| Arc::clone(b.value()))
    }

    /// Remove a bucket. Returns true if one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.buckets.remove(key).is_some()
    }

    /// Snapshot every bucket, sorted by key
    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let now = Instant::now();
        let mut buckets: Vec<BucketSnapshot> = self
            .buckets
            .iter()
            .map(|entry| BucketSnapshot {
                key: entry.key().clone(),
                capacity: entry.value().capacity(),
                tokens_available: entry.value().available_at(now),
            })
            .collect();
        buckets.sort_by(|a, b| a.key.cmp(&b.key));
        buckets
    }

    /// Clear all buckets
    pub fn clear(&self) {
        self.buckets.clear();
    }

    /// Get bucket count
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
