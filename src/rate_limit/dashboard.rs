//! Operator Dashboard Support
//!
//! Snapshot of live buckets for monitoring via the operator routes.

use serde::{Deserialize, Serialize};

use super::gate::RateLimitGate;
use super::policy::PolicyTable;
use super::registry::BucketSnapshot;

/// Dashboard data for the operator interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Whether rate limiting is enforced
    pub enabled: bool,

    /// Number of live buckets
    pub total_buckets: usize,

    /// Buckets with no tokens left
    pub exhausted_buckets: usize,

    /// Per-bucket state, sorted by key
    pub buckets: Vec<BucketSnapshot>,

    /// Category policies in effect
    pub policies: PolicyTable,
}

impl DashboardData {
    /// Build dashboard data from the gate's current state
    pub fn collect(gate: &RateLimitGate) -> Self {
        let buckets = gate.registry().snapshot();
        let exhausted_buckets = buckets.iter().filter(|b| b.tokens_available == 0).count();

        Self {
            timestamp: chrono::Utc::now(),
            enabled: gate.is_enabled(),
            total_buckets: buckets.len(),
            exhausted_buckets,
            buckets,
            policies: gate.policies().clone(),
        }
    }

    /// Buckets whose key starts with `identity`
    pub fn buckets_for(&self, identity: &str) -> Vec<&BucketSnapshot> {
        self.buckets
            .iter()
            .filter(|b| b.key.starts_with(identity))
            .collect()
    }
}
