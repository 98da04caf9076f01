// Prometheus metrics for the Encore gateway
//
// Exposes metrics on /metrics HTTP endpoint:
// - Admission decisions by category and outcome (counter)
// - Operator resets (counter)
// - Live buckets (gauge)

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use crate::rate_limit::Decision;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_decisions_total", "Rate limit decisions by category and outcome"),
        &["category", "outcome"]
    ).expect("Failed to create rate limit decisions metric");

    pub static ref RATE_LIMIT_RESETS_TOTAL: IntCounter = IntCounter::new(
        "rate_limit_resets_total",
        "Total number of operator rate limit resets"
    ).expect("Failed to create rate limit resets metric");

    pub static ref RATE_LIMIT_ACTIVE_BUCKETS: IntGauge = IntGauge::new(
        "rate_limit_active_buckets",
        "Number of live rate limit buckets"
    ).expect("Failed to create active buckets metric");
}

/// Initialize metrics registry. Safe to call more than once.
pub fn init() -> prometheus::Result<()> {
    let collectors: [Box<dyn Collector>; 3] = [
        Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()),
        Box::new(RATE_LIMIT_RESETS_TOTAL.clone()),
        Box::new(RATE_LIMIT_ACTIVE_BUCKETS.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Count one admission decision
pub fn record_decision(decision: &Decision) {
    let category = decision.category.map(|c| c.as_str()).unwrap_or("method");
    let outcome = if decision.allowed { "allowed" } else { "denied" };
    RATE_LIMIT_DECISIONS_TOTAL
        .with_label_values(&[category, outcome])
        .inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{RateLimitGate, RequestMeta};

    #[test]
    fn test_record_decision() {
        let gate = RateLimitGate::default_config();
        let decision = gate.admit(&RequestMeta::new("/api/admin/users", "10.9.9.9"));

        let before = RATE_LIMIT_DECISIONS_TOTAL
            .with_label_values(&["admin", "allowed"])
            .get();
        record_decision(&decision);
        let after = RATE_LIMIT_DECISIONS_TOTAL
            .with_label_values(&["admin", "allowed"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_gather_metrics() {
        assert!(init().is_ok());
        assert!(init().is_ok());

        RATE_LIMIT_RESETS_TOTAL.inc();
        let text = gather_metrics().unwrap();
        assert!(text.contains("rate_limit_resets_total"));
    }
}
