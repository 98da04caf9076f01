//! Token Bucket
//!
//! The admission primitive. Each bucket guards its own state with a
//! dedicated lock so refill-then-consume is a single atomic step and
//! unrelated buckets never contend.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use super::policy::BandwidthPolicy;

/// Outcome of a consume attempt, taken under a single lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionProbe {
    /// Whether the tokens were consumed
    pub consumed: bool,

    /// Tokens left after the attempt
    pub remaining: u64,

    /// Time until the next refill boundary (zero when consumed)
    pub wait: Duration,
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

impl BucketState {
    /// Add whole elapsed periods worth of tokens. `last_refill` only ever
    /// advances by whole periods, so it never moves past `now`.
    fn refill(&mut self, policy: &BandwidthPolicy, now: Instant) {
        let period = policy.refill_period().as_nanos();
        if period == 0 {
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        let periods = elapsed / period;
        if periods == 0 {
            return;
        }

        let added = u64::try_from(periods)
            .unwrap_or(u64::MAX)
            .saturating_mul(policy.refill_tokens);
        self.tokens = self.tokens.saturating_add(added).min(policy.capacity);

        let advance = u64::try_from(periods * period).unwrap_or(u64::MAX);
        self.last_refill += Duration::from_nanos(advance);

        debug_assert!(self.tokens <= policy.capacity);
        debug_assert!(self.last_refill <= now);
    }

    fn until_next_refill(&self, policy: &BandwidthPolicy, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_refill);
        policy.refill_period().saturating_sub(elapsed)
    }
}

/// Token bucket with interval refill
#[derive(Debug)]
pub struct TokenBucket {
    policy: BandwidthPolicy,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(policy: BandwidthPolicy) -> Self {
        Self::new_at(policy, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`
    pub fn new_at(policy: BandwidthPolicy, now: Instant) -> Self {
        Self {
            policy,
            state: Mutex::new(BucketState {
                tokens: policy.capacity,
                last_refill: now,
            }),
        }
    }

    /// Try to consume tokens
    ///
    /// Returns true if tokens were consumed, false (leaving the bucket
    /// untouched) if not enough are available.
    pub fn try_consume(&self, tokens: u64) -> bool {
        self.try_consume_at(tokens, Instant::now())
    }

    pub fn try_consume_at(&self, tokens: u64, now: Instant) -> bool {
        self.probe_at(tokens, now).consumed
    }

    /// Try to consume tokens, reporting what is left and how long to wait
    pub fn probe(&self, tokens: u64) -> ConsumptionProbe {
        self.probe_at(tokens, Instant::now())
    }

    pub fn probe_at(&self, tokens: u64, now: Instant) -> ConsumptionProbe {
        let mut state = self.state.lock();
        state.refill(&self.policy, now);

        if state.tokens >= tokens {
            state.tokens -= tokens;
            ConsumptionProbe {
                consumed: true,
                remaining: state.tokens,
                wait: Duration::ZERO,
            }
        } else {
            ConsumptionProbe {
                consumed: false,
                remaining: state.tokens,
                wait: state.until_next_refill(&self.policy, now),
            }
        }
    }

    /// Time remaining until the next refill boundary
    pub fn time_until_next_token(&self) -> Duration {
        self.time_until_next_token_at(Instant::now())
    }

    pub fn time_until_next_token_at(&self, now: Instant) -> Duration {
        let mut state = self.state.lock();
        state.refill(&self.policy, now);
        state.until_next_refill(&self.policy, now)
    }

    /// Get current token count
    pub fn available(&self) -> u64 {
        self.available_at(Instant::now())
    }

    pub fn available_at(&self, now: Instant) -> u64 {
        let mut state = self.state.lock();
        state.refill(&self.policy, now);
        state.tokens
    }

    pub fn capacity(&self) -> u64 {
        self.policy.capacity
    }

    pub fn policy(&self) -> &BandwidthPolicy {
        &self.policy
    }
}

/// Whole seconds a denied caller should wait, rounded up
pub fn retry_after_secs(wait: Duration) -> u64 {
    let nanos = wait.as_nanos();
    let secs = nanos.div_ceil(1_000_000_000);
    u64::try_from(secs).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(capacity: u64, refill_tokens: u64, period_secs: u64) -> BandwidthPolicy {
        BandwidthPolicy {
            capacity,
            refill_tokens,
            refill_period_secs: period_secs,
        }
    }

    #[test]
    fn test_token_bucket_creation() {
        let bucket = TokenBucket::new(policy(100, 100, 60));
        assert_eq!(bucket.available(), 100);
        assert_eq!(bucket.capacity(), 100);
    }

    #[test]
    fn test_token_bucket_consume() {
        let bucket = TokenBucket::new(policy(100, 100, 60));

        assert!(bucket.try_consume(50));
        assert_eq!(bucket.available(), 50);
    }

    #[test]
    fn test_token_bucket_insufficient() {
        let bucket = TokenBucket::new(policy(100, 100, 60));

        assert!(bucket.try_consume(100));
        assert!(!bucket.try_consume(1));
        assert_eq!(bucket.available(), 0);
    }

    #[test]
    fn test_failed_consume_leaves_tokens() {
        let bucket = TokenBucket::new(policy(5, 5, 60));

        assert!(!bucket.try_consume(6));
        assert_eq!(bucket.available(), 5);
    }

    #[test]
    fn test_no_refill_within_period() {
        let start = Instant::now();
        let bucket = TokenBucket::new_at(policy(3, 3, 300), start);

        for _ in 0..3 {
            assert!(bucket.try_consume_at(1, start));
        }

        let almost = start + Duration::from_secs(299);
        assert!(!bucket.try_consume_at(1, almost));
        assert_eq!(bucket.available_at(almost), 0);
    }

    #[test]
    fn test_refill_after_one_period() {
        let start = Instant::now();
        let bucket = TokenBucket::new_at(policy(10, 4, 60), start);
        assert!(bucket.try_consume_at(10, start));

        let later = start + Duration::from_secs(60);
        let probe = bucket.probe_at(1, later);
        assert!(probe.consumed);
        assert_eq!(probe.remaining, 3);
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let start = Instant::now();
        let bucket = TokenBucket::new_at(policy(5, 5, 60), start);
        assert!(bucket.try_consume_at(2, start));

        let much_later = start + Duration::from_secs(60 * 50);
        assert_eq!(bucket.available_at(much_later), 5);
    }

    #[test]
    fn test_refill_is_interval_based() {
        let start = Instant::now();
        let bucket = TokenBucket::new_at(policy(100, 100, 60), start);
        assert!(bucket.try_consume_at(100, start));

        // No prorated tokens half way through the period
        let half = start + Duration::from_secs(30);
        assert_eq!(bucket.available_at(half), 0);
    }

    #[test]
    fn test_partial_period_is_kept() {
        let start = Instant::now();
        let bucket = TokenBucket::new_at(policy(2, 1, 60), start);
        assert!(bucket.try_consume_at(2, start));

        // 90s: one refill at 60s, the next boundary is still at 120s
        let t = start + Duration::from_secs(90);
        assert_eq!(bucket.available_at(t), 1);
        assert_eq!(bucket.time_until_next_token_at(t), Duration::from_secs(30));

        assert_eq!(bucket.available_at(start + Duration::from_secs(120)), 2);
    }

    #[test]
    fn test_time_until_next_token() {
        let start = Instant::now();
        let bucket = TokenBucket::new_at(policy(3, 3, 300), start);
        assert!(bucket.try_consume_at(3, start));

        let t = start + Duration::from_secs(100);
        let probe = bucket.probe_at(1, t);
        assert!(!probe.consumed);
        assert_eq!(probe.wait, Duration::from_secs(200));
        assert_eq!(bucket.time_until_next_token_at(t), Duration::from_secs(200));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 0);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(200)), 200);
        assert_eq!(retry_after_secs(Duration::from_millis(200_001)), 201);
    }

    proptest! {
        #[test]
        fn prop_capacity_bound(
            capacity in 1u64..200,
            refill_tokens in 1u64..200,
            period_secs in 1u64..600,
            attempts in 0usize..400,
        ) {
            let start = Instant::now();
            let bucket = TokenBucket::new_at(policy(capacity, refill_tokens, period_secs), start);
            let window = Duration::from_secs(period_secs) - Duration::from_millis(1);

            let admitted = (0..attempts)
                .filter(|i| {
                    let offset = window.mul_f64(*i as f64 / attempts.max(1) as f64);
                    bucket.try_consume_at(1, start + offset)
                })
                .count() as u64;

            prop_assert!(admitted <= capacity);
            prop_assert_eq!(admitted, capacity.min(attempts as u64));
        }

        #[test]
        fn prop_refill_after_drain(
            capacity in 1u64..200,
            refill_tokens in 1u64..200,
            period_secs in 1u64..600,
        ) {
            let start = Instant::now();
            let bucket = TokenBucket::new_at(policy(capacity, refill_tokens, period_secs), start);
            prop_assert!(bucket.try_consume_at(capacity, start));

            let probe = bucket.probe_at(1, start + Duration::from_secs(period_secs));
            prop_assert!(probe.consumed);
            prop_assert_eq!(probe.remaining, refill_tokens.min(capacity) - 1);
        }
    }
}
