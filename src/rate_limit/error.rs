//! Rate Limit Error Types
//!
//! Errors raised while building policies from configuration. Exceeding a
//! limit is not an error: the gate reports it as a [`Decision`](super::Decision).

use super::policy::RouteCategory;

/// Error types for bandwidth policy validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Bucket would never admit anything
    #[error("Policy '{0}' has zero capacity")]
    ZeroCapacity(String),

    /// Bucket would never refill
    #[error("Policy '{0}' refills zero tokens per period")]
    ZeroRefillTokens(String),

    /// Refill period must be at least one second
    #[error("Policy '{0}' has a zero refill period")]
    ZeroRefillPeriod(String),
}

/// Error types for rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A category or method policy is invalid
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A classifier rule is empty and would match every path
    #[error("Classifier rule for '{0}' is empty")]
    EmptyClassifierRule(RouteCategory),

    /// Identity fingerprint would be empty
    #[error("Token prefix length must be > 0")]
    ZeroTokenPrefix,
}
