//! Encore Gateway Library
//!
//! Rate limiting front gate for the Encore music backend: per-client,
//! per-route token buckets, the axum middleware that enforces them, and the
//! operator surface for inspecting and resetting buckets.

pub mod config;
pub mod metrics;
pub mod rate_limit;
pub mod server;
