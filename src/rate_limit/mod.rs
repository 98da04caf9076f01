//! Rate Limiting Module
//!
//! Per-client, per-route rate limiting protecting the auth, upload, admin
//! and general API surfaces.
//!
//! # Features
//!
//! - Token bucket with interval refill
//! - Identity from bearer token fingerprint, forwarded-for, or peer address
//! - Route classification into a closed set of categories
//! - Optional per-method limits sharing the same registry
//! - Operator reset and dashboard snapshot
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Rate Limit Gate                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Identity    │  │ Category    │  │ Policy      │         │
//! │  │ Resolver    │  │ Classifier  │  │ Table       │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │     Bucket Registry (key -> Token Bucket)            │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bucket;
pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gate;
pub mod identity;
pub mod middleware;
pub mod policy;
pub mod registry;

pub use bucket::{ConsumptionProbe, TokenBucket};
pub use classifier::CategoryClassifier;
pub use config::{MethodLimit, RateLimitConfig};
pub use dashboard::DashboardData;
pub use error::{ConfigError, PolicyError};
pub use gate::{method_scope, rate_limit_key, Decision, RateLimitGate, METHOD_SCOPE_PREFIX};
pub use identity::{IdentityResolver, RequestMeta};
pub use middleware::{rate_limit_middleware, RateLimitRejection};
pub use policy::{BandwidthPolicy, PolicyTable, RouteCategory};
pub use registry::{BucketRegistry, BucketSnapshot};
