//! Identity Resolution
//!
//! Derives the client identity a request is rate-limited under.

use serde::{Deserialize, Serialize};

/// Default number of bearer token characters used as the identity fingerprint
pub const DEFAULT_TOKEN_PREFIX_LEN: usize = 13;

const BEARER_PREFIX: &str = "Bearer ";

/// The per-request inputs the rate limiter consumes from the HTTP layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Route path
    pub path: String,

    /// HTTP method (not used for policy selection)
    pub method: String,

    /// `Authorization` header value
    pub authorization: Option<String>,

    /// `X-Forwarded-For` header value
    pub forwarded_for: Option<String>,

    /// Peer socket address
    pub remote_addr: String,
}

impl RequestMeta {
    /// Create a request with only a path and peer address
    pub fn new(path: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: "GET".to_string(),
            remote_addr: remote_addr.into(),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }
}

/// Resolves a stable client identity.
///
/// Precedence: bearer token fingerprint, then the leftmost
/// `X-Forwarded-For` address, then the socket address. The token is not
/// verified; only a fixed-length prefix is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityResolver {
    token_prefix_len: usize,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_PREFIX_LEN)
    }
}

impl IdentityResolver {
    pub fn new(token_prefix_len: usize) -> Self {
        Self { token_prefix_len }
    }

    /// Resolve the identity for a request
    pub fn resolve(&self, request: &RequestMeta) -> String {
        if let Some(fingerprint) = request
            .authorization
            .as_deref()
            .and_then(|value| self.token_fingerprint(value))
        {
            return format!("user:{}", fingerprint);
        }

        if let Some(addr) = request.forwarded_for.as_deref().and_then(first_forwarded) {
            return format!("ip:{}", addr);
        }

        let remote = request.remote_addr.trim();
        if remote.is_empty() {
            "ip:unknown".to_string()
        } else {
            format!("ip:{}", remote)
        }
    }

    fn token_fingerprint<'a>(&self, header: &'a str) -> Option<&'a str> {
        let token = header.strip_prefix(BEARER_PREFIX)?;
        if token.trim().is_empty() {
            return None;
        }

        let end = token
            .char_indices()
            .nth(self.token_prefix_len)
            .map(|(i, _)| i)
            .unwrap_or(token.len());
        Some(&token[..end])
    }
}

/// Leftmost address of a forwarded-for list, if non-empty
fn first_forwarded(header: &str) -> Option<&str> {
    let first = header.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first)
    }
}
