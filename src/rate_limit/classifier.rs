//! Category Classifier
//!
//! Maps a request path to its route category. First match wins; anything
//! unmatched is `general`, so classification is total.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::policy::RouteCategory;

/// Path rules for route classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryClassifier {
    /// Paths starting with this are `auth`
    pub auth_prefix: String,

    /// Paths containing this are `upload`
    pub upload_segment: String,

    /// Paths starting with this are `admin`
    pub admin_prefix: String,
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self {
            auth_prefix: "/api/auth/".to_string(),
            upload_segment: "/upload".to_string(),
            admin_prefix: "/api/admin/".to_string(),
        }
    }
}

impl CategoryClassifier {
    /// Classify a path
    pub fn classify(&self, path: &str) -> RouteCategory {
        if path.starts_with(&self.auth_prefix) {
            RouteCategory::Auth
        } else if path.contains(&self.upload_segment) {
            RouteCategory::Upload
        } else if path.starts_with(&self.admin_prefix) {
            RouteCategory::Admin
        } else {
            RouteCategory::General
        }
    }

    /// Reject empty rules, which would swallow every path
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_prefix.is_empty() {
            return Err(ConfigError::EmptyClassifierRule(RouteCategory::Auth));
        }
        if self.upload_segment.is_empty() {
            return Err(ConfigError::EmptyClassifierRule(RouteCategory::Upload));
        }
        if self.admin_prefix.is_empty() {
            return Err(ConfigError::EmptyClassifierRule(RouteCategory::Admin));
        }
        Ok(())
    }
}
