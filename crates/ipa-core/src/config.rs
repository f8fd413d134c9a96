//! Engine configuration.
//!
//! Controls where entity containers are rooted and how long the engine waits on the
//! directory backend.

use crate::{dn::DistinguishedName, Error};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Default per-call backend timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default deadline for a whole membership batch (seconds).
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 60;
/// Default search size limit.
pub const DEFAULT_SEARCH_SIZE_LIMIT: usize = 100;
/// Default bound on nested group traversal.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

/// Configuration for the directory object engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Directory suffix every entity container is rooted under
    #[validate(length(min = 1))]
    pub base_dn: String,

    /// Per backend call timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Overall deadline for a membership batch in seconds
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    /// Search size limit applied when the caller does not supply one
    #[validate(range(min = 1, max = 100_000))]
    #[serde(default = "default_search_size_limit")]
    pub search_size_limit: usize,

    /// Maximum depth followed when tracing nested membership
    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

const fn default_batch_timeout_secs() -> u64 {
    DEFAULT_BATCH_TIMEOUT_SECS
}

const fn default_search_size_limit() -> usize {
    DEFAULT_SEARCH_SIZE_LIMIT
}

const fn default_max_nesting_depth() -> usize {
    DEFAULT_MAX_NESTING_DEPTH
}

impl EngineConfig {
    /// Create a configuration rooted at `base_dn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base DN does not parse or validation fails.
    pub fn new(base_dn: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            base_dn: base_dn.into(),
            operation_timeout_secs: default_operation_timeout_secs(),
            batch_timeout_secs: default_batch_timeout_secs(),
            search_size_limit: default_search_size_limit(),
            max_nesting_depth: default_max_nesting_depth(),
        };
        config.validate_config()?;
        Ok(config)
    }

    /// Set the per-call timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Set the membership batch deadline in seconds.
    #[must_use]
    pub const fn with_batch_timeout_secs(mut self, seconds: u64) -> Self {
        self.batch_timeout_secs = seconds;
        self
    }

    /// Set the default search size limit.
    #[must_use]
    pub const fn with_search_size_limit(mut self, limit: usize) -> Self {
        self.search_size_limit = limit;
        self
    }

    /// Set the maximum nesting depth traced during cycle detection.
    #[must_use]
    pub const fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Per-call timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Batch deadline as a Duration.
    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    /// Parse the base DN.
    ///
    /// # Errors
    ///
    /// Returns an error if the base DN is malformed.
    pub fn parse_base_dn(&self) -> Result<DistinguishedName, Error> {
        DistinguishedName::parse(&self.base_dn)
            .map_err(|e| Error::ConfigError(format!("Invalid base DN: {e}")))
    }

    /// Validate field ranges and the base DN syntax.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first problem found.
    pub fn validate_config(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        self.parse_base_dn()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("dc=example,dc=com").unwrap();
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
        assert_eq!(config.batch_timeout(), Duration::from_secs(60));
        assert_eq!(config.search_size_limit, 100);
        assert_eq!(config.max_nesting_depth, 64);
        assert_eq!(config.parse_base_dn().unwrap().as_str(), "dc=example,dc=com");
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::new("dc=example,dc=com")
            .unwrap()
            .with_operation_timeout_secs(2)
            .with_batch_timeout_secs(5)
            .with_search_size_limit(10)
            .with_max_nesting_depth(8);
        assert_eq!(config.operation_timeout(), Duration::from_secs(2));
        assert_eq!(config.batch_timeout(), Duration::from_secs(5));
        assert_eq!(config.search_size_limit, 10);
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            EngineConfig::new("not a dn"),
            Err(Error::ConfigError(_))
        ));

        let config = EngineConfig::new("dc=example,dc=com")
            .unwrap()
            .with_operation_timeout_secs(0);
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"base_dn": "dc=example,dc=com", "search_size_limit": 5}"#)
                .unwrap();
        assert_eq!(config.search_size_limit, 5);
        assert_eq!(config.operation_timeout_secs, 10);
        assert!(config.validate_config().is_ok());
    }
}
