//! Batch stream configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a stream yields for a source without records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySourcePolicy {
    /// Exactly one batch whose declared columns are all present and empty
    #[default]
    EmitEmptyBatch,

    /// No batches at all
    EmitNothing,
}

/// Configuration for a batch stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Number of records per batch; the last batch may be shorter
    pub batch_size: usize,

    /// Behavior for a source with zero records
    pub empty_source_policy: EmptySourcePolicy,

    /// Emit a trace event for every batch
    pub log_batches: bool,

    /// Batches prepared ahead of the consumer on a background thread; 0 disables
    pub prefetch: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            empty_source_policy: EmptySourcePolicy::EmitEmptyBatch,
            log_batches: true,
            prefetch: 0,
        }
    }
}

impl StreamConfig {
    /// Create a configuration with the given batch size
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    /// Set the empty-source policy
    #[must_use]
    pub fn with_empty_source_policy(mut self, policy: EmptySourcePolicy) -> Self {
        self.empty_source_policy = policy;
        self
    }

    /// Enable or disable per-batch trace events
    #[must_use]
    pub fn with_log_batches(mut self, log_batches: bool) -> Self {
        self.log_batches = log_batches;
        self
    }

    /// Prepare up to `prefetch` batches ahead of the consumer
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Parse a configuration from JSON; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check the configuration for values no stream can honor
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.empty_source_policy, EmptySourcePolicy::EmitEmptyBatch);
        assert!(config.log_batches);
        assert_eq!(config.prefetch, 0);
    }

    #[test]
    fn test_from_json() {
        let config = StreamConfig::from_json_str(
            r#"{"batch_size": 100, "empty_source_policy": "emit_nothing", "prefetch": 2}"#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.empty_source_policy, EmptySourcePolicy::EmitNothing);
        assert_eq!(config.prefetch, 2);
        assert!(config.log_batches);

        assert!(matches!(
            StreamConfig::from_json_str(r#"{"batch_size": 0}"#),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            StreamConfig::from_json_str("{batch_size"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StreamConfig::from_file("/nonexistent/colstream.json"),
            Err(Error::Io(_))
        ));
    }
}
