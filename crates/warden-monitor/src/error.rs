//! Error types for warden-monitor.
//!
//! Every variant maps onto one failure class of the monitor: transient
//! fetches, single-pixel lookups, notification delivery and persistence are
//! contained where they happen; only configuration errors are fatal.

use std::path::PathBuf;

use thiserror::Error;
use warden_types::{ChannelId, Coordinate};

/// Errors raised by the monitoring pipeline.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The canvas tile could not be fetched or decoded.
    #[error("tile fetch failed: {0}")]
    TileFetch(String),

    /// The template image could not be read from disk.
    #[error("template load failed for {path}: {reason}")]
    TemplateLoad { path: PathBuf, reason: String },

    /// Ownership lookup for a single pixel failed.
    #[error("ownership lookup failed at {coordinate}: {reason}")]
    Lookup {
        coordinate: Coordinate,
        reason: String,
    },

    /// An external call exceeded its time budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// A message could not be delivered to a channel.
    #[error("notification to channel {channel} failed: {reason}")]
    Notification { channel: ChannelId, reason: String },

    /// The stats ledger could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Image encoding or decoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A cycle panicked and was unwound at the cycle boundary.
    #[error("cycle panicked: {0}")]
    CyclePanic(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MonitorError {
    /// Whether the error only invalidates the current cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MonitorError::TileFetch(_)
                | MonitorError::TemplateLoad { .. }
                | MonitorError::Timeout { .. }
                | MonitorError::Image(_)
        )
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Persistence(err.to_string())
    }
}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(MonitorError::TileFetch("502".into()).is_transient());
        assert!(MonitorError::Timeout {
            operation: "tile fetch",
            timeout_ms: 15_000
        }
        .is_transient());
        assert!(!MonitorError::Persistence("disk full".into()).is_transient());
        assert!(!MonitorError::Config("no channels".into()).is_transient());
        assert!(!MonitorError::CyclePanic("index out of bounds".into()).is_transient());
    }
}
