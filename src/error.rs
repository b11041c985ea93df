//! Typed failures that callers classify rather than just report.

use std::path::PathBuf;
use std::time::Duration;

/// Failure of a single gateway call.
///
/// Every variant is treated as transient by the quote service and the pool
/// graph rebuild: the call is retried or the item skipped, never escalated.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("call reverted: {0}")]
    Reverted(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Classify a provider/contract error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("too many requests") || lower.contains("limit exceeded") {
            GatewayError::RateLimited(message)
        } else if lower.contains("revert") {
            GatewayError::Reverted(message)
        } else {
            GatewayError::Transport(message)
        }
    }

    /// Metric label for this failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Transport(_) => "transport",
            GatewayError::RateLimited(_) => "rate_limited",
            GatewayError::Reverted(_) => "reverted",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Decode(_) => "decode",
        }
    }
}

/// Failure to read or write a persisted cache blob.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file {path} could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}
