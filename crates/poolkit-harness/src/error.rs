//! Harness-side failures.

use thiserror::Error;

/// Errors surfaced by the harness itself (never by the allocator hot path).
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Writing a report to disk or stdout failed.
    #[error("failed to emit report: {0}")]
    Emit(#[from] std::io::Error),

    /// Serializing a report failed.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A scenario was asked to run with an unusable configuration.
    #[error("invalid scenario configuration: {reason}")]
    InvalidConfig {
        /// Human-readable rejection reason.
        reason: String,
    },
}
