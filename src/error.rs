//! Error types for stream pipelines.
//!
//! Every subscription yields `StreamResult<T>` items, so production
//! failures and teardown travel in-band to the consumer instead of dying
//! inside a background task.

use thiserror::Error;

/// Errors surfaced by sources, operators and terminal collectors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// `reduce` was applied to a subscription that completed without
    /// emitting a single value.
    #[error("cannot reduce an empty sequence")]
    EmptyReduction,

    /// The owning scope tore down while the pipeline was suspended.
    #[error("pipeline cancelled")]
    Cancelled,

    /// The producer failed while computing a value.
    #[error("production failed: {0}")]
    Production(String),
}

impl StreamError {
    /// Shorthand for a production failure with a formatted message.
    pub fn production(message: impl Into<String>) -> Self {
        StreamError::Production(message.into())
    }

    /// True for teardown signals, which are logged rather than reported
    /// as failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

/// Type alias for Results carrying a [`StreamError`].
pub type StreamResult<T> = Result<T, StreamError>;
