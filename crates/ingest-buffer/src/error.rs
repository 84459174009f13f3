//! Error types for the batching buffer.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`crate::Buffer`] and delivered through completion handles.
///
/// The type is `Clone` because a single flush failure is fanned out to every
/// handle of the failed batch.
#[derive(Error, Debug, Clone)]
pub enum BufferError {
    /// The buffer was stopped before the item was accepted.
    #[error("buffer '{buffer}' is closed")]
    Closed { buffer: String },

    /// No queue space became available within the submit timeout.
    #[error("buffer '{buffer}': no queue space after waiting {timeout:?}")]
    Backpressure { buffer: String, timeout: Duration },

    /// The item alone is larger than the queue byte ceiling.
    #[error("buffer '{buffer}': item of {size} bytes exceeds the {limit} byte queue limit")]
    ItemTooLarge {
        buffer: String,
        size: usize,
        limit: usize,
    },

    /// The bulk write for the item's batch failed.
    #[error("buffer '{buffer}': flush of {items} items failed")]
    Flush {
        buffer: String,
        items: usize,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// An earlier batch failed, so this item was never written.
    #[error("buffer '{buffer}' aborted after an earlier flush failure")]
    Aborted { buffer: String },

    /// The flush loop went away without resolving the item.
    #[error("completion dropped before the item was resolved")]
    Dropped,

    /// The flush loop task panicked or was cancelled.
    #[error("buffer '{buffer}': flush loop failed: {message}")]
    Worker { buffer: String, message: String },

    /// Rejected buffer configuration.
    #[error("invalid buffer options: {0}")]
    InvalidOptions(String),
}

impl BufferError {
    /// Whether the error originates from the storage backend rather than the
    /// buffer's own flow control.
    pub fn is_flush_failure(&self) -> bool {
        matches!(self, BufferError::Flush { .. } | BufferError::Aborted { .. })
    }
}

/// Returned when a flusher breaks the one-result-per-item contract.
#[derive(Error, Debug)]
#[error("flusher returned {actual} results for {expected} items")]
pub struct ResultCountMismatch {
    pub expected: usize,
    pub actual: usize,
}
