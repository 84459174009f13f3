//! Batching buffer for bulk ingestion.
//!
//! Producers call [`Buffer::submit`] concurrently and receive a
//! [`CompletionHandle`] per item. A single background loop per buffer groups
//! queued items into batches and hands each batch to a [`Flusher`], which
//! performs one bulk write. The per-item outcome is delivered back to the
//! handle returned at submission.
//!
//! # Flush policy
//!
//! A batch is flushed as soon as one of these holds:
//!
//! - the queue holds `max_capacity` items,
//! - a submitter is waiting for byte space (`max_queued_bytes` reached),
//! - `flush_period` has elapsed since the oldest queued item was enqueued,
//! - [`Buffer::stop`] was called.
//!
//! # Backpressure
//!
//! The batch being flushed still counts against `max_capacity` and
//! `max_queued_bytes` until its handles resolve. `submit` blocks while the
//! buffer is full and fails with
//! [`BufferError::Backpressure`] once `submit_timeout` elapses. Items larger
//! than the byte ceiling are rejected up front with
//! [`BufferError::ItemTooLarge`].
//!
//! # Failure
//!
//! A failed flush poisons the buffer: every item of the failed batch
//! resolves to the same [`BufferError::Flush`], items still queued resolve to
//! [`BufferError::Aborted`], and nothing else reaches the flusher.
//!
//! ```ignore
//! let buffer = Buffer::new(BufferOpts::new("simple_writer"), flusher)?;
//! buffer.start();
//! let handle = buffer.submit(item).await?;
//! let persisted = handle.await?;
//! buffer.stop().await?;
//! ```

pub mod buffer;
pub mod error;
mod fanout;
pub mod handle;

pub use buffer::{Buffer, BufferOpts, BufferStats, FlushFailure, Flusher, ItemSize};
pub use error::{BufferError, ResultCountMismatch};
pub use handle::CompletionHandle;
