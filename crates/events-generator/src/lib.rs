//! Synthetic workload generator for the events tables.
//!
//! Every workload is shaped by `(tenants, resources, count)`: for each tenant
//! a fresh id is drawn, for each resource of that tenant another id, and then
//! `count` items are produced for the `(tenant, resource)` pair. Ids come from
//! a seeded RNG, so the same seed yields the same ids.
//!
//! ```text
//! tenant 0 ── resource 0 ── item 0 .. count-1
//!          └─ resource 1 ── item 0 .. count-1
//! tenant 1 ── ...
//! ```
//!
//! # Workloads
//!
//! - [`simple_events`] - JSON payload, `created_at` taken when the item is generated
//! - [`metric_events`] - JSON payload, alternating `FAILED`/`SUCCEEDED`, spread over 24h
//! - [`log_stream`] - text line per item, spread linearly over a time window
//!
//! # Example
//!
//! ```rust
//! use events_generator::{metric_events, EventType, WorkloadShape};
//!
//! let shape = WorkloadShape::new(1, 1, 2);
//! let items: Vec<_> = metric_events(shape, chrono::Utc::now(), Some(42)).collect();
//! assert_eq!(items[0].event_type, Some(EventType::Failed));
//! assert_eq!(items[1].event_type, Some(EventType::Succeeded));
//! ```

pub mod ids;
pub mod item;
pub mod timestamp;
pub mod workload;

pub use item::{EventItem, EventType};
pub use timestamp::{parse_timestamp, TimeWindow};
pub use workload::{log_stream, metric_events, simple_events, EventStream, WorkloadShape};

/// Error type for generator operations.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// Timestamp string could not be parsed.
    #[error("Invalid timestamp '{0}': expected RFC 3339 (e.g. 2024-01-01T00:00:00Z)")]
    InvalidTimestamp(String),

    /// Window end lies before its start.
    #[error("Time window end {end} is before start {start}")]
    InvertedWindow { start: String, end: String },

    /// Window too wide to express in nanoseconds.
    #[error("Time window from {start} to {end} is too large")]
    WindowTooLarge { start: String, end: String },

    /// Unknown event type label.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}
