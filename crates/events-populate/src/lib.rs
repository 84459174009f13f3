//! Common types and utilities for the ingestion workloads.
//!
//! This crate provides the argument groups shared by the `simple`, `metrics`
//! and `logs` commands, so every workload exposes the same buffer tunables.

pub mod args;
pub mod duration;

pub use args::{BufferArgs, CommonPopulateArgs, LogsArgs, MetricsArgs, SimpleArgs};
pub use duration::parse_duration;
