//! Common CLI argument definitions shared by all workloads.

use crate::duration::parse_duration;
use clap::Args;
use events_generator::{GeneratorError, TimeWindow, WorkloadShape};
use ingest_buffer::BufferOpts;
use std::time::Duration;

/// Buffer tunables shared by every ingestion command.
#[derive(Args, Clone, Debug)]
pub struct BufferArgs {
    /// Maximum number of items per bulk insert
    #[arg(long, default_value = "1000")]
    pub buffer_capacity: usize,

    /// Flush a partial batch once its oldest item has waited this long (e.g. 100ms, 2s)
    #[arg(long, default_value = "100ms", value_parser = parse_duration)]
    pub flush_period: Duration,

    /// Maximum payload bytes waiting in the buffer before producers block
    #[arg(long, default_value = "4194304")]
    pub max_queued_bytes: usize,

    /// How long a producer waits for buffer space before the run fails
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub submit_timeout: Duration,
}

impl BufferArgs {
    /// Buffer options for a buffer named `name`.
    pub fn to_opts(&self, name: &str) -> BufferOpts {
        BufferOpts::new(name)
            .with_max_capacity(self.buffer_capacity)
            .with_flush_period(self.flush_period)
            .with_max_queued_bytes(self.max_queued_bytes)
            .with_submit_timeout(self.submit_timeout)
    }
}

/// Arguments shared by all ingestion commands.
#[derive(Args, Clone, Debug)]
pub struct CommonPopulateArgs {
    /// Random seed for tenant and resource ids (same seed = same ids; random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub buffer: BufferArgs,
}

/// Arguments for the `simple` command.
#[derive(Args, Clone, Debug)]
pub struct SimpleArgs {
    /// The number of tenants
    #[arg(long, short = 't', default_value = "10")]
    pub tenants: u64,

    /// The number of distinct resources to create per tenant
    #[arg(long, short = 'r', default_value = "1000")]
    pub resources: u64,

    /// The number of events to create per (tenant, resource) tuple
    #[arg(long, short = 'c', default_value = "10")]
    pub count: u64,

    #[command(flatten)]
    pub common: CommonPopulateArgs,
}

impl SimpleArgs {
    pub fn shape(&self) -> WorkloadShape {
        WorkloadShape::new(self.tenants, self.resources, self.count)
    }
}

/// Arguments for the `metrics` command.
#[derive(Args, Clone, Debug)]
pub struct MetricsArgs {
    /// The number of tenants
    #[arg(long, short = 't', default_value = "10")]
    pub tenants: u64,

    /// The number of distinct resources to create per tenant
    #[arg(long, short = 'r', default_value = "10")]
    pub resources: u64,

    /// The number of events to create per (tenant, resource) tuple
    #[arg(long, short = 'c', default_value = "1000")]
    pub count: u64,

    #[command(flatten)]
    pub common: CommonPopulateArgs,
}

impl MetricsArgs {
    pub fn shape(&self) -> WorkloadShape {
        WorkloadShape::new(self.tenants, self.resources, self.count)
    }
}

/// Arguments for the `logs` command.
#[derive(Args, Clone, Debug)]
pub struct LogsArgs {
    /// The number of tenants
    #[arg(long, short = 't', default_value = "10")]
    pub tenants: u64,

    /// The number of distinct resources to create per tenant
    #[arg(long, short = 'r', default_value = "1")]
    pub resources: u64,

    /// The number of logs to create per (tenant, resource) tuple
    #[arg(long, short = 'c', default_value = "10000")]
    pub count: u64,

    /// The start time for the logs (RFC 3339)
    #[arg(long, default_value = "2024-01-01T00:00:00Z")]
    pub start: String,

    /// The end time for the logs (RFC 3339)
    #[arg(long, default_value = "2025-01-01T00:00:00Z")]
    pub end: String,

    #[command(flatten)]
    pub common: CommonPopulateArgs,
}

impl LogsArgs {
    pub fn shape(&self) -> WorkloadShape {
        WorkloadShape::new(self.tenants, self.resources, self.count)
    }

    /// Parse `--start`/`--end` into a window.
    pub fn window(&self) -> Result<TimeWindow, GeneratorError> {
        TimeWindow::parse(&self.start, &self.end)
    }
}
