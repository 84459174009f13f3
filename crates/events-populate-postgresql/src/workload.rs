//! The three event tables.

use clap::ValueEnum;
use std::fmt;

/// Which generator and table a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Workload {
    Simple,
    Metrics,
    Logs,
}

impl Workload {
    pub const ALL: [Workload; 3] = [Workload::Simple, Workload::Metrics, Workload::Logs];

    pub fn table(&self) -> &'static str {
        match self {
            Workload::Simple => "simple_events",
            Workload::Metrics => "metric_events",
            Workload::Logs => "logs",
        }
    }

    /// Name of the buffer that writes this workload, used in logs and errors.
    pub fn buffer_name(&self) -> &'static str {
        match self {
            Workload::Simple => "simple_writer",
            Workload::Metrics => "metric_writer",
            Workload::Logs => "logs_writer",
        }
    }

    /// Column holding the payload: raw bytes for events, text for logs.
    pub fn payload_column(&self) -> &'static str {
        match self {
            Workload::Simple | Workload::Metrics => "data",
            Workload::Logs => "log",
        }
    }

    pub fn has_event_type(&self) -> bool {
        matches!(self, Workload::Metrics)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Workload::Simple => "simple",
            Workload::Metrics => "metrics",
            Workload::Logs => "logs",
        };
        f.write_str(name)
    }
}
