//! Ingest command handlers.
//!
//! Turns a generated workload into buffered bulk inserts and reports the
//! outcome.

pub mod logging;
pub mod progress;
pub mod run;

pub use logging::mask_connection_password;
pub use progress::Progress;
pub use run::{run_ingest, IngestSummary};
