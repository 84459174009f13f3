//! Point-lookup latency benchmark.
//!
//! The run has two phases. The resolve phase reads the id range of the
//! table, draws random ids in `[min, max)` and fetches each row to learn a
//! real `(tenant, resource)` pair. The timed phase then runs one
//! `list_by_resource` per pair, sequentially, and reports the mean latency.

use crate::error::PostgreSQLPopulatorError;
use crate::store::{BenchmarkSample, EventLookup};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors that abort a benchmark run.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Sample count must be at least 1")]
    NoSamples,

    #[error("Table '{table}' is empty")]
    EmptyTable { table: String },

    #[error("Failed to read the id range of '{table}'")]
    Bounds {
        table: String,
        #[source]
        source: PostgreSQLPopulatorError,
    },

    #[error("No row with id {id} in '{table}'")]
    MissingRow { table: String, id: i64 },

    #[error("Failed to fetch id {id} from '{table}'")]
    Fetch {
        table: String,
        id: i64,
        #[source]
        source: PostgreSQLPopulatorError,
    },

    #[error("Lookup for tenant {tenant_id}, resource {resource_id} failed")]
    Lookup {
        tenant_id: Uuid,
        resource_id: Uuid,
        #[source]
        source: PostgreSQLPopulatorError,
    },
}

/// Output of the resolve phase.
#[derive(Debug, Clone)]
pub struct ResolvedSamples {
    pub min_id: i64,
    pub max_id: i64,
    pub samples: Vec<BenchmarkSample>,
    pub duration: Duration,
}

/// Result of a full benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkReport {
    pub table: String,
    pub min_id: i64,
    pub max_id: i64,
    pub sample_count: u32,
    pub rows_returned: u64,
    pub resolve_duration: Duration,
    pub elapsed: Duration,
    pub average: Duration,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "table: {}", self.table)?;
        writeln!(f, "min id: {}", self.min_id)?;
        writeln!(f, "max id: {}", self.max_id)?;
        writeln!(f, "samples: {}", self.sample_count)?;
        writeln!(f, "rows returned: {}", self.rows_returned)?;
        writeln!(f, "resolve: {:?}", self.resolve_duration)?;
        writeln!(f, "elapsed: {:?}", self.elapsed)?;
        write!(f, "average: {:?}", self.average)
    }
}

/// Benchmarks `list_by_resource` latency against one table.
pub struct QueryBenchmark<'a, L: EventLookup + ?Sized> {
    lookup: &'a L,
    table: String,
    samples: u32,
    rng: StdRng,
}

impl<'a, L: EventLookup + ?Sized> QueryBenchmark<'a, L> {
    /// `seed` fixes the drawn ids; `None` draws from entropy.
    pub fn new(lookup: &'a L, table: impl Into<String>, samples: u32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            lookup,
            table: table.into(),
            samples,
            rng,
        }
    }

    /// Draw ids and fetch the `(tenant, resource)` behind each one.
    pub async fn resolve(&mut self) -> Result<ResolvedSamples, QueryError> {
        if self.samples == 0 {
            return Err(QueryError::NoSamples);
        }
        let started = Instant::now();

        let (min_id, max_id) = self
            .lookup
            .id_bounds()
            .await
            .map_err(|source| QueryError::Bounds {
                table: self.table.clone(),
                source,
            })?
            .ok_or_else(|| QueryError::EmptyTable {
                table: self.table.clone(),
            })?;
        debug!("Id range of '{}' is [{}, {}]", self.table, min_id, max_id);

        let mut samples = Vec::with_capacity(self.samples as usize);
        for _ in 0..self.samples {
            let id = draw_id(&mut self.rng, min_id, max_id);
            let event = self
                .lookup
                .get_by_id(id)
                .await
                .map_err(|source| QueryError::Fetch {
                    table: self.table.clone(),
                    id,
                    source,
                })?
                .ok_or_else(|| QueryError::MissingRow {
                    table: self.table.clone(),
                    id,
                })?;
            samples.push(BenchmarkSample::from(&event));
        }

        Ok(ResolvedSamples {
            min_id,
            max_id,
            samples,
            duration: started.elapsed(),
        })
    }

    /// Run one lookup per sample. Returns the elapsed time and the number of
    /// rows read.
    pub async fn measure(&self, samples: &[BenchmarkSample]) -> Result<(Duration, u64), QueryError> {
        let started = Instant::now();
        let mut rows_returned = 0u64;

        for sample in samples {
            let rows = self
                .lookup
                .list_by_resource(sample)
                .await
                .map_err(|source| QueryError::Lookup {
                    tenant_id: sample.tenant_id,
                    resource_id: sample.resource_id,
                    source,
                })?;
            rows_returned += rows.len() as u64;
        }

        Ok((started.elapsed(), rows_returned))
    }

    pub async fn run(mut self) -> Result<BenchmarkReport, QueryError> {
        let resolved = self.resolve().await?;
        info!(
            "Resolved {} samples from '{}' in {:?}",
            resolved.samples.len(),
            self.table,
            resolved.duration
        );

        let (elapsed, rows_returned) = self.measure(&resolved.samples).await?;

        Ok(BenchmarkReport {
            table: self.table,
            min_id: resolved.min_id,
            max_id: resolved.max_id,
            sample_count: self.samples,
            rows_returned,
            resolve_duration: resolved.duration,
            elapsed,
            average: elapsed / self.samples,
        })
    }
}

/// Uniform id in `[min, max)`, or `min` when the range is a single id.
fn draw_id(rng: &mut StdRng, min: i64, max: i64) -> i64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}
