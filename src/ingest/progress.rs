//! Periodic progress logging for long ingest runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Counts resolved items and logs the running total.
#[derive(Clone)]
pub struct Progress {
    name: Arc<str>,
    total: u64,
    resolved: Arc<AtomicU64>,
    started: Instant,
}

impl Progress {
    pub fn new(name: &str, total: u64) -> Self {
        Self {
            name: Arc::from(name),
            total,
            resolved: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        }
    }

    pub fn record(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resolved(&self) -> u64 {
        self.resolved.load(Ordering::Relaxed)
    }

    pub fn log(&self) {
        let resolved = self.resolved();
        let secs = self.started.elapsed().as_secs_f64();
        let rate = if secs > 0.0 { resolved as f64 / secs } else { 0.0 };
        info!(
            "{}: {}/{} items written ({:.0} items/sec)",
            self.name, resolved, self.total, rate
        );
    }

    /// Log every `every` until `stop` is cancelled.
    pub fn spawn_ticker(&self, every: Duration, stop: CancellationToken) -> JoinHandle<()> {
        let progress = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => progress.log(),
                }
            }
        })
    }
}
