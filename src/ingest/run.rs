//! Ingest command runner.

use super::progress::Progress;
use crate::error::{ConfigError, Interrupted};
use anyhow::Context;
use ingest_buffer::{Buffer, BufferError, BufferOpts, Flusher, ItemSize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often a running ingest logs its progress.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Totals of a completed ingest run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub buffer: String,
    pub items: u64,
    pub batches: u64,
    pub elapsed: Duration,
}

impl IngestSummary {
    /// Calculate items per second.
    pub fn items_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.items as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: wrote {} items in {} batches in {:?} ({:.0} items/sec)",
            self.buffer,
            self.items,
            self.batches,
            self.elapsed,
            self.items_per_second()
        )
    }
}

type Waiters = JoinSet<Result<(), BufferError>>;

/// Push every item through a buffer in front of `flusher` and wait for all
/// of them to resolve.
///
/// Each accepted item gets a waiter task in a [`JoinSet`]; the function
/// returns only once the buffer has stopped and every waiter has finished.
/// The first failure ends generation. When `cancel` fires, generation
/// stops, the items already accepted are flushed, and the run fails with
/// [`Interrupted`].
pub async fn run_ingest<T, F, I>(
    items: I,
    opts: BufferOpts,
    flusher: F,
    cancel: &CancellationToken,
) -> anyhow::Result<IngestSummary>
where
    T: ItemSize + Send + Sync + 'static,
    F: Flusher<T>,
    I: IntoIterator<Item = T>,
{
    let started = Instant::now();
    let items = items.into_iter();
    let total = items.size_hint().0 as u64;

    let buffer = Buffer::new(opts, flusher).map_err(ConfigError::InvalidBuffer)?;
    let name = buffer.name().to_string();
    buffer.start();

    let progress = Progress::new(&name, total);
    let stop_ticker = CancellationToken::new();
    let ticker = progress.spawn_ticker(PROGRESS_INTERVAL, stop_ticker.clone());

    let mut waiters = Waiters::new();
    let mut failure: Option<BufferError> = None;
    let mut interrupted = false;

    for item in items {
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                interrupted = true;
                break;
            }
            submitted = buffer.submit(item) => submitted,
        };

        match submitted {
            Ok(handle) => {
                let progress = progress.clone();
                waiters.spawn(async move {
                    let outcome = handle.await;
                    if outcome.is_ok() {
                        progress.record();
                    }
                    outcome.map(drop)
                });
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }

        if let Some(e) = reap_finished(&mut waiters)? {
            failure = Some(e);
            break;
        }
    }

    if interrupted {
        warn!(
            "{}: interrupted, draining {} pending items",
            name,
            waiters.len()
        );
    }

    let stopped = buffer.stop().await;
    while let Some(joined) = waiters.join_next().await {
        if let Err(e) = joined.context("Completion waiter panicked")? {
            failure.get_or_insert(e);
        }
    }

    stop_ticker.cancel();
    ticker.await.context("Progress ticker panicked")?;
    progress.log();

    // The flush error that poisoned the buffer outranks the errors it caused.
    let stats = stopped.with_context(|| format!("Failed to write items through '{name}'"))?;
    if let Some(e) = failure {
        return Err(e).with_context(|| format!("Failed to write items through '{name}'"));
    }
    if interrupted {
        return Err(Interrupted::Ingest {
            written: progress.resolved(),
        }
        .into());
    }

    let summary = IngestSummary {
        buffer: name,
        items: stats.flushed,
        batches: stats.batches,
        elapsed: started.elapsed(),
    };
    info!("{}", summary);
    Ok(summary)
}

/// Collect waiters that already finished. Returns the first item failure.
fn reap_finished(waiters: &mut Waiters) -> anyhow::Result<Option<BufferError>> {
    while let Some(joined) = waiters.try_join_next() {
        if let Err(e) = joined.context("Completion waiter panicked")? {
            return Ok(Some(e));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{exit_code, EXIT_CONFIG, EXIT_FAILURE, EXIT_INTERRUPTED};
    use async_trait::async_trait;
    use events_generator::{simple_events, EventItem, WorkloadShape};
    use ingest_buffer::FlushFailure;
    use std::sync::{Arc, Mutex};
    use tokio_test::assert_ok;

    #[derive(Clone, Default)]
    struct RecordingFlusher {
        batches: Arc<Mutex<Vec<usize>>>,
        fail_on_batch: Option<usize>,
        panic_on_batch: Option<usize>,
        delay: Option<Duration>,
    }

    impl RecordingFlusher {
        fn sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Flusher<EventItem> for RecordingFlusher {
        type Output = usize;

        async fn flush(&self, items: &[EventItem]) -> Result<Vec<usize>, FlushFailure> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let batch = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(items.len());
                batches.len()
            };
            if self.fail_on_batch == Some(batch) {
                return Err("duplicate key value violates unique constraint".into());
            }
            if self.panic_on_batch == Some(batch) {
                panic!("unexpected row shape");
            }
            Ok((0..items.len()).collect())
        }
    }

    fn opts(capacity: usize) -> BufferOpts {
        BufferOpts::new("simple_writer").with_max_capacity(capacity)
    }

    #[tokio::test]
    async fn test_every_item_is_written() {
        let flusher = RecordingFlusher::default();
        let items = simple_events(WorkloadShape::new(2, 2, 3), Some(1));

        let summary = assert_ok!(
            run_ingest(items, opts(5), flusher.clone(), &CancellationToken::new()).await
        );

        assert_eq!(summary.items, 12);
        assert_eq!(summary.buffer, "simple_writer");
        let sizes = flusher.sizes();
        assert_eq!(sizes.iter().sum::<usize>(), 12);
        assert!(sizes.iter().all(|&n| n <= 5));
        assert_eq!(summary.batches, sizes.len() as u64);
    }

    #[tokio::test]
    async fn test_empty_workload() {
        let flusher = RecordingFlusher::default();
        let items = simple_events(WorkloadShape::new(0, 10, 10), None);

        let summary = assert_ok!(
            run_ingest(items, opts(5), flusher.clone(), &CancellationToken::new()).await
        );
        assert_eq!(summary.items, 0);
        assert!(flusher.sizes().is_empty());
    }

    #[tokio::test]
    async fn test_flush_failure_stops_the_run() {
        let flusher = RecordingFlusher {
            fail_on_batch: Some(2),
            ..Default::default()
        };
        let items = simple_events(WorkloadShape::new(2, 2, 3), Some(1));

        let err = run_ingest(items, opts(5), flusher.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BufferError>(),
            Some(BufferError::Flush { .. })
        ));
        assert_eq!(exit_code(&err), EXIT_FAILURE);
        // Nothing reaches the backend after the failed batch.
        assert_eq!(flusher.sizes().len(), 2);
    }

    #[tokio::test]
    async fn test_flusher_panic_ends_the_run() {
        let flusher = RecordingFlusher {
            panic_on_batch: Some(1),
            ..Default::default()
        };
        let items = simple_events(WorkloadShape::new(2, 2, 3), Some(1));

        let cancel = CancellationToken::new();
        let run = run_ingest(items, opts(5), flusher, &cancel);
        let err = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run hung after the flush loop panicked")
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BufferError>(),
            Some(BufferError::Worker { .. })
        ));
        assert_eq!(exit_code(&err), EXIT_FAILURE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_drains_accepted_items() {
        let flusher = RecordingFlusher {
            delay: Some(Duration::from_millis(2)),
            ..Default::default()
        };
        let items = simple_events(WorkloadShape::new(1, 1, 10_000_000), Some(1));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = run_ingest(items, opts(100), flusher.clone(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(exit_code(&err), EXIT_INTERRUPTED);

        let Some(Interrupted::Ingest { written }) = err.downcast_ref::<Interrupted>() else {
            panic!("expected an interrupted ingest, got {err:#}");
        };
        let flushed: usize = flusher.sizes().iter().sum();
        assert!(*written > 0);
        assert_eq!(*written, flushed as u64);
    }

    #[tokio::test]
    async fn test_invalid_options_are_config_errors() {
        let flusher = RecordingFlusher::default();
        let items = simple_events(WorkloadShape::new(1, 1, 1), None);

        let err = run_ingest(items, opts(0), flusher.clone(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(exit_code(&err), EXIT_CONFIG);
        assert!(flusher.sizes().is_empty());
    }
}
