//! The batching buffer and its flush loop.

use crate::error::{BufferError, ResultCountMismatch};
use crate::fanout;
use crate::handle::{Completion, CompletionHandle};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default maximum number of items per batch.
pub const DEFAULT_MAX_CAPACITY: usize = 1000;

/// Default time an item may wait in the queue before its batch is flushed.
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_millis(100);

/// Default ceiling on the summed size of queued items.
pub const DEFAULT_MAX_QUEUED_BYTES: usize = 4 * 1024 * 1024;

/// Default time `submit` waits for queue space.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type a [`Flusher`] may return for a whole batch.
pub type FlushFailure = Box<dyn std::error::Error + Send + Sync>;

type FlushSource = Arc<dyn std::error::Error + Send + Sync>;

/// Size accounting for queued items.
pub trait ItemSize {
    /// Number of bytes the item counts against `max_queued_bytes`.
    fn size_bytes(&self) -> usize;
}

/// Performs one bulk write per batch.
///
/// Implementations must return exactly one output per input item, in input
/// order, or a single error for the whole batch.
#[async_trait]
pub trait Flusher<T>: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn flush(&self, items: &[T]) -> Result<Vec<Self::Output>, FlushFailure>;
}

/// Buffer configuration.
#[derive(Debug, Clone)]
pub struct BufferOpts {
    /// Name used in logs and errors.
    pub name: String,
    /// Maximum number of queued items, and therefore maximum batch size.
    pub max_capacity: usize,
    /// Maximum age of the oldest queued item before a flush is forced.
    pub flush_period: Duration,
    /// Ceiling on the summed [`ItemSize`] of queued items.
    pub max_queued_bytes: usize,
    /// How long `submit` waits for queue space before failing.
    pub submit_timeout: Duration,
}

impl BufferOpts {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_capacity: DEFAULT_MAX_CAPACITY,
            flush_period: DEFAULT_FLUSH_PERIOD,
            max_queued_bytes: DEFAULT_MAX_QUEUED_BYTES,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub fn with_flush_period(mut self, flush_period: Duration) -> Self {
        self.flush_period = flush_period;
        self
    }

    pub fn with_max_queued_bytes(mut self, max_queued_bytes: usize) -> Self {
        self.max_queued_bytes = max_queued_bytes;
        self
    }

    pub fn with_submit_timeout(mut self, submit_timeout: Duration) -> Self {
        self.submit_timeout = submit_timeout;
        self
    }

    fn validate(&self) -> Result<(), BufferError> {
        if self.max_capacity == 0 {
            return Err(BufferError::InvalidOptions(
                "max_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_queued_bytes == 0 {
            return Err(BufferError::InvalidOptions(
                "max_queued_bytes must be at least 1".to_string(),
            ));
        }
        if self.flush_period.is_zero() {
            return Err(BufferError::InvalidOptions(
                "flush_period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters describing what a buffer has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Items accepted by `submit`.
    pub submitted: u64,
    /// Items acknowledged by a successful flush.
    pub flushed: u64,
    /// Successful flush calls.
    pub batches: u64,
    /// Failed flush calls.
    pub failed_batches: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    flushed: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closing,
    Poisoned,
}

struct Pending<T, R> {
    item: T,
    completion: Completion<R>,
}

struct Queue<T, R> {
    pending: Vec<Pending<T, R>>,
    bytes: usize,
    oldest: Option<Instant>,
    // Taken by the flush loop but not yet resolved. Counts against the limits.
    in_flight: usize,
    in_flight_bytes: usize,
    // A submitter is blocked on queue space.
    starved: bool,
    state: State,
}

impl<T, R> Queue<T, R> {
    /// Move every queued item into the in-flight batch.
    fn take(&mut self) -> Vec<Pending<T, R>> {
        self.in_flight += self.pending.len();
        self.in_flight_bytes += self.bytes;
        self.bytes = 0;
        self.oldest = None;
        self.starved = false;
        std::mem::take(&mut self.pending)
    }

    /// Forget a batch whose handles have all been resolved.
    fn release(&mut self, items: usize, bytes: usize) {
        self.in_flight = self.in_flight.saturating_sub(items);
        self.in_flight_bytes = self.in_flight_bytes.saturating_sub(bytes);
    }

    fn unresolved(&self) -> usize {
        self.pending.len() + self.in_flight
    }

    fn unresolved_bytes(&self) -> usize {
        self.bytes + self.in_flight_bytes
    }
}

struct Shared<T, R> {
    opts: BufferOpts,
    queue: Mutex<Queue<T, R>>,
    wake_flusher: Notify,
    space_freed: Notify,
    counters: Counters,
}

impl<T, R> Shared<T, R> {
    fn queue(&self) -> MutexGuard<'_, Queue<T, R>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> BufferStats {
        BufferStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            flushed: self.counters.flushed.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
            failed_batches: self.counters.failed_batches.load(Ordering::Relaxed),
        }
    }
}

/// A named batching buffer in front of a [`Flusher`].
pub struct Buffer<T, F: Flusher<T>> {
    shared: Arc<Shared<T, F::Output>>,
    flusher: Arc<F>,
    started: AtomicBool,
    worker: Mutex<Option<JoinHandle<Result<(), BufferError>>>>,
    // Error that ended the flush loop, reported by every later `stop`.
    terminal: Mutex<Option<BufferError>>,
}

impl<T, F> Buffer<T, F>
where
    T: ItemSize + Send + Sync + 'static,
    F: Flusher<T>,
{
    /// Create a buffer. Nothing is flushed until [`Buffer::start`] or
    /// [`Buffer::stop`] is called.
    pub fn new(opts: BufferOpts, flusher: F) -> Result<Self, BufferError> {
        opts.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                opts,
                queue: Mutex::new(Queue {
                    pending: Vec::new(),
                    bytes: 0,
                    oldest: None,
                    in_flight: 0,
                    in_flight_bytes: 0,
                    starved: false,
                    state: State::Open,
                }),
                wake_flusher: Notify::new(),
                space_freed: Notify::new(),
                counters: Counters::default(),
            }),
            flusher: Arc::new(flusher),
            started: AtomicBool::new(false),
            worker: Mutex::new(None),
            terminal: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.opts.name
    }

    pub fn opts(&self) -> &BufferOpts {
        &self.shared.opts
    }

    pub fn flusher(&self) -> &F {
        &self.flusher
    }

    pub fn stats(&self) -> BufferStats {
        self.shared.stats()
    }

    /// Accepted items whose handles are not resolved yet, and their summed
    /// size. Includes the batch being flushed.
    pub fn queued(&self) -> (usize, usize) {
        let queue = self.shared.queue();
        (queue.unresolved(), queue.unresolved_bytes())
    }

    /// Spawn the background flush loop. Calling it again is a no-op.
    pub fn start(&self) {
        let mut worker = self.worker();
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let opts = &self.shared.opts;
        info!(
            buffer = %opts.name,
            max_capacity = opts.max_capacity,
            flush_period = ?opts.flush_period,
            max_queued_bytes = opts.max_queued_bytes,
            "Starting buffer"
        );
        *worker = Some(tokio::spawn(flush_loop(
            self.shared.clone(),
            self.flusher.clone(),
        )));
    }

    /// Queue an item and return the handle that resolves once its batch is
    /// flushed.
    ///
    /// Waits while the queue is full. Fails with [`BufferError::Backpressure`]
    /// if no space frees up within `submit_timeout`. The wait is cancel safe:
    /// an item is either queued and returned a handle, or not queued at all.
    pub async fn submit(&self, item: T) -> Result<CompletionHandle<F::Output>, BufferError> {
        let opts = &self.shared.opts;
        let size = item.size_bytes();
        if size > opts.max_queued_bytes {
            return Err(BufferError::ItemTooLarge {
                buffer: opts.name.clone(),
                size,
                limit: opts.max_queued_bytes,
            });
        }

        let deadline = Instant::now() + opts.submit_timeout;
        loop {
            // Registered before inspecting the queue so a flush between the
            // check and the wait is not missed.
            let space_freed = self.shared.space_freed.notified();
            tokio::pin!(space_freed);
            space_freed.as_mut().enable();

            {
                let mut queue = self.shared.queue();
                match queue.state {
                    State::Open => {}
                    State::Closing => {
                        return Err(BufferError::Closed {
                            buffer: opts.name.clone(),
                        })
                    }
                    State::Poisoned => {
                        return Err(BufferError::Aborted {
                            buffer: opts.name.clone(),
                        })
                    }
                }

                if queue.unresolved() < opts.max_capacity
                    && queue.unresolved_bytes() + size <= opts.max_queued_bytes
                {
                    let (completion, handle) = CompletionHandle::channel();
                    if queue.pending.is_empty() {
                        queue.oldest = Some(Instant::now());
                    }
                    queue.pending.push(Pending { item, completion });
                    queue.bytes += size;
                    let len = queue.pending.len();
                    drop(queue);

                    self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                    if len == 1 || len >= opts.max_capacity {
                        self.shared.wake_flusher.notify_one();
                    }
                    return Ok(handle);
                }

                queue.starved = true;
            }

            self.shared.wake_flusher.notify_one();
            if tokio::time::timeout_at(deadline, space_freed).await.is_err() {
                warn!(
                    buffer = %opts.name,
                    timeout = ?opts.submit_timeout,
                    "Submit timed out waiting for queue space"
                );
                return Err(BufferError::Backpressure {
                    buffer: opts.name.clone(),
                    timeout: opts.submit_timeout,
                });
            }
        }
    }

    /// Close the buffer, flush everything still queued and wait for the flush
    /// loop to exit.
    ///
    /// Returns the error that stopped the loop, if any, and returns it again on
    /// every later call. If the buffer was never started, the remaining items
    /// are flushed on the caller's task. If the flush loop panicked, queued
    /// items resolve to [`BufferError::Aborted`].
    pub async fn stop(&self) -> Result<BufferStats, BufferError> {
        {
            let mut queue = self.shared.queue();
            if queue.state == State::Open {
                queue.state = State::Closing;
            }
        }
        self.shared.wake_flusher.notify_one();
        self.shared.space_freed.notify_waiters();

        let (worker, run_inline) = {
            let mut worker = self.worker();
            let run_inline = !self.started.swap(true, Ordering::SeqCst);
            (worker.take(), run_inline)
        };

        let finished = if run_inline {
            flush_loop(self.shared.clone(), self.flusher.clone()).await
        } else if let Some(worker) = worker {
            match worker.await {
                Ok(finished) => finished,
                Err(e) => {
                    poison(&*self.shared);
                    Err(BufferError::Worker {
                        buffer: self.shared.opts.name.clone(),
                        message: e.to_string(),
                    })
                }
            }
        } else {
            Ok(())
        };

        let mut terminal = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = finished {
            *terminal = Some(err);
        }
        if let Some(err) = terminal.as_ref() {
            return Err(err.clone());
        }
        drop(terminal);

        let stats = self.stats();
        info!(
            buffer = %self.shared.opts.name,
            flushed = stats.flushed,
            batches = stats.batches,
            "Buffer stopped"
        );
        Ok(stats)
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<Result<(), BufferError>>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, F: Flusher<T>> Drop for Buffer<T, F> {
    fn drop(&mut self) {
        // Dropped without stop(): the aborted flush loop aborts queued handles.
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }
}

enum Step<T, R> {
    Flush(Vec<Pending<T, R>>, usize),
    Wait(Option<Instant>),
    Done,
}

async fn flush_loop<T, F>(
    shared: Arc<Shared<T, F::Output>>,
    flusher: Arc<F>,
) -> Result<(), BufferError>
where
    T: ItemSize + Send + Sync + 'static,
    F: Flusher<T>,
{
    let mut guard = PoisonOnAbort {
        shared: &*shared,
        armed: true,
    };
    let finished = run_flushes(&*shared, flusher.as_ref()).await;
    guard.armed = false;
    finished
}

async fn run_flushes<T, F>(shared: &Shared<T, F::Output>, flusher: &F) -> Result<(), BufferError>
where
    T: ItemSize + Send + Sync + 'static,
    F: Flusher<T>,
{
    let opts = &shared.opts;
    loop {
        let wake = shared.wake_flusher.notified();

        let step = {
            let mut queue = shared.queue();
            let closing = queue.state == State::Closing;
            if queue.pending.is_empty() {
                if closing {
                    Step::Done
                } else {
                    Step::Wait(None)
                }
            } else {
                let due = queue
                    .oldest
                    .is_some_and(|oldest| oldest.elapsed() >= opts.flush_period);
                if closing || due || queue.starved || queue.pending.len() >= opts.max_capacity {
                    let bytes = queue.bytes;
                    Step::Flush(queue.take(), bytes)
                } else {
                    Step::Wait(queue.oldest.map(|oldest| oldest + opts.flush_period))
                }
            }
        };

        match step {
            Step::Flush(batch, bytes) => {
                let items = batch.len();
                let flushed = flush_batch(shared, flusher, batch, bytes).await;
                shared.queue().release(items, bytes);
                shared.space_freed.notify_waiters();
                if let Err(err) = flushed {
                    poison(shared);
                    return Err(err);
                }
            }
            Step::Wait(Some(deadline)) => {
                tokio::select! {
                    _ = wake => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            Step::Wait(None) => wake.await,
            Step::Done => return Ok(()),
        }
    }
}

async fn flush_batch<T, F>(
    shared: &Shared<T, F::Output>,
    flusher: &F,
    batch: Vec<Pending<T, F::Output>>,
    bytes: usize,
) -> Result<(), BufferError>
where
    T: ItemSize + Send + Sync + 'static,
    F: Flusher<T>,
{
    let name = &shared.opts.name;
    let (items, completions): (Vec<T>, Vec<Completion<F::Output>>) = batch
        .into_iter()
        .map(|pending| (pending.item, pending.completion))
        .unzip();
    let count = items.len();
    let started = Instant::now();

    let outcome: Result<Vec<F::Output>, FlushSource> = match flusher.flush(&items).await {
        Ok(results) if results.len() == count => Ok(results),
        Ok(results) => Err(Arc::new(ResultCountMismatch {
            expected: count,
            actual: results.len(),
        }) as FlushSource),
        Err(e) => Err(FlushSource::from(e)),
    };

    match outcome {
        Ok(results) => {
            let observed = fanout::resolve(completions, results);
            shared
                .counters
                .flushed
                .fetch_add(count as u64, Ordering::Relaxed);
            shared.counters.batches.fetch_add(1, Ordering::Relaxed);
            debug!(
                buffer = %name,
                items = count,
                bytes,
                observed,
                elapsed = ?started.elapsed(),
                "Flushed batch"
            );
            Ok(())
        }
        Err(source) => {
            shared.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
            error!(buffer = %name, items = count, error = %source, "Flush failed");
            let err = BufferError::Flush {
                buffer: name.clone(),
                items: count,
                source,
            };
            fanout::fail(completions, &err);
            Err(err)
        }
    }
}

/// Poisons the buffer when the flush loop is dropped before returning, which
/// happens when it panics or is aborted.
struct PoisonOnAbort<'a, T, R> {
    shared: &'a Shared<T, R>,
    armed: bool,
}

impl<T, R> Drop for PoisonOnAbort<'_, T, R> {
    fn drop(&mut self) {
        if self.armed {
            error!(buffer = %self.shared.opts.name, "Flush loop ended without returning");
            poison(self.shared);
        }
    }
}

fn poison<T, R>(shared: &Shared<T, R>) {
    let leftover = {
        let mut queue = shared.queue();
        queue.state = State::Poisoned;
        let leftover = queue.take();
        queue.in_flight = 0;
        queue.in_flight_bytes = 0;
        leftover
    };
    if !leftover.is_empty() {
        warn!(
            buffer = %shared.opts.name,
            items = leftover.len(),
            "Aborting queued items after flush failure"
        );
    }
    let completions = leftover.into_iter().map(|p| p.completion).collect();
    fanout::fail(
        completions,
        &BufferError::Aborted {
            buffer: shared.opts.name.clone(),
        },
    );
    shared.space_freed.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Clone)]
    struct TestItem {
        id: u64,
        size: usize,
    }

    impl ItemSize for TestItem {
        fn size_bytes(&self) -> usize {
            self.size
        }
    }

    fn item(id: u64) -> TestItem {
        TestItem { id, size: 1 }
    }

    #[derive(Default)]
    struct RecordingFlusher {
        batches: Mutex<Vec<Vec<u64>>>,
        fail_on_batch: Option<usize>,
        panic_on_batch: Option<usize>,
        drop_last_result: bool,
        delay: Option<Duration>,
    }

    impl RecordingFlusher {
        fn sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl Flusher<TestItem> for RecordingFlusher {
        type Output = u64;

        async fn flush(&self, items: &[TestItem]) -> Result<Vec<u64>, FlushFailure> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let batch_no = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(items.iter().map(|i| i.id).collect());
                batches.len()
            };
            if self.fail_on_batch == Some(batch_no) {
                return Err("backend unavailable".into());
            }
            if self.panic_on_batch == Some(batch_no) {
                panic!("flusher bug");
            }
            let mut out: Vec<u64> = items.iter().map(|i| i.id * 10).collect();
            if self.drop_last_result {
                out.pop();
            }
            Ok(out)
        }
    }

    fn opts(capacity: usize) -> BufferOpts {
        BufferOpts::new("test_writer")
            .with_max_capacity(capacity)
            .with_flush_period(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_flushes_at_capacity() {
        let buffer = Buffer::new(opts(5), RecordingFlusher::default()).unwrap();
        buffer.start();

        let mut handles = Vec::new();
        for id in 0..12 {
            handles.push(buffer.submit(item(id)).await.unwrap());
            assert!(buffer.queued().0 <= 5);
        }
        let stats = buffer.stop().await.unwrap();

        for (id, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), id as u64 * 10);
        }
        assert_eq!(buffer.flusher().sizes(), vec![5, 5, 2]);
        assert_eq!(stats.submitted, 12);
        assert_eq!(stats.flushed, 12);
        assert_eq!(stats.batches, 3);
    }

    #[tokio::test]
    async fn test_flushes_after_period() {
        let buffer = Buffer::new(
            opts(100).with_flush_period(Duration::from_millis(50)),
            RecordingFlusher::default(),
        )
        .unwrap();
        buffer.start();

        let started = Instant::now();
        let mut handles = Vec::new();
        for id in 0..3 {
            handles.push(buffer.submit(item(id)).await.unwrap());
        }
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("flush period elapsed without a flush")
                .unwrap();
        }

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(buffer.flusher().sizes(), vec![3]);
        buffer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_byte_ceiling_bounds_queue() {
        let buffer = Buffer::new(
            opts(100).with_max_queued_bytes(10),
            RecordingFlusher::default(),
        )
        .unwrap();
        buffer.start();

        let mut handles = Vec::new();
        for id in 0..6 {
            handles.push(buffer.submit(TestItem { id, size: 4 }).await.unwrap());
            assert!(buffer.queued().1 <= 10);
        }
        buffer.stop().await.unwrap();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(buffer.flusher().sizes(), vec![2, 2, 2]);
    }

    #[tokio::test]
    async fn test_rejects_oversized_item() {
        let buffer = Buffer::new(
            opts(100).with_max_queued_bytes(10),
            RecordingFlusher::default(),
        )
        .unwrap();

        let err = buffer
            .submit(TestItem { id: 1, size: 11 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BufferError::ItemTooLarge {
                size: 11,
                limit: 10,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_backpressure_times_out() {
        let buffer = Buffer::new(
            opts(2).with_submit_timeout(Duration::from_millis(20)),
            RecordingFlusher::default(),
        )
        .unwrap();

        let first = buffer.submit(item(1)).await.unwrap();
        let second = buffer.submit(item(2)).await.unwrap();
        let err = buffer.submit(item(3)).await.unwrap_err();
        assert!(matches!(err, BufferError::Backpressure { .. }));

        // Never started: stop drains on the calling task.
        buffer.stop().await.unwrap();
        assert_eq!(first.await.unwrap(), 10);
        assert_eq!(second.await.unwrap(), 20);
        assert_eq!(buffer.flusher().sizes(), vec![2]);
    }

    #[tokio::test]
    async fn test_flush_failure_poisons_buffer() {
        let flusher = RecordingFlusher {
            fail_on_batch: Some(2),
            ..Default::default()
        };
        let buffer = Buffer::new(opts(5), flusher).unwrap();
        buffer.start();

        let mut handles = Vec::new();
        let mut rejected = 0;
        for id in 0..15 {
            match buffer.submit(item(id)).await {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    assert!(matches!(err, BufferError::Aborted { .. }));
                    rejected += 1;
                }
            }
        }

        let stop = buffer.stop().await.unwrap_err();
        assert!(matches!(stop, BufferError::Flush { items: 5, .. }));

        let mut succeeded = 0;
        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok(_) => succeeded += 1,
                Err(err) => {
                    assert!(err.is_flush_failure());
                    failed += 1;
                }
            }
        }
        assert_eq!(succeeded, 5);
        assert_eq!(failed + rejected, 10);
        // The batch after the failing one never reaches the backend.
        assert_eq!(buffer.flusher().sizes(), vec![5, 5]);
        assert_eq!(buffer.stats().failed_batches, 1);
    }

    #[tokio::test]
    async fn test_result_count_mismatch_fails_batch() {
        let flusher = RecordingFlusher {
            drop_last_result: true,
            ..Default::default()
        };
        let buffer = Buffer::new(opts(10), flusher).unwrap();

        let handles = vec![
            buffer.submit(item(1)).await.unwrap(),
            buffer.submit(item(2)).await.unwrap(),
        ];
        let err = buffer.stop().await.unwrap_err();
        assert!(err.to_string().contains("flush of 2 items failed"));

        for handle in handles {
            assert!(matches!(handle.await, Err(BufferError::Flush { .. })));
        }
    }

    #[tokio::test]
    async fn test_in_flight_batch_counts_against_capacity() {
        let flusher = RecordingFlusher {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let buffer = Buffer::new(
            opts(5).with_submit_timeout(Duration::from_millis(50)),
            flusher,
        )
        .unwrap();
        buffer.start();

        let mut handles = Vec::new();
        for id in 0..5 {
            handles.push(buffer.submit(item(id)).await.unwrap());
        }
        // Let the flush loop take the full batch.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(buffer.flusher().sizes().is_empty(), "flush still in flight");
        assert_eq!(buffer.queued(), (5, 5));

        let err = buffer.submit(item(5)).await.unwrap_err();
        assert!(matches!(err, BufferError::Backpressure { .. }));

        // Space frees up once the batch resolves.
        for handle in handles {
            handle.await.unwrap();
        }
        let late = buffer.submit(item(6)).await.unwrap();
        assert!(buffer.queued().0 <= 5);

        buffer.stop().await.unwrap();
        assert_eq!(late.await.unwrap(), 60);
        assert_eq!(buffer.flusher().sizes(), vec![5, 1]);
    }

    #[tokio::test]
    async fn test_slow_flush_keeps_unresolved_within_capacity() {
        let flusher = RecordingFlusher {
            delay: Some(Duration::from_millis(30)),
            ..Default::default()
        };
        let buffer = Arc::new(Buffer::new(opts(5), flusher).unwrap());
        buffer.start();

        let producer = {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut handles = Vec::new();
                for id in 0..20 {
                    handles.push(buffer.submit(item(id)).await.unwrap());
                }
                handles
            })
        };

        let mut max_seen = 0;
        while !producer.is_finished() {
            max_seen = max_seen.max(buffer.queued().0);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in producer.await.unwrap() {
            handle.await.unwrap();
        }
        buffer.stop().await.unwrap();

        assert!(max_seen <= 5, "{max_seen} unresolved items with capacity 5");
        assert_eq!(buffer.flusher().sizes().iter().sum::<usize>(), 20);
    }

    #[tokio::test]
    async fn test_flush_loop_panic_resolves_every_handle() {
        let flusher = RecordingFlusher {
            delay: Some(Duration::from_millis(100)),
            panic_on_batch: Some(1),
            ..Default::default()
        };
        let buffer = Buffer::new(
            opts(10).with_flush_period(Duration::from_millis(20)),
            flusher,
        )
        .unwrap();
        buffer.start();

        let mut in_flight = Vec::new();
        for id in 0..3 {
            in_flight.push(buffer.submit(item(id)).await.unwrap());
        }
        // The first batch is taken after the flush period and then panics.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut queued = Vec::new();
        for id in 3..7 {
            queued.push(buffer.submit(item(id)).await.unwrap());
        }

        let err = buffer.stop().await.unwrap_err();
        assert!(matches!(err, BufferError::Worker { .. }));

        for handle in in_flight {
            let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("in-flight handle never resolved");
            assert!(outcome.is_err());
        }
        for handle in queued {
            let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("queued handle never resolved");
            assert!(matches!(outcome, Err(BufferError::Aborted { .. })));
        }
        assert!(buffer.submit(item(7)).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_reports_failure_every_time() {
        let flusher = RecordingFlusher {
            fail_on_batch: Some(1),
            ..Default::default()
        };
        let buffer = Buffer::new(opts(10), flusher).unwrap();
        buffer.start();

        let handle = buffer.submit(item(1)).await.unwrap();
        let first = buffer.stop().await.unwrap_err();
        let second = buffer.stop().await.unwrap_err();
        assert!(matches!(first, BufferError::Flush { items: 1, .. }));
        assert!(matches!(second, BufferError::Flush { items: 1, .. }));
        assert!(handle.await.unwrap_err().is_flush_failure());
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_rejected() {
        let buffer = Buffer::new(opts(10), RecordingFlusher::default()).unwrap();
        buffer.start();
        buffer.start();
        buffer.stop().await.unwrap();

        let err = buffer.submit(item(1)).await.unwrap_err();
        assert!(matches!(err, BufferError::Closed { .. }));
        buffer.stop().await.unwrap();
        assert!(buffer.flusher().sizes().is_empty());
    }

    #[test]
    fn test_invalid_options() {
        assert!(Buffer::new(opts(0), RecordingFlusher::default()).is_err());
        assert!(Buffer::new(
            opts(1).with_max_queued_bytes(0),
            RecordingFlusher::default()
        )
        .is_err());
        assert!(Buffer::new(
            opts(1).with_flush_period(Duration::ZERO),
            RecordingFlusher::default()
        )
        .is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_resolve_every_item() {
        let buffer = Arc::new(
            Buffer::new(
                opts(16).with_flush_period(Duration::from_millis(5)),
                RecordingFlusher::default(),
            )
            .unwrap(),
        );
        buffer.start();

        let mut producers = tokio::task::JoinSet::new();
        for producer in 0..20u64 {
            let buffer = buffer.clone();
            producers.spawn(async move {
                let mut handles = Vec::new();
                for n in 0..50u64 {
                    handles.push(buffer.submit(item(producer * 1000 + n)).await.unwrap());
                }
                let mut resolved = 0usize;
                for handle in handles {
                    handle.await.unwrap();
                    resolved += 1;
                }
                resolved
            });
        }

        let mut resolved = 0;
        while let Some(count) = producers.join_next().await {
            resolved += count.unwrap();
        }
        buffer.stop().await.unwrap();

        assert_eq!(resolved, 1000);
        let batches = buffer.flusher().batches.lock().unwrap().clone();
        assert!(batches.iter().all(|b| b.len() <= 16));
        let ids: HashSet<u64> = batches.into_iter().flatten().collect();
        assert_eq!(ids.len(), 1000);
    }
}
