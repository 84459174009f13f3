//! One-shot completion handle returned by [`crate::Buffer::submit`].

use crate::error::BufferError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub(crate) type Completion<R> = oneshot::Sender<Result<R, BufferError>>;

/// Resolves exactly once to the flush outcome of one submitted item.
///
/// Dropping the handle is allowed; the flush loop never waits for it.
#[derive(Debug)]
#[must_use = "a completion handle does nothing unless awaited"]
pub struct CompletionHandle<R> {
    rx: oneshot::Receiver<Result<R, BufferError>>,
}

impl<R> CompletionHandle<R> {
    pub(crate) fn channel() -> (Completion<R>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<R> Future for CompletionHandle<R> {
    type Output = Result<R, BufferError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BufferError::Dropped)))
    }
}
