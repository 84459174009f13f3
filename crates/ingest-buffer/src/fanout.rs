//! Delivery of flush outcomes to completion handles.
//!
//! Senders and results are matched by position. `oneshot::Sender::send`
//! never blocks, so an unobserved handle cannot stall the flush loop.

use crate::error::BufferError;
use crate::handle::Completion;

/// Resolve each sender with the result at the same position.
///
/// Returns how many handles were still being observed.
pub(crate) fn resolve<R>(senders: Vec<Completion<R>>, results: Vec<R>) -> usize {
    debug_assert_eq!(senders.len(), results.len());
    let mut delivered = 0;
    for (tx, result) in senders.into_iter().zip(results) {
        if tx.send(Ok(result)).is_ok() {
            delivered += 1;
        }
    }
    delivered
}

/// Resolve every sender with a clone of the same error.
pub(crate) fn fail<R>(senders: Vec<Completion<R>>, err: &BufferError) {
    for tx in senders {
        // Receiver gone: nobody is waiting for this item.
        let _ = tx.send(Err(err.clone()));
    }
}
