//! Cancellation-aware handoff between pipeline stages.
//!
//! Every suspension point in the pipeline races the awaited operation against
//! the run's [`CancellationToken`]. The token is always polled first, so a
//! fired token wins even when the other branch is also ready.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outcome of handing a record to the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Delivered,
    Cancelled,
    /// The receiving stage has gone away.
    Closed,
}

/// Outcome of waiting for a record from the previous stage.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Item(T),
    Cancelled,
    /// The sending stage finished and dropped its sender.
    Closed,
}

/// Send `item`, abandoning the send if `cancel` fires first.
pub async fn send<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> Sent {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Sent::Cancelled,
        res = tx.send(item) => match res {
            Ok(()) => Sent::Delivered,
            Err(_) => Sent::Closed,
        },
    }
}

/// Receive the next item, returning early if `cancel` fires first.
pub async fn recv<T>(rx: &mut mpsc::Receiver<T>, cancel: &CancellationToken) -> Received<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Received::Cancelled,
        item = rx.recv() => match item {
            Some(item) => Received::Item(item),
            None => Received::Closed,
        },
    }
}

/// Drive `fut` to completion unless `cancel` fires first (`None`).
pub async fn until_cancelled<F>(cancel: &CancellationToken, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
