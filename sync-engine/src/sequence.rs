//! Ordered asynchronous iteration.
//!
//! [`run_sequential`] drives a per-item async step over a collection one
//! item at a time: await the step, check cancellation, yield briefly, move
//! on. It is the engine's only concurrency primitive for per-zone work, so
//! at most one zone is being merged, set up, or uploaded at any moment.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a sequential run stopped early.
#[derive(Debug, PartialEq, Eq)]
pub enum SequenceError<E> {
    /// The cancellation token tripped between items.
    Cancelled,
    /// A step failed; remaining items were skipped.
    Step(E),
}

/// Run `step` over `items` in order.
///
/// An empty collection completes immediately. A failing step short-circuits
/// the remainder. Cancellation is checked between items, so a step that has
/// started always runs to completion.
pub async fn run_sequential<T, E, F, Fut>(
    items: impl IntoIterator<Item = T>,
    cancel: &CancellationToken,
    pause: Duration,
    mut step: F,
) -> Result<(), SequenceError<E>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    for item in items {
        step(item).await.map_err(SequenceError::Step)?;

        if cancel.is_cancelled() {
            return Err(SequenceError::Cancelled);
        }

        tokio::task::yield_now().await;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    Ok(())
}
