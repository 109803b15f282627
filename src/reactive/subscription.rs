use crate::core::{PersistenceError, Result};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Terminal signal of a single-value subscription: a value, empty completion, or a failure.
pub type Outcome<T> = Result<Option<T>>;

/// Shared cancellation marker checked by the worker right before a unit of work starts.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A started single-value computation.
///
/// Resolves to `Ok(Some(value))`, `Ok(None)` for an empty completion, or `Err(_)`.
/// Dropping the subscription cancels it: work that has not started yet never runs, and the
/// result of work already running is discarded.
#[must_use = "dropping a subscription cancels it"]
pub struct Subscription<T> {
    receiver: oneshot::Receiver<Outcome<T>>,
    cancel: CancelFlag,
}

impl<T> Subscription<T> {
    pub(crate) fn new(receiver: oneshot::Receiver<Outcome<T>>, cancel: CancelFlag) -> Self {
        Self { receiver, cancel }
    }

    /// A subscription that is already terminated with `outcome`.
    pub(crate) fn ready(outcome: Outcome<T>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(outcome);
        Self::new(receiver, CancelFlag::new())
    }

    /// Cancel the subscription. Awaiting it afterwards yields [`PersistenceError::Cancelled`].
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.receiver.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Future for Subscription<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(Err(PersistenceError::Cancelled));
        }

        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The worker dropped its sender without a signal: the job was skipped.
            Poll::Ready(Err(_)) => Poll::Ready(Err(PersistenceError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A started multi-value computation, consumed as a [`Stream`] of `Result<T>`.
///
/// Yields every element in order and then ends, or yields a single `Err` and ends.
#[must_use = "streams do nothing unless polled; dropping one cancels it"]
pub struct StreamSubscription<T> {
    state: StreamState<T>,
}

enum StreamState<T> {
    Waiting(Subscription<Vec<T>>),
    Emitting(std::vec::IntoIter<T>),
    Done,
}

// No field is structurally pinned.
impl<T> Unpin for StreamSubscription<T> {}

impl<T> StreamSubscription<T> {
    pub(crate) fn new(inner: Subscription<Vec<T>>) -> Self {
        Self {
            state: StreamState::Waiting(inner),
        }
    }

    /// Cancel the stream. Elements already buffered are dropped.
    pub fn cancel(&mut self) {
        if let StreamState::Waiting(inner) = &mut self.state {
            inner.cancel();
        }
        self.state = StreamState::Done;
    }
}

impl<T> Stream for StreamSubscription<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let (next_state, output) = match &mut this.state {
                StreamState::Waiting(inner) => match Pin::new(inner).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(Some(items))) => {
                        (StreamState::Emitting(items.into_iter()), None)
                    }
                    Poll::Ready(Ok(None)) => (StreamState::Done, Some(None)),
                    Poll::Ready(Err(err)) => (StreamState::Done, Some(Some(Err(err)))),
                },
                StreamState::Emitting(items) => match items.next() {
                    Some(item) => return Poll::Ready(Some(Ok(item))),
                    None => (StreamState::Done, Some(None)),
                },
                StreamState::Done => return Poll::Ready(None),
            };
            this.state = next_state;
            if let Some(output) = output {
                return Poll::Ready(output);
            }
        }
    }
}
