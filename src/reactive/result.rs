use super::subscription::{Outcome, Subscription};
use crate::connection::pool::{BlockingScheduler, Job};
use crate::core::{PersistenceError, Result};
use std::future::IntoFuture;
use std::sync::Arc;

/// A cold single-value computation.
///
/// Nothing runs until [`subscribe`](AsyncResult::subscribe) is called (or the value is
/// awaited). Every subscription runs the underlying work once more and terminates with a value,
/// an empty completion, or a failure; results are never cached between subscriptions.
///
/// ```no_run
/// # async fn demo(result: reactive_em::AsyncResult<u32>) -> reactive_em::Result<()> {
/// match result.await? {
///     Some(value) => println!("got {}", value),
///     None => println!("nothing"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct AsyncResult<T> {
    source: Source<T>,
}

enum Source<T> {
    /// Evaluated on the subscribing task; only used for work that never blocks
    Inline(Job<T>),
    Scheduled {
        scheduler: BlockingScheduler,
        job: Job<T>,
    },
}

impl<T: Send + 'static> AsyncResult<T> {
    /// A result that completes without a value and without doing any work.
    pub fn empty() -> Self {
        Self {
            source: Source::Inline(Arc::new(|| Ok(None))),
        }
    }

    /// A result that fails with `error` on every subscription.
    pub fn failed(error: PersistenceError) -> Self {
        Self {
            source: Source::Inline(Arc::new(move || Err(error.clone()))),
        }
    }

    pub(crate) fn from_job(scheduler: BlockingScheduler, job: Job<T>) -> Self {
        Self {
            source: Source::Scheduled { scheduler, job },
        }
    }

    /// Start the computation.
    ///
    /// Blocking work is handed to the scheduler immediately; the returned future only
    /// observes it. Dropping the subscription cancels the work if it has not started yet.
    pub fn subscribe(&self) -> Subscription<T> {
        match &self.source {
            Source::Inline(job) => Subscription::ready(job()),
            Source::Scheduled { scheduler, job } => scheduler.submit(Arc::clone(job)),
        }
    }

    /// Transform the value. `f` runs on the same worker as the work itself.
    pub fn map<U, F>(self, f: F) -> AsyncResult<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.map_outcome(move |outcome| outcome.map(|value| value.map(&f)))
    }

    /// Transform the value with a fallible function; an error fails the subscription.
    pub fn try_map<U, F>(self, f: F) -> AsyncResult<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        self.map_outcome(move |outcome| match outcome? {
            Some(value) => f(value).map(Some),
            None => Ok(None),
        })
    }

    pub(crate) fn map_outcome<U, F>(self, f: F) -> AsyncResult<U>
    where
        U: Send + 'static,
        F: Fn(Outcome<T>) -> Outcome<U> + Send + Sync + 'static,
    {
        let compose = |job: Job<T>| -> Job<U> { Arc::new(move || f(job())) };
        let source = match self.source {
            Source::Inline(job) => Source::Inline(compose(job)),
            Source::Scheduled { scheduler, job } => Source::Scheduled {
                scheduler,
                job: compose(job),
            },
        };
        AsyncResult { source }
    }
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        let source = match &self.source {
            Source::Inline(job) => Source::Inline(Arc::clone(job)),
            Source::Scheduled { scheduler, job } => Source::Scheduled {
                scheduler: scheduler.clone(),
                job: Arc::clone(job),
            },
        };
        Self { source }
    }
}

impl<T> std::fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.source {
            Source::Inline(_) => "inline",
            Source::Scheduled { .. } => "scheduled",
        };
        f.debug_struct("AsyncResult").field("source", &kind).finish()
    }
}

impl<T: Send + 'static> IntoFuture for AsyncResult<T> {
    type Output = Outcome<T>;
    type IntoFuture = Subscription<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.subscribe()
    }
}

impl<T: Send + 'static> IntoFuture for &AsyncResult<T> {
    type Output = Outcome<T>;
    type IntoFuture = Subscription<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.subscribe()
    }
}
