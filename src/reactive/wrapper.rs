use super::result::AsyncResult;
use super::stream::AsyncStream;
use crate::connection::config::BridgeConfig;
use crate::connection::pool::{BlockingScheduler, SchedulerStats};
use crate::core::Result;
use std::sync::Arc;

/// Turns blocking closures into cold asynchronous values.
///
/// Every adapter only captures the closure; it runs on the wrapper's blocking scheduler once
/// per subscription. Context-aware execution lives in
/// [`ContextExecutor`](crate::connection::ContextExecutor), which is built on these adapters.
#[derive(Clone)]
pub struct ReactiveWrapper {
    scheduler: BlockingScheduler,
}

impl ReactiveWrapper {
    /// Wrapper with its own scheduler sized by `config`.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        Ok(Self::with_scheduler(BlockingScheduler::new(config)?))
    }

    /// Wrapper sharing the process-wide default scheduler.
    pub fn global() -> Self {
        Self::with_scheduler(BlockingScheduler::global().clone())
    }

    pub fn with_scheduler(scheduler: BlockingScheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &BlockingScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Run `task` for its side effect; completes empty.
    pub fn from_runnable<F>(&self, task: F) -> AsyncResult<()>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.from_callable(move || task().map(|_| None))
    }

    /// Run `task` and emit its value, or complete empty when it yields `None`.
    pub fn from_callable<T, F>(&self, task: F) -> AsyncResult<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<Option<T>> + Send + Sync + 'static,
    {
        AsyncResult::from_job(self.scheduler.clone(), Arc::new(task))
    }

    /// Run `task` and emit each item it produces.
    ///
    /// The iterable is created fresh on every subscription.
    pub fn from_iterable<T, I, F>(&self, task: F) -> AsyncStream<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        F: Fn() -> Result<I> + Send + Sync + 'static,
    {
        AsyncStream::from_result(
            self.from_callable(move || task().map(|items| Some(items.into_iter().collect()))),
        )
    }
}

impl Default for ReactiveWrapper {
    fn default() -> Self {
        Self::global()
    }
}

impl std::fmt::Debug for ReactiveWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveWrapper")
            .field("stats", &self.scheduler.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PersistenceError;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_from_runnable_completes_empty() {
        let wrapper = ReactiveWrapper::global();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let result = wrapper.from_runnable(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(result.await, Ok(None));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_from_callable_value_and_error() {
        let wrapper = ReactiveWrapper::new(&BridgeConfig::new().max_concurrency(1)).unwrap();

        assert_eq!(wrapper.from_callable(|| Ok(Some("x"))).await, Ok(Some("x")));
        assert_eq!(
            wrapper
                .from_callable::<u8, _>(|| Err(PersistenceError::ContextClosed))
                .await,
            Err(PersistenceError::ContextClosed)
        );
    }

    #[tokio::test]
    async fn test_from_iterable_fresh_per_subscription() {
        let wrapper = ReactiveWrapper::global();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);

        let stream = wrapper.from_iterable(move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(0..n)
        });

        let first: Vec<usize> = stream.subscribe().map(|item| item.unwrap()).collect().await;
        let second: Vec<usize> = stream.subscribe().map(|item| item.unwrap()).collect().await;
        assert_eq!(first, vec![0]);
        assert_eq!(second, vec![0, 1]);
    }
}
