use super::result::AsyncResult;
use super::subscription::StreamSubscription;
use crate::core::{PersistenceError, Result};

/// A cold multi-value computation.
///
/// Each subscription runs the underlying work once, then emits every produced element in
/// order and completes, or emits a single failure.
///
/// ```no_run
/// use futures::StreamExt;
///
/// # async fn demo(titles: reactive_em::AsyncStream<String>) -> reactive_em::Result<()> {
/// let mut stream = titles.subscribe();
/// while let Some(title) = stream.next().await {
///     println!("{}", title?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct AsyncStream<T> {
    inner: AsyncResult<Vec<T>>,
}

impl<T: Send + 'static> AsyncStream<T> {
    /// A stream that completes immediately without elements.
    pub fn empty() -> Self {
        Self::from_result(AsyncResult::empty())
    }

    /// A stream that fails with `error` on every subscription.
    pub fn failed(error: PersistenceError) -> Self {
        Self::from_result(AsyncResult::failed(error))
    }

    pub(crate) fn from_result(inner: AsyncResult<Vec<T>>) -> Self {
        Self { inner }
    }

    /// Start the computation and consume it as a [`futures::Stream`].
    pub fn subscribe(&self) -> StreamSubscription<T> {
        StreamSubscription::new(self.inner.subscribe())
    }

    /// Gather the whole sequence into a single value.
    ///
    /// Always yields a list on success, empty when nothing was produced.
    pub fn collect_list(self) -> AsyncResult<Vec<T>> {
        self.inner
            .map_outcome(|outcome| outcome.map(|items| Some(items.unwrap_or_default())))
    }

    /// Transform every element. `f` runs on the worker that produced the sequence.
    pub fn map<U, F>(self, f: F) -> AsyncStream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        AsyncStream::from_result(
            self.inner
                .map(move |items| items.into_iter().map(&f).collect()),
        )
    }

    /// Transform every element with a fallible function; the first error fails the stream.
    pub fn try_map<U, F>(self, f: F) -> AsyncStream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        AsyncStream::from_result(
            self.inner
                .try_map(move |items| items.into_iter().map(&f).collect()),
        )
    }
}

impl<T> Clone for AsyncStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for AsyncStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::BridgeConfig;
    use crate::connection::pool::BlockingScheduler;
    use futures::StreamExt;
    use std::sync::Arc;

    fn stream_of(items: Vec<i32>) -> AsyncStream<i32> {
        let scheduler = BlockingScheduler::new(&BridgeConfig::new()).unwrap();
        AsyncStream::from_result(AsyncResult::from_job(
            scheduler,
            Arc::new(move || Ok(Some(items.clone()))),
        ))
    }

    #[tokio::test]
    async fn test_emits_in_order() {
        let stream = stream_of(vec![3, 1, 2]);
        let items: Vec<i32> = stream.subscribe().map(|item| item.unwrap()).collect().await;
        assert_eq!(items, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_collect_list() {
        assert_eq!(stream_of(vec![1, 2]).collect_list().await, Ok(Some(vec![1, 2])));
        assert_eq!(AsyncStream::<i32>::empty().collect_list().await, Ok(Some(vec![])));
    }

    #[tokio::test]
    async fn test_map_elements() {
        let doubled = stream_of(vec![1, 2, 3]).map(|n| n * 2).collect_list();
        assert_eq!(doubled.await, Ok(Some(vec![2, 4, 6])));
    }

    #[tokio::test]
    async fn test_try_map_failure_fails_stream() {
        let stream = stream_of(vec![1, 2, 3]).try_map(|n| {
            if n == 2 {
                Err(PersistenceError::TypeMismatch("two".into()))
            } else {
                Ok(n)
            }
        });

        let mut subscription = stream.subscribe();
        assert!(matches!(
            subscription.next().await,
            Some(Err(PersistenceError::TypeMismatch(_)))
        ));
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_stream() {
        let mut subscription = AsyncStream::<i32>::failed(PersistenceError::ContextClosed).subscribe();
        assert_eq!(
            subscription.next().await,
            Some(Err(PersistenceError::ContextClosed))
        );
        assert!(subscription.next().await.is_none());
    }
}
