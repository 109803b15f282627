pub mod config;
pub mod pool;

use crate::core::{PersistenceError, Result};
use crate::interface::{ContextFactory, PersistenceContext};
use crate::reactive::{AsyncResult, AsyncStream, ReactiveWrapper};
use config::BridgeConfig;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Where a unit of work gets its persistence context from
#[derive(Clone)]
pub enum ContextSource {
    /// A fresh context per unit of work, closed when the work ends
    PerCall(Arc<dyn ContextFactory>),
    /// One context reused by every unit of work, one at a time
    Shared(Arc<SharedContext>),
}

impl ContextSource {
    /// Acquire a context, run `work` with it, release it.
    ///
    /// Per-call contexts are closed on every exit path, including a panic inside `work`.
    pub fn run<T>(&self, work: impl FnOnce(&mut dyn PersistenceContext) -> Result<T>) -> Result<T> {
        match self {
            ContextSource::PerCall(factory) => {
                let mut guard = ContextGuard::new(factory.create_context()?);
                work(guard.context())
            }
            ContextSource::Shared(shared) => shared.with_context(work),
        }
    }
}

impl std::fmt::Debug for ContextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextSource::PerCall(_) => write!(f, "PerCall"),
            ContextSource::Shared(_) => write!(f, "Shared"),
        }
    }
}

/// Closes a per-call context when dropped
struct ContextGuard {
    context: Box<dyn PersistenceContext>,
}

impl ContextGuard {
    fn new(context: Box<dyn PersistenceContext>) -> Self {
        debug!("opened per-call persistence context");
        Self { context }
    }

    fn context(&mut self) -> &mut dyn PersistenceContext {
        &mut *self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if !self.context.is_open() {
            return;
        }
        // A close failure never replaces the outcome of the work.
        if let Err(err) = self.context.close() {
            warn!(error = %err, "failed to close persistence context");
        }
    }
}

/// A persistence context shared between units of work
///
/// Access is serialized through a mutex. When built with [`SharedContext::lazy`] the context
/// is created on first use and recreated if it was closed.
pub struct SharedContext {
    slot: Mutex<Option<Box<dyn PersistenceContext>>>,
    factory: Option<Arc<dyn ContextFactory>>,
}

impl SharedContext {
    /// Share an existing, externally managed context
    pub fn new(context: Box<dyn PersistenceContext>) -> Self {
        Self {
            slot: Mutex::new(Some(context)),
            factory: None,
        }
    }

    /// Share a context created from `factory` on first use
    pub fn lazy(factory: Arc<dyn ContextFactory>) -> Self {
        Self {
            slot: Mutex::new(None),
            factory: Some(factory),
        }
    }

    /// Run `work` with exclusive access to the shared context.
    ///
    /// Blocks the calling thread while another unit of work holds the context, so call it
    /// from a blocking worker.
    pub fn with_context<T>(
        &self,
        work: impl FnOnce(&mut dyn PersistenceContext) -> Result<T>,
    ) -> Result<T> {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => {
                // A unit of work panicked while holding the context. Whatever it left half
                // done is rolled back before anyone else sees the context.
                let mut slot = poisoned.into_inner();
                if let Some(context) = slot.as_mut() {
                    if context.is_open() && context.is_transaction_active() {
                        if let Err(err) = context.rollback() {
                            warn!(error = %err, "failed to roll back after a panicked unit of work");
                        }
                    }
                }
                self.slot.clear_poison();
                slot
            }
        };

        let reusable = slot.as_ref().is_some_and(|context| context.is_open());
        if !reusable {
            let factory = self.factory.as_ref().ok_or(PersistenceError::ContextClosed)?;
            debug!("creating shared persistence context");
            *slot = Some(factory.create_context()?);
        }

        match slot.as_mut() {
            Some(context) => work(&mut **context),
            None => Err(PersistenceError::ContextClosed),
        }
    }

    /// Close the shared context. A lazy context is recreated on next use.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock()?;
        match slot.take() {
            Some(mut context) if context.is_open() => context.close(),
            _ => Ok(()),
        }
    }
}

/// Run `work` inside a transaction owned by this call.
///
/// Begins before the work, commits after it, and rolls back when either the work or the commit
/// fails. If the context already has an active transaction the work joins it and the caller that
/// began it stays responsible for ending it; a failed joined unit of work is undone back to a
/// savepoint taken before it started, so none of its writes reach the caller's commit.
pub fn in_transaction<T>(
    context: &mut dyn PersistenceContext,
    work: impl FnOnce(&mut dyn PersistenceContext) -> Result<T>,
) -> Result<T> {
    if context.is_transaction_active() {
        return in_joined_transaction(context, work);
    }

    context.begin()?;
    let outcome = work(&mut *context).and_then(|value| context.commit().map(|_| value));

    if let Err(err) = &outcome {
        if context.is_transaction_active() {
            debug!(error = %err, "rolling back unit of work");
            if let Err(rollback_err) = context.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
        }
    }

    outcome
}

fn in_joined_transaction<T>(
    context: &mut dyn PersistenceContext,
    work: impl FnOnce(&mut dyn PersistenceContext) -> Result<T>,
) -> Result<T> {
    let savepoint = context.savepoint()?;
    let outcome = work(&mut *context);

    if let Err(err) = &outcome {
        if context.is_transaction_active() {
            debug!(error = %err, "undoing joined unit of work");
            if let Err(undo_err) = context.rollback_to_savepoint(savepoint) {
                warn!(error = %undo_err, "rollback to savepoint failed");
            }
        }
    }

    outcome
}

/// Runs units of work against persistence contexts on the blocking scheduler
///
/// Every method returns a cold handle; each subscription acquires a context, wraps the work in
/// [`in_transaction`], and releases the context before the result is delivered.
#[derive(Clone, Debug)]
pub struct ContextExecutor {
    wrapper: ReactiveWrapper,
    source: ContextSource,
}

impl ContextExecutor {
    pub fn new(wrapper: ReactiveWrapper, source: ContextSource) -> Self {
        Self { wrapper, source }
    }

    /// One fresh context per unit of work
    pub fn per_call(wrapper: ReactiveWrapper, factory: Arc<dyn ContextFactory>) -> Self {
        Self::new(wrapper, ContextSource::PerCall(factory))
    }

    /// Every unit of work runs on `context`, one at a time
    pub fn shared(wrapper: ReactiveWrapper, context: Arc<SharedContext>) -> Self {
        Self::new(wrapper, ContextSource::Shared(context))
    }

    /// Build the scheduler and context policy described by `config`
    pub fn from_config(config: &BridgeConfig, factory: Arc<dyn ContextFactory>) -> Result<Self> {
        let wrapper = ReactiveWrapper::new(config)?;
        if config.shared_context {
            Ok(Self::shared(wrapper, Arc::new(SharedContext::lazy(factory))))
        } else {
            Ok(Self::per_call(wrapper, factory))
        }
    }

    pub fn wrapper(&self) -> &ReactiveWrapper {
        &self.wrapper
    }

    pub fn source(&self) -> &ContextSource {
        &self.source
    }

    /// Run a single-value unit of work in its own transaction.
    pub fn execute<T, F>(&self, work: F) -> AsyncResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut dyn PersistenceContext) -> Result<Option<T>> + Send + Sync + 'static,
    {
        let source = self.source.clone();
        self.wrapper
            .from_callable(move || source.run(|context| in_transaction(context, &work)))
    }

    /// Run a multi-value unit of work in its own transaction.
    pub fn execute_many<T, F>(&self, work: F) -> AsyncStream<T>
    where
        T: Send + 'static,
        F: Fn(&mut dyn PersistenceContext) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        let source = self.source.clone();
        self.wrapper
            .from_iterable(move || source.run(|context| in_transaction(context, &work)))
    }

    /// Run a unit of work without opening a transaction around it.
    pub fn execute_unmanaged<T, F>(&self, work: F) -> AsyncResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut dyn PersistenceContext) -> Result<Option<T>> + Send + Sync + 'static,
    {
        let source = self.source.clone();
        self.wrapper.from_callable(move || source.run(&work))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn executor(store: &MemoryStore) -> ContextExecutor {
        ContextExecutor::per_call(ReactiveWrapper::global(), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_execute_commits_and_closes() {
        let store = MemoryStore::new();
        let executor = executor(&store);

        let result = executor.execute(|context| {
            context.persist("Book", json!("1"), json!({"id": "1", "title": "test"}))?;
            Ok(Some(1))
        });

        assert_eq!(result.await, Ok(Some(1)));
        assert_eq!(store.count("Book"), 1);
        assert_eq!(store.open_contexts(), 0);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_unit_of_work() {
        let store = MemoryStore::new();
        let executor = executor(&store);

        let result = executor.execute::<(), _>(|context| {
            context.persist("Book", json!("1"), json!({"id": "1"}))?;
            Err(PersistenceError::QueryError("late failure".into()))
        });

        assert_eq!(
            result.await,
            Err(PersistenceError::QueryError("late failure".into()))
        );
        assert_eq!(store.count("Book"), 0);
        assert_eq!(store.open_contexts(), 0);
    }

    #[tokio::test]
    async fn test_panic_closes_context() {
        let store = MemoryStore::new();
        let executor = executor(&store);

        let result = executor.execute::<(), _>(|context| {
            context.persist("Book", json!("1"), json!({"id": "1"}))?;
            panic!("unit of work exploded");
        });

        assert!(matches!(result.await, Err(PersistenceError::ExecutionError(_))));
        assert_eq!(store.count("Book"), 0);
        assert_eq!(store.open_contexts(), 0);
    }

    #[tokio::test]
    async fn test_unmanaged_write_requires_transaction() {
        let store = MemoryStore::new();
        let executor = executor(&store);

        let result = executor.execute_unmanaged::<(), _>(|context| {
            context.persist("Book", json!("1"), json!({"id": "1"}))?;
            Ok(None)
        });

        assert!(matches!(
            result.await,
            Err(PersistenceError::TransactionRequired(_))
        ));
    }

    #[test]
    fn test_in_transaction_joins_active_transaction() {
        let store = MemoryStore::new();
        let mut context = store.open_context();
        context.begin().unwrap();

        in_transaction(&mut context, |context| {
            context.persist("Book", json!("1"), json!({"id": "1"}))
        })
        .unwrap();

        // Still owned by the outer caller.
        assert!(context.is_transaction_active());
        assert_eq!(store.count("Book"), 0);

        context.commit().unwrap();
        assert_eq!(store.count("Book"), 1);
    }

    #[test]
    fn test_failed_joined_work_leaves_outer_transaction_intact() {
        let store = MemoryStore::new();
        let mut context = store.open_context();
        context.begin().unwrap();
        context.persist("Book", json!("outer"), json!({"id": "outer"})).unwrap();

        let result: Result<()> = in_transaction(&mut context, |context| {
            context.persist("Book", json!("inner"), json!({"id": "inner"}))?;
            Err(PersistenceError::QueryError("late failure".into()))
        });
        assert!(result.is_err());

        assert!(context.is_transaction_active());
        assert!(context.find("Book", &json!("inner")).unwrap().is_none());
        context.commit().unwrap();
        assert_eq!(store.count("Book"), 1);
        assert!(store.get("Book", &json!("outer")).is_some());
    }

    #[test]
    fn test_shared_context_reused_and_recreated() {
        let store = MemoryStore::new();
        let shared = SharedContext::lazy(Arc::new(store.clone()));

        shared.with_context(|context| context.begin()).unwrap();
        let active = shared
            .with_context(|context| Ok(context.is_transaction_active()))
            .unwrap();
        assert!(active);
        assert_eq!(store.contexts_created(), 1);

        shared.close().unwrap();
        shared.with_context(|_| Ok(())).unwrap();
        assert_eq!(store.contexts_created(), 2);
    }

    #[test]
    fn test_shared_context_without_factory_fails_after_close() {
        let store = MemoryStore::new();
        let shared = SharedContext::new(Box::new(store.open_context()));

        shared.close().unwrap();
        assert_eq!(
            shared.with_context(|_| Ok(())),
            Err(PersistenceError::ContextClosed)
        );
    }
}
