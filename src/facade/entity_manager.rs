use super::query::{ReactiveQuery, ReactiveTypedQuery};
use crate::connection::ContextExecutor;
use crate::connection::config::BridgeConfig;
use crate::core::{Entity, EntityRecord, PersistenceError, Result, decode};
use crate::interface::ContextFactory;
use crate::reactive::{AsyncResult, AsyncStream, ReactiveWrapper};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Non-blocking entity manager
///
/// Every method returns immediately with a cold [`AsyncResult`] or [`AsyncStream`]. Awaiting or
/// subscribing runs exactly one unit of work on the blocking scheduler: a context is acquired,
/// a transaction is begun, the provider calls are made, and the transaction is committed (or
/// rolled back on failure) before the result is delivered.
///
/// ```
/// use reactive_em::{Entity, ReactiveEntityManager, storage::MemoryStore};
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Book {
///     id: String,
///     title: String,
/// }
///
/// impl Entity for Book {
///     const NAME: &'static str = "Book";
///     type Id = String;
///
///     fn id(&self) -> &String {
///         &self.id
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> reactive_em::Result<()> {
/// let em = ReactiveEntityManager::with_store(MemoryStore::new());
/// let book = Book { id: "1".into(), title: "test".into() };
///
/// em.persist([book.clone()]).await?;
/// assert_eq!(em.find::<Book>("1").await?, Some(book));
/// assert_eq!(em.find::<Book>("2").await?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ReactiveEntityManager {
    executor: ContextExecutor,
}

impl ReactiveEntityManager {
    /// Per-call contexts from `factory`, run by `wrapper`
    pub fn new(wrapper: ReactiveWrapper, factory: Arc<dyn ContextFactory>) -> Self {
        Self::from_executor(ContextExecutor::per_call(wrapper, factory))
    }

    /// Scheduler and context policy taken from `config`
    pub fn with_config(config: &BridgeConfig, factory: Arc<dyn ContextFactory>) -> Result<Self> {
        Ok(Self::from_executor(ContextExecutor::from_config(
            config, factory,
        )?))
    }

    /// Per-call contexts from `factory` on the process-wide scheduler
    pub fn with_store<F: ContextFactory + 'static>(factory: F) -> Self {
        Self::new(ReactiveWrapper::global(), Arc::new(factory))
    }

    pub fn from_executor(executor: ContextExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &ContextExecutor {
        &self.executor
    }

    /// Persist entities in one transaction; completes empty.
    ///
    /// An empty input completes without touching the provider. If any entity fails (for
    /// example a duplicate id) none of them are persisted.
    pub fn persist<E, I>(&self, entities: I) -> AsyncResult<()>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let entities: Arc<Vec<E>> = Arc::new(entities.into_iter().collect());
        if entities.is_empty() {
            return AsyncResult::empty();
        }

        self.executor.execute(move |context| {
            debug!(entity = E::NAME, count = entities.len(), "persist");
            for entity in entities.iter() {
                let EntityRecord { id, record } = EntityRecord::from_entity(entity)?;
                context.persist(E::NAME, id, record)?;
            }
            Ok(None)
        })
    }

    /// Insert-or-replace entities in one transaction and emit the managed state of each, in
    /// input order.
    pub fn merge<E, I>(&self, entities: I) -> AsyncStream<E>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let entities: Arc<Vec<E>> = Arc::new(entities.into_iter().collect());
        if entities.is_empty() {
            return AsyncStream::empty();
        }

        self.executor.execute_many(move |context| {
            debug!(entity = E::NAME, count = entities.len(), "merge");
            entities
                .iter()
                .map(|entity| {
                    let EntityRecord { id, record } = EntityRecord::from_entity(entity)?;
                    decode(context.merge(E::NAME, id, record)?)
                })
                .collect()
        })
    }

    /// Remove entities in one transaction; completes empty.
    ///
    /// Entities that do not exist are skipped.
    pub fn remove<E, I>(&self, entities: I) -> AsyncResult<()>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let entities: Arc<Vec<E>> = Arc::new(entities.into_iter().collect());
        if entities.is_empty() {
            return AsyncResult::empty();
        }

        self.executor.execute(move |context| {
            debug!(entity = E::NAME, count = entities.len(), "remove");
            for entity in entities.iter() {
                let id = serde_json::to_value(entity.id())?;
                context.remove(E::NAME, &id)?;
            }
            Ok(None)
        })
    }

    /// Look up an entity by id; completes empty when there is none.
    pub fn find<E: Entity>(&self, id: impl Serialize) -> AsyncResult<E> {
        let id = match serde_json::to_value(id) {
            Ok(id) => id,
            Err(err) => return AsyncResult::failed(PersistenceError::from(err)),
        };

        self.executor.execute(move |context| {
            debug!(entity = E::NAME, %id, "find");
            context.find(E::NAME, &id)?.map(decode::<E>).transpose()
        })
    }

    /// Create a query whose results decode into `T`
    pub fn create_query<T>(&self, ql: &str) -> ReactiveTypedQuery<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        ReactiveTypedQuery::new(self.executor.clone(), ql)
    }

    /// Create a query whose result type is chosen later, or a bulk update/delete
    pub fn create_untyped_query(&self, ql: &str) -> ReactiveQuery {
        ReactiveQuery::new(self.executor.clone(), ql)
    }
}
