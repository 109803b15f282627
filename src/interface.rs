use crate::core::{PersistenceError, Result};
use serde_json::Value;

/// A position inside an active transaction that later writes can be undone back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(pub usize);

/// A blocking persistence context.
///
/// This is the provider side of the bridge: every method may perform synchronous I/O and is
/// only ever called from a blocking worker. A context is not safe for concurrent use; the
/// bridge either creates one per unit of work or serializes access to a shared one.
///
/// Implement this trait to plug a real database client into the bridge. The crate ships
/// [`MemoryContext`](crate::storage::MemoryContext) for tests and simple apps.
pub trait PersistenceContext: Send {
    /// Look up a record by primary key. Absence is `Ok(None)`, not an error.
    fn find(&mut self, entity: &str, id: &Value) -> Result<Option<Value>>;

    /// Make a new record persistent. Fails with a constraint violation if the id exists.
    fn persist(&mut self, entity: &str, id: Value, record: Value) -> Result<()>;

    /// Insert or replace a record, returning the managed state.
    fn merge(&mut self, entity: &str, id: Value, record: Value) -> Result<Value>;

    /// Remove a record by primary key.
    fn remove(&mut self, entity: &str, id: &Value) -> Result<()>;

    /// Create a query for the given query string.
    fn create_query(&mut self, ql: &str) -> Result<Box<dyn NativeQuery + '_>>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn is_transaction_active(&self) -> bool;

    /// Mark the current position of the active transaction.
    fn savepoint(&mut self) -> Result<Savepoint>;

    /// Undo every write made after `savepoint`. The transaction stays active.
    fn rollback_to_savepoint(&mut self, savepoint: Savepoint) -> Result<()>;

    /// Release the context. Any active transaction is rolled back.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// A provider query bound to the context that created it.
pub trait NativeQuery {
    fn set_parameter(&mut self, name: &str, value: Value) -> Result<()>;

    fn set_first_result(&mut self, start: usize) -> Result<()>;

    fn set_max_results(&mut self, max: usize) -> Result<()>;

    /// Execute a select and return every row in provider order.
    fn result_list(&mut self) -> Result<Vec<Value>>;

    /// Execute a select expecting at most one row.
    ///
    /// Zero rows is `Ok(None)`; more than one row is [`PersistenceError::NonUniqueResult`].
    fn single_result(&mut self) -> Result<Option<Value>> {
        let mut rows = self.result_list()?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(PersistenceError::NonUniqueResult(n)),
        }
    }

    /// Execute an update or delete statement and return the number of affected rows.
    fn execute_update(&mut self) -> Result<u64>;
}

/// Creates fresh blocking contexts, one per unit of work.
pub trait ContextFactory: Send + Sync {
    fn create_context(&self) -> Result<Box<dyn PersistenceContext>>;
}
