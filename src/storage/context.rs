use super::memory::{MemoryStore, StoredRow};
use super::query::MemoryQuery;
use crate::core::value::id_key;
use crate::core::{PersistenceError, Result};
use crate::interface::{NativeQuery, PersistenceContext, Savepoint};
use crate::parser::parse_statement;
use crate::transaction::{Change, Transaction, TransactionId};
use serde_json::Value;
use tracing::debug;

/// A context on a [`MemoryStore`]
///
/// Outside a transaction, reads see committed data and writes are rejected. Inside one, reads
/// see the transaction's working copy and writes are applied to it; the store only changes on
/// commit. Dropping an open context closes it, rolling back any active transaction.
#[derive(Debug)]
pub struct MemoryContext {
    id: u64,
    store: MemoryStore,
    transaction: Option<Transaction>,
    open: bool,
}

impl MemoryContext {
    pub(crate) fn new(id: u64, store: MemoryStore) -> Self {
        Self {
            id,
            store,
            transaction: None,
            open: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of the active transaction, if any
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.as_ref().map(Transaction::id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(PersistenceError::ContextClosed)
        }
    }

    fn writable(&mut self, operation: &str) -> Result<&mut Transaction> {
        self.ensure_open()?;
        self.transaction.as_mut().ok_or_else(|| {
            PersistenceError::TransactionRequired(format!(
                "{} requires an active transaction",
                operation
            ))
        })
    }

    /// Visible rows of `entity`: the working copy inside a transaction, committed data otherwise
    pub(crate) fn rows(&self, entity: &str) -> Result<Vec<StoredRow>> {
        self.ensure_open()?;
        match &self.transaction {
            Some(transaction) => Ok(transaction.working().rows(entity).to_vec()),
            None => self.store.read(|tables| tables.rows(entity).to_vec()),
        }
    }

    /// Record a write made by a bulk statement
    pub(crate) fn record(&mut self, operation: &str, change: Change) -> Result<()> {
        self.writable(operation)?.record_change(change)
    }
}

impl PersistenceContext for MemoryContext {
    fn find(&mut self, entity: &str, id: &Value) -> Result<Option<Value>> {
        self.ensure_open()?;
        let key = id_key(id);
        match &self.transaction {
            Some(transaction) => Ok(transaction
                .working()
                .get(entity, &key)
                .map(|row| row.record.clone())),
            None => self.store.read(|tables| {
                tables.get(entity, &key).map(|row| row.record.clone())
            }),
        }
    }

    fn persist(&mut self, entity: &str, id: Value, record: Value) -> Result<()> {
        let key = id_key(&id);
        self.writable("persist")?.record_change(Change::Insert {
            entity: entity.to_string(),
            key,
            id,
            record,
        })
    }

    fn merge(&mut self, entity: &str, id: Value, record: Value) -> Result<Value> {
        let key = id_key(&id);
        self.writable("merge")?.record_change(Change::Upsert {
            entity: entity.to_string(),
            key,
            id,
            record: record.clone(),
        })?;
        Ok(record)
    }

    fn remove(&mut self, entity: &str, id: &Value) -> Result<()> {
        let key = id_key(id);
        let transaction = self.writable("remove")?;
        if transaction.working().get(entity, &key).is_none() {
            return Ok(());
        }
        transaction.record_change(Change::Delete {
            entity: entity.to_string(),
            key,
        })
    }

    fn create_query(&mut self, ql: &str) -> Result<Box<dyn NativeQuery + '_>> {
        self.ensure_open()?;
        let statement = parse_statement(ql)?;
        Ok(Box::new(MemoryQuery::new(self, statement)))
    }

    fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.transaction.is_some() {
            return Err(PersistenceError::Transaction(
                "Transaction already active".into(),
            ));
        }

        let transaction = Transaction::new(TransactionId::new(), self.store.snapshot()?);
        debug!(context = self.id, transaction = %transaction.id(), "begin");
        self.transaction = Some(transaction);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut transaction = self
            .transaction
            .take()
            .ok_or_else(|| PersistenceError::Transaction("No active transaction".into()))?;

        // A failed commit leaves no transaction behind.
        if let Err(err) = self.store.commit(transaction.changes()) {
            let _ = transaction.rollback();
            debug!(context = self.id, transaction = %transaction.id(), error = %err, "commit failed");
            return Err(err);
        }

        transaction.commit()?;
        debug!(
            context = self.id,
            transaction = %transaction.id(),
            changes = transaction.change_count(),
            elapsed = ?transaction.duration(),
            "commit"
        );
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut transaction = self
            .transaction
            .take()
            .ok_or_else(|| PersistenceError::Transaction("No active transaction".into()))?;

        transaction.rollback()?;
        debug!(context = self.id, transaction = %transaction.id(), "rollback");
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|transaction| transaction.state().is_active())
    }

    fn savepoint(&mut self) -> Result<Savepoint> {
        let transaction = self.writable("savepoint")?;
        Ok(Savepoint(transaction.savepoint()))
    }

    fn rollback_to_savepoint(&mut self, savepoint: Savepoint) -> Result<()> {
        let context = self.id;
        let transaction = self.writable("rollback to savepoint")?;
        transaction.rollback_to(savepoint.0)?;
        debug!(context, transaction = %transaction.id(), savepoint = savepoint.0, "rollback to savepoint");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }

        if self.transaction.is_some() {
            self.rollback()?;
        }

        self.open = false;
        self.store.context_closed();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for MemoryContext {
    fn drop(&mut self) {
        // Ensure context is closed and transaction rolled back
        let _ = self.close();
    }
}
