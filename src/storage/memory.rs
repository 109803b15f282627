use super::context::MemoryContext;
use crate::core::value::{id_key, lookup_path, set_path};
use crate::core::{PersistenceError, Result};
use crate::interface::{ContextFactory, PersistenceContext};
use crate::transaction::Change;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// Canonical form of `id` used for lookups
    pub key: String,
    pub id: Value,
    pub record: Value,
}

/// Records of one entity, in insertion order
#[derive(Debug, Clone, Default)]
pub struct Table {
    rows: Vec<StoredRow>,
}

impl Table {
    pub fn rows(&self) -> &[StoredRow] {
        &self.rows
    }

    pub fn get(&self, key: &str) -> Option<&StoredRow> {
        self.rows.iter().find(|row| row.key == key)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.key == key)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut StoredRow> {
        self.rows.iter_mut().find(|row| row.key == key)
    }
}

/// All tables, keyed by entity name
#[derive(Debug, Clone, Default)]
pub struct Tables {
    tables: HashMap<String, Table>,
}

impl Tables {
    pub fn rows(&self, entity: &str) -> &[StoredRow] {
        self.tables.get(entity).map(Table::rows).unwrap_or(&[])
    }

    pub fn get(&self, entity: &str, key: &str) -> Option<&StoredRow> {
        self.tables.get(entity).and_then(|table| table.get(key))
    }

    pub fn len(&self, entity: &str) -> usize {
        self.rows(entity).len()
    }

    /// Apply one change in place
    ///
    /// # Errors
    /// An insert whose key already exists is a constraint violation. An update fails when a
    /// path no longer fits the stored record.
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::Insert {
                entity,
                key,
                id,
                record,
            } => {
                let table = self.tables.entry(entity.clone()).or_default();
                if table.get(key).is_some() {
                    return Err(PersistenceError::ConstraintViolation(format!(
                        "{} with id {} already exists",
                        entity, id
                    )));
                }
                table.rows.push(StoredRow {
                    key: key.clone(),
                    id: id.clone(),
                    record: record.clone(),
                });
            }
            Change::Upsert {
                entity,
                key,
                id,
                record,
            } => {
                let table = self.tables.entry(entity.clone()).or_default();
                let row = StoredRow {
                    key: key.clone(),
                    id: id.clone(),
                    record: record.clone(),
                };
                match table.position(key) {
                    Some(index) => table.rows[index] = row,
                    None => table.rows.push(row),
                }
            }
            Change::Update {
                entity,
                key,
                assignments,
            } => {
                let Some(row) = self.tables.get_mut(entity).and_then(|table| table.get_mut(key))
                else {
                    debug!(entity = %entity, key = %key, "update target gone, skipped");
                    return Ok(());
                };
                // Work on a copy so a failing path leaves the row untouched.
                let mut record = row.record.clone();
                for (path, value) in assignments {
                    set_path(&mut record, path, value.clone())?;
                }
                row.record = record;
            }
            Change::Delete { entity, key } => {
                if let Some(table) = self.tables.get_mut(entity) {
                    table.rows.retain(|row| &row.key != key);
                }
            }
        }
        Ok(())
    }
}

/// A unique constraint on a (possibly nested) field
#[derive(Debug, Clone, PartialEq, Eq)]
struct UniqueConstraint {
    entity: String,
    field: Vec<String>,
}

/// In-memory reference provider
///
/// Cloning is cheap; clones share the same committed data. Every context created from the
/// store sees commits from all others.
///
/// ```
/// use reactive_em::storage::MemoryStore;
/// use reactive_em::PersistenceContext;
/// use serde_json::json;
///
/// let store = MemoryStore::new();
/// let mut context = store.open_context();
/// context.begin()?;
/// context.persist("Book", json!("1"), json!({"id": "1", "title": "test"}))?;
/// context.commit()?;
/// assert_eq!(store.count("Book"), 1);
/// # Ok::<(), reactive_em::PersistenceError>(())
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    tables: RwLock<Tables>,
    unique: RwLock<Vec<UniqueConstraint>>,
    open_contexts: AtomicUsize,
    contexts_created: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject commits that would leave two records of `entity` with the same non-null `field`.
    /// `field` may be a dotted path (`author.email`).
    pub fn add_unique_constraint(&self, entity: &str, field: &str) -> Result<()> {
        let constraint = UniqueConstraint {
            entity: entity.to_string(),
            field: field.split('.').map(str::to_string).collect(),
        };
        let tables = self.inner.tables.read()?;
        check_unique(&tables, std::slice::from_ref(&constraint))?;

        let mut unique = self.inner.unique.write()?;
        if !unique.contains(&constraint) {
            unique.push(constraint);
        }
        Ok(())
    }

    /// Open a new context on this store
    pub fn open_context(&self) -> MemoryContext {
        let id = self.inner.contexts_created.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.open_contexts.fetch_add(1, Ordering::SeqCst);
        MemoryContext::new(id, self.clone())
    }

    /// Number of contexts opened and not yet closed
    pub fn open_contexts(&self) -> usize {
        self.inner.open_contexts.load(Ordering::SeqCst)
    }

    /// Number of contexts ever opened
    pub fn contexts_created(&self) -> u64 {
        self.inner.contexts_created.load(Ordering::SeqCst)
    }

    /// Committed record count for `entity`
    pub fn count(&self, entity: &str) -> usize {
        self.read(|tables| tables.len(entity)).unwrap_or(0)
    }

    /// Committed record by id, if any
    pub fn get(&self, entity: &str, id: &Value) -> Option<Value> {
        let key = id_key(id);
        self.read(|tables| tables.get(entity, &key).map(|row| row.record.clone()))
            .ok()
            .flatten()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R> {
        let tables = self.inner.tables.read()?;
        Ok(f(&tables))
    }

    pub(crate) fn snapshot(&self) -> Result<Tables> {
        self.read(Tables::clone)
    }

    /// Replay `changes` against the committed tables, all or nothing
    pub(crate) fn commit(&self, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tables = self.inner.tables.write()?;
        let mut next = tables.clone();
        for change in changes {
            next.apply(change)?;
        }
        check_unique(&next, &self.inner.unique.read()?)?;

        *tables = next;
        debug!(changes = changes.len(), "committed changes");
        Ok(())
    }

    pub(crate) fn context_closed(&self) {
        self.inner.open_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContextFactory for MemoryStore {
    fn create_context(&self) -> Result<Box<dyn PersistenceContext>> {
        Ok(Box::new(self.open_context()))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("open_contexts", &self.open_contexts())
            .field("contexts_created", &self.contexts_created())
            .finish()
    }
}

fn check_unique(tables: &Tables, constraints: &[UniqueConstraint]) -> Result<()> {
    for constraint in constraints {
        let mut seen: Vec<&Value> = Vec::new();
        for row in tables.rows(&constraint.entity) {
            let value = lookup_path(&row.record, &constraint.field);
            if value.is_null() {
                continue;
            }
            if seen.contains(&value) {
                return Err(PersistenceError::ConstraintViolation(format!(
                    "Duplicate value {} for unique field {}.{}",
                    value,
                    constraint.entity,
                    constraint.field.join(".")
                )));
            }
            seen.push(value);
        }
    }
    Ok(())
}
