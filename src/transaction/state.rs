// ============================================================================
// Transaction State Management
// ============================================================================
//
// Implements the State Pattern for transaction lifecycle management.
// Each transaction moves through defined states: Active -> Committed/Aborted
//
// A transaction works on a private copy of the committed tables taken at
// BEGIN. Reads inside the transaction see its own writes; nothing is visible
// to other contexts until the change log is committed.
//
// ============================================================================

use super::Change;
use crate::core::{PersistenceError, Result};
use crate::storage::Tables;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A provider transaction
///
/// Owned by a single context; never shared between threads.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,

    state: TransactionState,

    /// Committed tables as of BEGIN
    base: Tables,

    /// `base` plus this transaction's own writes
    working: Tables,

    /// Writes made during this transaction (Command Pattern)
    changes: Vec<Change>,

    /// Start time for diagnostics
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId, base: Tables) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            working: base.clone(),
            base,
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Tables as this transaction sees them
    pub fn working(&self) -> &Tables {
        &self.working
    }

    /// Get all changes recorded in this transaction
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Apply `change` to the working copy and record it for commit
    ///
    /// # Errors
    /// Returns error if transaction is not active, or if an insert hits an existing key
    pub fn record_change(&mut self, change: Change) -> Result<()> {
        if self.state.is_terminal() {
            return Err(PersistenceError::Transaction(format!(
                "Cannot record change: transaction {} is {}",
                self.id, self.state
            )));
        }

        self.working.apply(&change)?;
        self.changes.push(change);
        Ok(())
    }

    /// Current position in the change log
    pub fn savepoint(&self) -> usize {
        self.changes.len()
    }

    /// Drop every change recorded after `savepoint` and rebuild the working copy
    ///
    /// # Errors
    /// Returns error if transaction is not active or `savepoint` is past the end of the log
    pub fn rollback_to(&mut self, savepoint: usize) -> Result<()> {
        if self.state.is_terminal() {
            return Err(PersistenceError::Transaction(format!(
                "Cannot roll back to savepoint: transaction {} is {}",
                self.id, self.state
            )));
        }
        if savepoint > self.changes.len() {
            return Err(PersistenceError::Transaction(format!(
                "Savepoint {} is past the {} changes of transaction {}",
                savepoint,
                self.changes.len(),
                self.id
            )));
        }

        self.changes.truncate(savepoint);
        let mut working = self.base.clone();
        for change in &self.changes {
            working.apply(change)?;
        }
        self.working = working;
        Ok(())
    }

    /// Mark transaction as committed
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(PersistenceError::Transaction(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard changes
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(PersistenceError::Transaction(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.changes.clear();
        self.base = Tables::default();
        self.working = Tables::default();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
