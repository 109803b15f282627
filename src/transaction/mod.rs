// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Transactions of the in-memory provider.
//
// Design Patterns Used:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Command Pattern: Change log replayed at commit
// - Copy-on-Write: Private working copy per transaction
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::Change;
pub use state::{Transaction, TransactionId, TransactionState};
