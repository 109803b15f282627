//! In-memory reference provider
//!
//! Implements the provider traits from [`crate::interface`] over JSON records, with
//! per-context transactions and a small JPQL-like query dialect. Full scans only.

pub mod context;
pub mod memory;
pub mod query;

pub use context::MemoryContext;
pub use memory::{MemoryStore, StoredRow, Table, Tables};
pub use query::MemoryQuery;
