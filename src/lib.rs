// ============================================================================
// reactive-em Library
// ============================================================================
//
// Runs blocking entity-manager work (find, persist, remove, queries, bulk
// updates, transactions) on a dedicated blocking executor and exposes the
// results as cold async values and streams.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod facade;
pub mod interface;
pub mod prelude;
pub mod reactive;
pub mod storage;
pub mod transaction;
mod evaluator;
mod parser;

// Re-export main types for convenience
pub use core::{Entity, EntityRecord, ErrorKind, PersistenceError, Result};
pub use facade::{ReactiveEntityManager, ReactiveQuery, ReactiveTypedQuery};
pub use interface::{ContextFactory, NativeQuery, PersistenceContext, Savepoint};
pub use reactive::{AsyncResult, AsyncStream, ReactiveWrapper, StreamSubscription, Subscription};

// Re-export execution API
pub use connection::{
    ContextExecutor, ContextSource, SharedContext,
    config::BridgeConfig,
    in_transaction,
    pool::{BlockingScheduler, SchedulerStats},
};
