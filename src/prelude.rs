//! Recommended imports grouped by abstraction level.
//!
//! `facade` covers application code that persists and queries entities.
//! `provider` is for implementing a persistence provider or driving contexts directly.

pub mod facade {
    //! High-level async surface.
    pub use crate::{
        AsyncResult, AsyncStream, BridgeConfig, Entity, ErrorKind, PersistenceError,
        ReactiveEntityManager, ReactiveQuery, ReactiveTypedQuery, Result,
    };
}

pub mod provider {
    //! Provider-side traits and the execution layer built on them.
    pub use crate::connection::{ContextExecutor, ContextSource, SharedContext, in_transaction};
    pub use crate::interface::{ContextFactory, NativeQuery, PersistenceContext, Savepoint};
    pub use crate::reactive::ReactiveWrapper;
    pub use crate::storage::{MemoryContext, MemoryStore};
}

pub use facade::*;
