pub mod entity_manager;
pub mod query;

pub use entity_manager::ReactiveEntityManager;
pub use query::{ReactiveQuery, ReactiveTypedQuery};
