pub mod entity;
pub mod error;
pub mod value;

pub use entity::{Entity, EntityRecord, decode};
pub use error::{ErrorKind, PersistenceError, Result};
