use crate::core::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A type the bridge can hand to a persistence provider.
///
/// Mapping to storage is delegated to serde: the provider receives the entity as a JSON
/// record keyed by [`Entity::NAME`] and the serialized [`Entity::id`].
///
/// ```
/// use reactive_em::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Book {
///     id: String,
///     title: String,
/// }
///
/// impl Entity for Book {
///     const NAME: &'static str = "Book";
///     type Id = String;
///
///     fn id(&self) -> &String {
///         &self.id
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity name used in queries (`select b from Book b`).
    const NAME: &'static str;

    type Id: Serialize + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;
}

/// An entity flattened for the provider boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: Value,
    pub record: Value,
}

impl EntityRecord {
    pub fn from_entity<E: Entity>(entity: &E) -> Result<Self> {
        Ok(Self {
            id: serde_json::to_value(entity.id())?,
            record: serde_json::to_value(entity)?,
        })
    }
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
