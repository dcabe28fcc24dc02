//! Read-model entities stored by the document repository

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// A read-model document identified by a UUID
///
/// Entities are copied in and out of the repository by value, so `Clone`
/// must produce an independent copy. A document whose [`Entity::deleted`]
/// returns `Some` is soft-deleted: `find_all` no longer returns it and
/// purges it from the collection.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier, serialized as `entityId`; `Uuid::nil()` means "unset"
    fn entity_id(&self) -> Uuid;

    /// Soft-delete timestamp
    fn deleted(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn is_deleted(&self) -> bool {
        self.deleted().is_some()
    }
}
