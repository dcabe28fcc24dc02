//! Entity factory: how stored JSON documents become entities

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::types::Entity;

type HydrateFn<E> = Arc<dyn Fn(Value) -> serde_json::Result<E> + Send + Sync>;

/// Hydrates documents read from a collection file into `E`
///
/// [`EntityFactory::serde`] covers the common case. A custom function can
/// fill defaults or upcast documents written by an older model version.
pub struct EntityFactory<E> {
    hydrate: HydrateFn<E>,
}

impl<E: Entity> EntityFactory<E> {
    /// Hydrate documents with `E`'s `Deserialize` implementation
    pub fn serde() -> Self {
        Self::new(serde_json::from_value)
    }

    /// Hydrate documents with a custom function
    pub fn new<F>(hydrate: F) -> Self
    where
        F: Fn(Value) -> serde_json::Result<E> + Send + Sync + 'static,
    {
        Self {
            hydrate: Arc::new(hydrate),
        }
    }

    pub fn hydrate(&self, document: Value) -> serde_json::Result<E> {
        (self.hydrate)(document)
    }
}

impl<E> Clone for EntityFactory<E> {
    fn clone(&self) -> Self {
        Self {
            hydrate: Arc::clone(&self.hydrate),
        }
    }
}

impl<E> fmt::Debug for EntityFactory<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFactory")
            .field("entity", &std::any::type_name::<E>())
            .finish()
    }
}
