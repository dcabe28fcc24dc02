//! Document Repository - read models per namespace
//!
//! Each namespace is one JSON array file, `<root>/<namespace>.json`, cached
//! in memory after the first touch. Every mutation rewrites the whole file
//! (atomically) while holding the write lock, so concurrent saves on a
//! namespace are fully serialized and never lose updates.

mod crud;
mod error;
mod factory;
mod query;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::base::StoreBase;
use crate::types::{Entity, Namespace};
use crate::utils::{atomic_write, cleanup_temp_files};

pub use error::{RepoError, RepoOp, RepoResult};
pub use factory::EntityFactory;

/// The documents of one namespace
///
/// `ids` keeps insertion order and drives `find_all`; `docs` holds the
/// entities. Both always contain the same set of ids.
#[derive(Debug, Clone)]
pub(crate) struct Collection<E> {
    ids: Vec<Uuid>,
    docs: HashMap<Uuid, E>,
}

impl<E: Entity> Collection<E> {
    fn new() -> Self {
        Self {
            ids: Vec::new(),
            docs: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn get(&self, id: &Uuid) -> Option<&E> {
        self.docs.get(id)
    }

    /// Documents in insertion order
    fn iter(&self) -> impl Iterator<Item = &E> {
        self.ids.iter().filter_map(|id| self.docs.get(id))
    }

    /// Insert or replace in place; returns the replaced document
    fn upsert(&mut self, entity: E) -> Option<E> {
        let id = entity.entity_id();
        let previous = self.docs.insert(id, entity);
        if previous.is_none() {
            self.ids.push(id);
        }
        previous
    }

    /// Revert an `upsert` of `id`
    fn undo_upsert(&mut self, id: Uuid, previous: Option<E>) {
        match previous {
            Some(old) => {
                self.docs.insert(id, old);
            }
            None => {
                self.docs.remove(&id);
                self.ids.retain(|known| *known != id);
            }
        }
    }

    /// Remove a document; returns its position and value
    fn remove(&mut self, id: &Uuid) -> Option<(usize, E)> {
        let entity = self.docs.remove(id)?;
        let index = self.ids.iter().position(|known| known == id).unwrap_or(self.ids.len());
        if index < self.ids.len() {
            self.ids.remove(index);
        }
        Some((index, entity))
    }

    /// Put back a document taken out by `remove`
    fn restore(&mut self, index: usize, entity: E) {
        let id = entity.entity_id();
        self.ids.insert(index.min(self.ids.len()), id);
        self.docs.insert(id, entity);
    }

    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let items: Vec<&E> = self.iter().collect();
        serde_json::to_vec_pretty(&items)
    }
}

/// Per-namespace collections of typed read-model entities
///
/// Entities go in and come out by value: the repository never hands out
/// references to its cached documents.
pub struct DocumentRepo<E: Entity> {
    pub(crate) base: StoreBase,
    pub(crate) factory: Option<EntityFactory<E>>,
    pub(crate) collections: RwLock<HashMap<Namespace, Collection<E>>>,
}

impl<E: Entity> DocumentRepo<E> {
    /// Open a repository rooted at `base`
    ///
    /// Creates the root folder and removes temp files left behind by
    /// rewrites that were interrupted by a crash. No entity factory is set:
    /// call [`DocumentRepo::set_entity_factory`] before using it.
    pub fn open(base: StoreBase) -> RepoResult<Self> {
        let could_not_open = |source: io::Error| RepoError::CouldNotOpen {
            folder: base.folder().to_path_buf(),
            source,
        };

        base.create_dir_all(base.folder()).map_err(could_not_open)?;
        let cleaned = cleanup_temp_files(base.folder()).map_err(could_not_open)?;
        if cleaned > 0 {
            info!(folder = %base.folder().display(), cleaned, "removed stale temp files");
        }

        Ok(Self {
            base,
            factory: None,
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Set the factory that hydrates stored documents into `E`
    pub fn set_entity_factory(&mut self, factory: EntityFactory<E>) {
        self.factory = Some(factory);
    }

    /// Builder-style [`DocumentRepo::set_entity_factory`]
    pub fn with_entity_factory(mut self, factory: EntityFactory<E>) -> Self {
        self.set_entity_factory(factory);
        self
    }

    pub fn base(&self) -> &StoreBase {
        &self.base
    }

    /// The configured factory, or `ModelNotSet`
    pub(crate) fn factory(&self, ns: &Namespace, op: RepoOp) -> RepoResult<&EntityFactory<E>> {
        self.factory.as_ref().ok_or_else(|| RepoError::ModelNotSet {
            namespace: ns.clone(),
            op,
        })
    }

    /// Run `f` on a namespace under the read lock, loading it first if needed
    pub(crate) fn read_collection<R>(
        &self,
        ns: &Namespace,
        factory: &EntityFactory<E>,
        f: impl FnOnce(&Collection<E>) -> R,
    ) -> RepoResult<R> {
        {
            let collections = self.collections.read();
            if let Some(collection) = collections.get(ns) {
                return Ok(f(collection));
            }
        }

        let mut collections = self.collections.write();
        if let Entry::Vacant(entry) = collections.entry(ns.clone()) {
            entry.insert(self.load_collection(ns, factory)?);
        }
        let collections = RwLockWriteGuard::downgrade(collections);
        Ok(f(&collections[ns]))
    }

    /// Run `f` on a namespace under the write lock, loading it first if needed
    ///
    /// The lock is held until `f` returns, so `f` can persist its change
    /// before anyone else observes the namespace.
    pub(crate) fn write_collection<R>(
        &self,
        ns: &Namespace,
        factory: &EntityFactory<E>,
        f: impl FnOnce(&mut Collection<E>) -> RepoResult<R>,
    ) -> RepoResult<R> {
        let mut collections = self.collections.write();
        let collection = match collections.entry(ns.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.load_collection(ns, factory)?),
        };
        f(collection)
    }

    /// Read a namespace file; a missing file is an empty collection
    fn load_collection(
        &self,
        ns: &Namespace,
        factory: &EntityFactory<E>,
    ) -> RepoResult<Collection<E>> {
        let path = self.base.collection_file(ns);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Collection::new()),
            Err(source) => {
                return Err(RepoError::CouldNotLoad {
                    namespace: ns.clone(),
                    source,
                })
            }
        };

        let could_not_unmarshal = |source: serde_json::Error| RepoError::CouldNotUnmarshal {
            namespace: ns.clone(),
            source,
        };

        let documents: Vec<Value> =
            serde_json::from_slice(&content).map_err(could_not_unmarshal)?;

        let mut collection = Collection::new();
        for document in documents {
            let entity = factory.hydrate(document).map_err(could_not_unmarshal)?;
            if entity.entity_id().is_nil() {
                warn!(namespace = %ns, "skipping stored document without entity id");
                continue;
            }
            collection.upsert(entity);
        }

        debug!(namespace = %ns, documents = collection.len(), "loaded collection");
        Ok(collection)
    }

    /// Rewrite a namespace file from the in-memory collection
    pub(crate) fn persist(&self, ns: &Namespace, collection: &Collection<E>) -> RepoResult<()> {
        let content = collection.to_json().map_err(|source| RepoError::CouldNotMarshal {
            namespace: ns.clone(),
            source,
        })?;

        atomic_write(&self.base, self.base.collection_file(ns), &content).map_err(|source| {
            RepoError::CouldNotSave {
                namespace: ns.clone(),
                source,
            }
        })?;

        debug!(namespace = %ns, documents = collection.len(), "rewrote collection");
        Ok(())
    }
}

// Public operations, implemented in crud.rs and query.rs
impl<E: Entity> DocumentRepo<E> {
    /// Value copy of one entity
    pub fn find(&self, ns: &Namespace, id: Uuid) -> RepoResult<E> {
        query::find(self, ns, id)
    }

    /// Value copies of all live entities, in insertion order
    ///
    /// Soft-deleted entities are left out and then removed from the store by
    /// [`DocumentRepo::purge_deleted`], so this call can shrink the
    /// namespace file.
    pub fn find_all(&self, ns: &Namespace) -> RepoResult<Vec<E>> {
        query::find_all(self, ns)
    }

    /// Number of stored entities, soft-deleted ones included
    pub fn len(&self, ns: &Namespace) -> RepoResult<usize> {
        query::len(self, ns)
    }

    /// Whether a namespace holds no entities
    pub fn is_empty(&self, ns: &Namespace) -> RepoResult<bool> {
        Ok(self.len(ns)? == 0)
    }

    /// Insert or replace an entity by id and rewrite the namespace file
    pub fn save(&self, ns: &Namespace, entity: E) -> RepoResult<()> {
        crud::save(self, ns, entity)
    }

    /// Remove an entity by id and rewrite the namespace file
    pub fn remove(&self, ns: &Namespace, id: Uuid) -> RepoResult<()> {
        crud::remove(self, ns, id)
    }

    /// Remove the given ids if they are still soft-deleted
    ///
    /// Returns how many entities were removed. The namespace file is
    /// rewritten once, and only if something was removed.
    pub fn purge_deleted(&self, ns: &Namespace, ids: &[Uuid]) -> RepoResult<usize> {
        crud::purge_deleted(self, ns, ids)
    }
}

impl<E: Entity> std::fmt::Debug for DocumentRepo<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRepo")
            .field("base", &self.base)
            .field("factory", &self.factory)
            .field("namespaces", &self.collections.read().len())
            .finish()
    }
}
