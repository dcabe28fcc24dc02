//! Mutating operations of the document repository

use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Entity, Namespace};

use super::{DocumentRepo, RepoError, RepoOp, RepoResult};

/// Insert or replace an entity (holds the write lock through the rewrite)
pub fn save<E: Entity>(repo: &DocumentRepo<E>, ns: &Namespace, entity: E) -> RepoResult<()> {
    let factory = repo.factory(ns, RepoOp::Save)?;

    let id = entity.entity_id();
    if id.is_nil() {
        return Err(RepoError::MissingEntityId {
            namespace: ns.clone(),
        });
    }

    repo.write_collection(ns, factory, |collection| {
        let previous = collection.upsert(entity);
        let replaced = previous.is_some();
        if let Err(e) = repo.persist(ns, collection) {
            collection.undo_upsert(id, previous);
            return Err(e);
        }
        debug!(namespace = %ns, %id, replaced, "saved entity");
        Ok(())
    })
}

/// Remove an entity (holds the write lock through the rewrite)
pub fn remove<E: Entity>(repo: &DocumentRepo<E>, ns: &Namespace, id: Uuid) -> RepoResult<()> {
    let factory = repo.factory(ns, RepoOp::Remove)?;

    repo.write_collection(ns, factory, |collection| {
        let (index, entity) = collection.remove(&id).ok_or_else(|| RepoError::EntityNotFound {
            namespace: ns.clone(),
            op: RepoOp::Remove,
            id,
        })?;
        if let Err(e) = repo.persist(ns, collection) {
            collection.restore(index, entity);
            return Err(e);
        }
        debug!(namespace = %ns, %id, "removed entity");
        Ok(())
    })
}

/// Drop entities that are still soft-deleted
///
/// Each id is checked again under the write lock: an entity saved back
/// without a deletion mark since the caller looked at it is kept. Ids that
/// are no longer present are skipped.
pub fn purge_deleted<E: Entity>(
    repo: &DocumentRepo<E>,
    ns: &Namespace,
    ids: &[Uuid],
) -> RepoResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let factory = repo.factory(ns, RepoOp::FindAll)?;

    repo.write_collection(ns, factory, |collection| {
        let mut purged = Vec::new();
        for id in ids {
            if collection.get(id).is_some_and(|entity| entity.is_deleted()) {
                if let Some(removed) = collection.remove(id) {
                    purged.push(removed);
                }
            }
        }
        if purged.is_empty() {
            return Ok(0);
        }

        if let Err(e) = repo.persist(ns, collection) {
            // Removals are undone in reverse so each index is valid again
            for (index, entity) in purged.into_iter().rev() {
                collection.restore(index, entity);
            }
            return Err(e);
        }

        info!(namespace = %ns, purged = purged.len(), "purged soft-deleted entities");
        Ok(purged.len())
    })
}
