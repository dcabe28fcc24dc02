//! Read operations of the document repository

use uuid::Uuid;

use crate::types::{Entity, Namespace};

use super::{crud, DocumentRepo, RepoError, RepoOp, RepoResult};

pub fn find<E: Entity>(repo: &DocumentRepo<E>, ns: &Namespace, id: Uuid) -> RepoResult<E> {
    let factory = repo.factory(ns, RepoOp::Find)?;
    repo.read_collection(ns, factory, |collection| collection.get(&id).cloned())?
        .ok_or_else(|| RepoError::EntityNotFound {
            namespace: ns.clone(),
            op: RepoOp::Find,
            id,
        })
}

/// Live entities in insertion order; soft-deleted ones are purged afterwards
pub fn find_all<E: Entity>(repo: &DocumentRepo<E>, ns: &Namespace) -> RepoResult<Vec<E>> {
    let factory = repo.factory(ns, RepoOp::FindAll)?;

    let (live, deleted) = repo.read_collection(ns, factory, |collection| {
        let mut live = Vec::with_capacity(collection.len());
        let mut deleted = Vec::new();
        for entity in collection.iter() {
            if entity.is_deleted() {
                deleted.push(entity.entity_id());
            } else {
                live.push(entity.clone());
            }
        }
        (live, deleted)
    })?;

    crud::purge_deleted(repo, ns, &deleted)?;
    Ok(live)
}

/// Stored entity count, soft-deleted ones included
pub fn len<E: Entity>(repo: &DocumentRepo<E>, ns: &Namespace) -> RepoResult<usize> {
    let factory = repo.factory(ns, RepoOp::FindAll)?;
    repo.read_collection(ns, factory, |collection| collection.len())
}
