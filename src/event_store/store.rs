//! Event Store - per-aggregate append-only logs
//!
//! Every aggregate owns one file, `<root>/<namespace>/<aggregateId>.json`,
//! holding one JSON event per line in version order. The current version of
//! an aggregate is the version of the last line, read with a
//! [`ReverseScanner`] so that appending to a long history never requires
//! reading it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::base::StoreBase;
use crate::error::ErrorKind;
use crate::types::{Event, Namespace, RawEvent, VersionProbe};
use crate::utils::ReverseScanner;

use super::factory::{DecodeError, EventDataFactory};

/// Result type for EventStore operations
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Errors that can occur in EventStore operations
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("no events to append (namespace '{namespace}')")]
    NoEventsToAppend { namespace: Namespace },

    #[error("invalid event for aggregate {aggregate_id}: {reason} (namespace '{namespace}')")]
    InvalidEvent {
        namespace: Namespace,
        aggregate_id: Uuid,
        reason: String,
    },

    #[error("incorrect event version for aggregate {aggregate_id}: expected {expected}, got {actual} (namespace '{namespace}')")]
    IncorrectEventVersion {
        namespace: Namespace,
        aggregate_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("version conflict for aggregate {aggregate_id}: loaded {expected}, persisted {actual} (namespace '{namespace}')")]
    VersionConflict {
        namespace: Namespace,
        aggregate_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("could not marshal event for aggregate {aggregate_id} (namespace '{namespace}'): {source}")]
    CouldNotMarshal {
        namespace: Namespace,
        aggregate_id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not save aggregate {aggregate_id} (namespace '{namespace}'): {source}")]
    CouldNotSave {
        namespace: Namespace,
        aggregate_id: Uuid,
        #[source]
        source: io::Error,
    },

    #[error("could not load aggregate {aggregate_id} (namespace '{namespace}'): {source}")]
    CouldNotLoad {
        namespace: Namespace,
        aggregate_id: Uuid,
        #[source]
        source: io::Error,
    },

    #[error("could not unmarshal event of aggregate {aggregate_id} at byte {offset} (namespace '{namespace}'): {source}")]
    CouldNotUnmarshal {
        namespace: Namespace,
        aggregate_id: Uuid,
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not decode event of aggregate {aggregate_id} (namespace '{namespace}'): {source}")]
    CouldNotDecode {
        namespace: Namespace,
        aggregate_id: Uuid,
        #[source]
        source: DecodeError,
    },

    #[error("inconsistent event log for aggregate {aggregate_id}: {detail} (namespace '{namespace}')")]
    InconsistentLog {
        namespace: Namespace,
        aggregate_id: Uuid,
        detail: String,
    },

    #[error("could not clear namespace '{namespace}': {source}")]
    CouldNotClear {
        namespace: Namespace,
        #[source]
        source: io::Error,
    },
}

impl EventStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventStoreError::NoEventsToAppend { .. }
            | EventStoreError::InvalidEvent { .. }
            | EventStoreError::IncorrectEventVersion { .. } => ErrorKind::InvalidInput,
            EventStoreError::VersionConflict { .. } => ErrorKind::VersionConflict,
            EventStoreError::CouldNotMarshal { .. }
            | EventStoreError::CouldNotUnmarshal { .. }
            | EventStoreError::InconsistentLog { .. } => ErrorKind::Serialization,
            EventStoreError::CouldNotDecode { source, .. } => source.kind(),
            EventStoreError::CouldNotSave { .. }
            | EventStoreError::CouldNotLoad { .. }
            | EventStoreError::CouldNotClear { .. } => ErrorKind::Io,
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        self.kind() == ErrorKind::VersionConflict
    }

    /// Namespace the failed operation ran in
    pub fn namespace(&self) -> &Namespace {
        match self {
            EventStoreError::NoEventsToAppend { namespace }
            | EventStoreError::InvalidEvent { namespace, .. }
            | EventStoreError::IncorrectEventVersion { namespace, .. }
            | EventStoreError::VersionConflict { namespace, .. }
            | EventStoreError::CouldNotMarshal { namespace, .. }
            | EventStoreError::CouldNotSave { namespace, .. }
            | EventStoreError::CouldNotLoad { namespace, .. }
            | EventStoreError::CouldNotUnmarshal { namespace, .. }
            | EventStoreError::CouldNotDecode { namespace, .. }
            | EventStoreError::InconsistentLog { namespace, .. }
            | EventStoreError::CouldNotClear { namespace, .. } => namespace,
        }
    }
}

/// Append-only, per-aggregate event logs with optimistic concurrency
///
/// Saves to the same aggregate are serialized inside the process, so two
/// callers racing with the same `original_version` cannot both succeed.
/// Several processes writing the same folder are not supported: there is no
/// file locking, and racing writers can break version contiguity.
pub struct EventStore<D> {
    base: StoreBase,
    factory: EventDataFactory<D>,
    /// One lock per aggregate file, created on first save
    write_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl<D: 'static> EventStore<D> {
    /// Create a store rooted at `base` that decodes payloads with `factory`
    pub fn new(base: StoreBase, factory: EventDataFactory<D>) -> Self {
        Self {
            base,
            factory,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn base(&self) -> &StoreBase {
        &self.base
    }

    pub fn factory(&self) -> &EventDataFactory<D> {
        &self.factory
    }

    /// Append `events` to their aggregate's log
    ///
    /// `original_version` is the version the caller loaded the aggregate at;
    /// the batch must continue it without gaps (`original_version + 1`,
    /// `+ 2`, ...). If another save got in first, the persisted version no
    /// longer matches and [`EventStoreError::VersionConflict`] is returned;
    /// nothing is written in that case. The whole batch is serialized before
    /// the file is touched and appended with a single write followed by
    /// `sync_all`.
    pub fn save(
        &self,
        ns: &Namespace,
        events: &[Event<D>],
        original_version: u64,
    ) -> EventStoreResult<()>
    where
        D: Serialize,
    {
        let first = events
            .first()
            .ok_or_else(|| EventStoreError::NoEventsToAppend { namespace: ns.clone() })?;
        let aggregate_id = first.aggregate_id;

        let mut batch = String::new();
        for (i, event) in events.iter().enumerate() {
            if event.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidEvent {
                    namespace: ns.clone(),
                    aggregate_id,
                    reason: format!("event {} belongs to aggregate {}", event, event.aggregate_id),
                });
            }

            let expected = (i as u64)
                .checked_add(1)
                .and_then(|step| original_version.checked_add(step));
            if expected != Some(event.version) {
                return Err(EventStoreError::IncorrectEventVersion {
                    namespace: ns.clone(),
                    aggregate_id,
                    expected: expected.unwrap_or(u64::MAX),
                    actual: event.version,
                });
            }

            let line = event
                .to_json_line()
                .map_err(|source| EventStoreError::CouldNotMarshal {
                    namespace: ns.clone(),
                    aggregate_id,
                    source,
                })?;
            batch.push_str(&line);
            batch.push('\n');
        }

        let path = self.base.aggregate_file(ns, aggregate_id);
        self.with_write_lock(&path, || {
            self.append_batch(ns, aggregate_id, &path, batch.as_bytes(), original_version)
        })?;

        debug!(
            namespace = %ns,
            %aggregate_id,
            from = original_version + 1,
            to = original_version + events.len() as u64,
            "appended events"
        );
        Ok(())
    }

    /// Check the persisted version and append; the aggregate lock is held
    fn append_batch(
        &self,
        ns: &Namespace,
        aggregate_id: Uuid,
        path: &Path,
        batch: &[u8],
        original_version: u64,
    ) -> EventStoreResult<()> {
        let could_not_save = |source: io::Error| EventStoreError::CouldNotSave {
            namespace: ns.clone(),
            aggregate_id,
            source,
        };

        self.base
            .create_dir_all(&self.base.namespace_folder(ns))
            .map_err(could_not_save)?;

        let persisted = self.version(ns, aggregate_id)?;
        if persisted != original_version {
            warn!(
                namespace = %ns,
                %aggregate_id,
                expected = original_version,
                actual = persisted,
                "version conflict on save"
            );
            return Err(EventStoreError::VersionConflict {
                namespace: ns.clone(),
                aggregate_id,
                expected: original_version,
                actual: persisted,
            });
        }

        let mut file = self.base.open_append(path).map_err(could_not_save)?;
        append_or_truncate(&mut file, |file| {
            file.write_all(batch)?;
            file.flush()?;
            file.sync_all()
        })
        .map_err(could_not_save)
    }

    /// Load an aggregate's full history, oldest event first
    ///
    /// An aggregate without a log has no history yet: the result is empty,
    /// not an error. The log is read backwards; its last line tells the
    /// highest version, so the result is allocated once and every event is
    /// placed at `version - 1`.
    pub fn load(&self, ns: &Namespace, aggregate_id: Uuid) -> EventStoreResult<Vec<Event<D>>> {
        let could_not_load = |source: io::Error| EventStoreError::CouldNotLoad {
            namespace: ns.clone(),
            aggregate_id,
            source,
        };
        let inconsistent = |detail: String| EventStoreError::InconsistentLog {
            namespace: ns.clone(),
            aggregate_id,
            detail,
        };

        let Some(mut scanner) = self.open_scanner(ns, aggregate_id)? else {
            return Ok(Vec::new());
        };

        let mut slots: Vec<Option<Event<D>>> = Vec::new();
        let mut remaining = 0usize;

        while scanner.scan() {
            let mut raw = RawEvent::from_json_line(scanner.bytes()).map_err(|source| {
                EventStoreError::CouldNotUnmarshal {
                    namespace: ns.clone(),
                    aggregate_id,
                    offset: scanner.offset(),
                    source,
                }
            })?;

            if slots.is_empty() {
                // Every event takes at least one byte, so a larger version is garbage
                if raw.version > scanner.source_len() {
                    return Err(inconsistent(format!("version {} out of range", raw.version)));
                }
                let highest = raw.version as usize;
                slots.resize_with(highest, || None);
                remaining = highest;
            }

            let version = raw.version;
            if version == 0 || version > slots.len() as u64 {
                return Err(inconsistent(format!(
                    "version {} outside 1..={}",
                    version,
                    slots.len()
                )));
            }
            if raw.aggregate_id != aggregate_id {
                return Err(inconsistent(format!(
                    "version {} belongs to aggregate {}",
                    version, raw.aggregate_id
                )));
            }

            let slot = &mut slots[(version - 1) as usize];
            if slot.is_some() {
                return Err(inconsistent(format!("duplicate version {}", version)));
            }

            let data = self
                .factory
                .decode(&raw.event_type, std::mem::take(&mut raw.data))
                .map_err(|source| EventStoreError::CouldNotDecode {
                    namespace: ns.clone(),
                    aggregate_id,
                    source,
                })?;
            *slot = Some(raw.with_data(data));
            remaining -= 1;
        }

        if let Some(e) = scanner.take_err() {
            return Err(could_not_load(e));
        }

        if remaining > 0 {
            let missing = slots.iter().position(Option::is_none).map_or(0, |i| i + 1);
            return Err(inconsistent(format!("missing version {}", missing)));
        }

        debug!(namespace = %ns, %aggregate_id, events = slots.len(), "loaded aggregate");
        Ok(slots.into_iter().flatten().collect())
    }

    /// Current persisted version of an aggregate (0 without a log)
    ///
    /// Only the last line of the log is read.
    pub fn version(&self, ns: &Namespace, aggregate_id: Uuid) -> EventStoreResult<u64> {
        let Some(mut scanner) = self.open_scanner(ns, aggregate_id)? else {
            return Ok(0);
        };

        if !scanner.scan() {
            return match scanner.take_err() {
                Some(source) => Err(EventStoreError::CouldNotLoad {
                    namespace: ns.clone(),
                    aggregate_id,
                    source,
                }),
                None => Ok(0),
            };
        }

        let probe: VersionProbe = serde_json::from_slice(scanner.bytes()).map_err(|source| {
            EventStoreError::CouldNotUnmarshal {
                namespace: ns.clone(),
                aggregate_id,
                offset: scanner.offset(),
                source,
            }
        })?;
        Ok(probe.version)
    }

    /// Delete every event log of a namespace
    pub fn clear(&self, ns: &Namespace) -> EventStoreResult<()> {
        let folder = self.base.namespace_folder(ns);
        self.base
            .remove_dir_all(&folder)
            .map_err(|source| EventStoreError::CouldNotClear {
                namespace: ns.clone(),
                source,
            })?;

        debug!(namespace = %ns, "cleared namespace");
        Ok(())
    }

    fn open_scanner(
        &self,
        ns: &Namespace,
        aggregate_id: Uuid,
    ) -> EventStoreResult<Option<ReverseScanner<File>>> {
        let path = self.base.aggregate_file(ns, aggregate_id);
        let opened = File::open(&path).and_then(ReverseScanner::from_file);
        match opened {
            Ok(scanner) => Ok(Some(scanner)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(EventStoreError::CouldNotLoad {
                namespace: ns.clone(),
                aggregate_id,
                source,
            }),
        }
    }

    fn write_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    /// Run `f` holding the aggregate lock of `path`
    ///
    /// The lock table entry is dropped afterwards unless another save has
    /// picked it up in the meantime, so the table only holds aggregates
    /// with a save in flight.
    fn with_write_lock<R>(&self, path: &Path, f: impl FnOnce() -> R) -> R {
        let lock = self.write_lock(path);
        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.write_locks.lock();
        // Ours plus the table's: nobody else is waiting on it
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
        result
    }
}

/// Run `write` against the end of `file`, cutting off whatever it appended
/// if it fails
///
/// A failed append must not leave half a line behind: the log would end in
/// a fragment that no later `version` or `load` can parse.
fn append_or_truncate<F>(file: &mut File, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let original_len = file.metadata()?.len();
    let result = write(file);
    if result.is_err() {
        if let Err(e) = file.set_len(original_len) {
            warn!(error = %e, len = original_len, "could not truncate log after failed append");
        }
    }
    result
}

impl<D> std::fmt::Debug for EventStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("base", &self.base)
            .field("factory", &self.factory)
            .finish()
    }
}
