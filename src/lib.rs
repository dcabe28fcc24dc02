//! es-filestore
//!
//! File-backed persistence for CQRS/event-sourcing applications, using plain
//! JSON files on the local filesystem.
//!
//! # Features
//!
//! - **Event Store**: one append-only JSON Lines log per aggregate, with
//!   optimistic concurrency on the aggregate version
//! - **Fast Versions**: the current version is read from the last line of the
//!   log with a backward scanner, without parsing the history
//! - **Document Repository**: one JSON array file per namespace holding
//!   typed read-model entities, rewritten atomically on every change
//! - **Namespaces**: every operation is scoped to an explicit namespace
//!   (tenant), mapped to its own folder or file
//!
//! # Modules
//!
//! - `base`: Root folder, permissions and path layout shared by both stores
//! - `event_store`: Event logs and the injected event data factory
//! - `repo`: Read-model document collections
//! - `types`: Events, entities and namespaces
//! - `utils`: Atomic file rewrites and the reverse line scanner
//! - `error`: Error kinds shared by every error type
//!
//! # Example
//!
//! ```no_run
//! use es_filestore::{Event, EventDataFactory, EventStore, Namespace, StoreBase};
//! use serde_json::json;
//! use uuid::Uuid;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EventStore::new(StoreBase::from_env(), EventDataFactory::dynamic());
//!     let ns = Namespace::new("shop")?;
//!     let id = Uuid::new_v4();
//!
//!     let created = Event::new(id, "Order", "OrderCreated", 1, json!({"total": 42}));
//!     store.save(&ns, &[created], 0)?;
//!
//!     assert_eq!(store.version(&ns, id)?, 1);
//!     assert_eq!(store.load(&ns, id)?.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod base;
pub mod error;
pub mod event_store;
pub mod repo;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use base::StoreBase;
pub use error::ErrorKind;
pub use event_store::{DecodeError, EventDataFactory, EventStore, EventStoreError, EventStoreResult};
pub use repo::{DocumentRepo, EntityFactory, RepoError, RepoOp, RepoResult};
pub use types::{Entity, Event, Metadata, Namespace, NamespaceError, RawEvent};
pub use utils::ReverseScanner;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
