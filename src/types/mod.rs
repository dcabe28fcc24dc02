//! Data types shared by the event store and the document repository

mod entity;
mod event;
mod namespace;

pub use entity::Entity;
pub(crate) use event::VersionProbe;
pub use event::{Event, Metadata, RawEvent};
pub use namespace::{Namespace, NamespaceError, DEFAULT_NAMESPACE};
