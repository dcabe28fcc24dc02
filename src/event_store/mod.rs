//! Event Store Module for Event Sourcing
//!
//! This module provides the write side of the store:
//! - `EventStore`: per-aggregate append-only logs with optimistic concurrency
//! - `EventDataFactory`: injected `event_type` → payload decoder table
//!
//! # Architecture
//!
//! ```text
//! Write Path (save):
//! ┌────────────┐    ┌──────────────────┐    ┌──────────────────┐    ┌─────────────┐
//! │ validate   │───►│ serialize batch  │───►│ last line of log │───►│ append +    │
//! │ versions   │    │ into one buffer  │    │ == original ver? │    │ sync_all    │
//! └────────────┘    └──────────────────┘    └──────────────────┘    └─────────────┘
//!
//! Read Path (load):
//! ┌──────────────────┐    ┌──────────────────────┐    ┌─────────────────────┐
//! │ last line gives  │───►│ scan backwards, put  │───►│ decode data through │
//! │ highest version  │    │ each at version - 1  │    │ EventDataFactory    │
//! └──────────────────┘    └──────────────────────┘    └─────────────────────┘
//! ```

mod factory;
mod store;

pub use factory::{DecodeError, EventDataFactory};
pub use store::{EventStore, EventStoreError, EventStoreResult};
