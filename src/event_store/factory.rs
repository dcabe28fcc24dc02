//! Event data factory: `event_type` → payload decoder
//!
//! The payload of a stored event is plain JSON; which Rust type it becomes
//! depends on the `event_type` tag next to it. The factory is an explicit
//! lookup table handed to the [`EventStore`](super::EventStore) at
//! construction time, so every store carries exactly the event types it
//! knows about.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::error::ErrorKind;

type DecodeFn<D> = Box<dyn Fn(Value) -> serde_json::Result<D> + Send + Sync>;

/// Errors raised while decoding an event payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event type '{0}' is not registered")]
    UnknownEventType(String),
    #[error("could not decode '{event_type}' payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::UnknownEventType(_) => ErrorKind::Configuration,
            DecodeError::Payload { .. } => ErrorKind::Serialization,
        }
    }
}

/// Lookup table of payload decoders for the sum type `D`
///
/// ```
/// use es_filestore::EventDataFactory;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Deserialize, Serialize)]
/// struct Opened { owner: String }
///
/// #[derive(Debug, Deserialize, Serialize)]
/// struct Deposited { amount: u64 }
///
/// #[derive(Debug, Serialize)]
/// #[serde(untagged)]
/// enum AccountEvent {
///     Opened(Opened),
///     Deposited(Deposited),
/// }
///
/// let factory = EventDataFactory::new()
///     .register("account_opened", AccountEvent::Opened)
///     .register("money_deposited", AccountEvent::Deposited);
///
/// let data = factory
///     .decode("money_deposited", serde_json::json!({"amount": 5}))
///     .unwrap();
/// assert!(matches!(data, AccountEvent::Deposited(Deposited { amount: 5 })));
/// ```
pub struct EventDataFactory<D> {
    decoders: HashMap<String, DecodeFn<D>>,
    fallback: Option<DecodeFn<D>>,
}

impl<D: 'static> EventDataFactory<D> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            fallback: None,
        }
    }

    /// Register the payload type `T` for `event_type`
    ///
    /// `wrap` lifts the decoded payload into the sum type, typically an
    /// enum variant constructor. Registering the same type twice replaces
    /// the earlier decoder.
    pub fn register<T, F>(mut self, event_type: impl Into<String>, wrap: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> D + Send + Sync + 'static,
    {
        self.decoders.insert(
            event_type.into(),
            Box::new(move |value| serde_json::from_value::<T>(value).map(&wrap)),
        );
        self
    }

    /// Decoder used for event types without a registered decoder
    pub fn with_fallback<F>(mut self, decode: F) -> Self
    where
        F: Fn(Value) -> serde_json::Result<D> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(decode));
        self
    }

    /// Turn a raw payload into `D` using the decoder for `event_type`
    pub fn decode(&self, event_type: &str, data: Value) -> Result<D, DecodeError> {
        let decoder = self
            .decoders
            .get(event_type)
            .or(self.fallback.as_ref())
            .ok_or_else(|| DecodeError::UnknownEventType(event_type.to_string()))?;

        decoder(data).map_err(|source| DecodeError::Payload {
            event_type: event_type.to_string(),
            source,
        })
    }

    /// Whether `event_type` can be decoded
    pub fn contains(&self, event_type: &str) -> bool {
        self.fallback.is_some() || self.decoders.contains_key(event_type)
    }

    /// Explicitly registered event types, sorted
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl EventDataFactory<Value> {
    /// A factory that accepts every event type and keeps the raw JSON
    pub fn dynamic() -> Self {
        Self::new().with_fallback(Ok)
    }
}

impl<D: 'static> Default for EventDataFactory<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for EventDataFactory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.decoders.keys().collect();
        types.sort_unstable();
        f.debug_struct("EventDataFactory")
            .field("event_types", &types)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
