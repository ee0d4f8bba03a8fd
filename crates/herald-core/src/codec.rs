//! Event serialization for the worker boundary.
//!
//! Events handed to a background worker travel as an [`EventEnvelope`]: the
//! event name plus a JSON payload of its fields. On the worker side an
//! [`EventCodec`] maps the name back to a registered type and rebuilds the
//! event.
//!
//! Decoding ignores payload fields the target type does not declare, and
//! fields the target declares with `#[serde(default)]` may be absent. A
//! payload produced from one event type can therefore be decoded into any
//! compatible type.
//!
//! ```rust,ignore
//! let mut codec = EventCodec::new();
//! codec.register::<FolderCreated>();
//!
//! let envelope = EventEnvelope::from_event(&BoxedEvent::new(created))?;
//! let wire = serde_json::to_string(&envelope)?;
//!
//! let envelope: EventEnvelope = serde_json::from_str(&wire)?;
//! let event = codec.decode(&envelope)?;
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;
use crate::message::{BoxedEvent, Event, Named};

/// Replacement written over redacted fields.
pub const REDACTED: &str = "*******";

/// A serialized event: its name and field payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_name: String,
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(event_name: impl Into<String>, payload: Value) -> Self {
        Self {
            event_name: event_name.into(),
            payload,
        }
    }

    /// Serializes an event into an envelope.
    pub fn from_event(event: &BoxedEvent) -> Result<Self, CodecError> {
        let payload = event
            .to_payload()
            .map_err(|err| CodecError::serialize(event.event_name(), &err))?;
        Ok(Self::new(event.event_name(), payload))
    }
}

type DecodeFn = fn(Value) -> serde_json::Result<BoxedEvent>;

fn decode_into<E>(payload: Value) -> serde_json::Result<BoxedEvent>
where
    E: Event + DeserializeOwned,
{
    serde_json::from_value::<E>(payload).map(BoxedEvent::new)
}

/// Name-to-type table for decoding envelopes.
#[derive(Clone, Default)]
pub struct EventCodec {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl EventCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E` under its [`Named::NAME`].
    pub fn register<E>(&mut self) -> &mut Self
    where
        E: Event + Named + DeserializeOwned,
    {
        self.decoders.insert(E::NAME, decode_into::<E>);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<E>(mut self) -> Self
    where
        E: Event + Named + DeserializeOwned,
    {
        self.register::<E>();
        self
    }

    pub fn contains(&self, event_name: &str) -> bool {
        self.decoders.contains_key(event_name)
    }

    /// Registered event names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.decoders.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Rebuilds the event named by the envelope.
    pub fn decode(&self, envelope: &EventEnvelope) -> Result<BoxedEvent, CodecError> {
        let decode = self
            .decoders
            .get(envelope.event_name.as_str())
            .ok_or_else(|| CodecError::UnknownEvent(envelope.event_name.clone()))?;

        decode(envelope.payload.clone())
            .map_err(|err| CodecError::deserialize(&envelope.event_name, &err))
    }

    /// Serializes an event into an envelope.
    pub fn encode(&self, event: &BoxedEvent) -> Result<EventEnvelope, CodecError> {
        EventEnvelope::from_event(event)
    }
}

impl fmt::Debug for EventCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCodec")
            .field("events", &self.names())
            .finish()
    }
}

/// Decodes a payload into `T`, ignoring fields `T` does not declare.
pub fn decode_as<T: DeserializeOwned>(payload: &Value) -> Result<T, CodecError> {
    T::deserialize(payload).map_err(|err| CodecError::deserialize(std::any::type_name::<T>(), &err))
}

/// Overwrites each listed top-level field present in `payload` with
/// [`REDACTED`]. Returns how many fields were replaced.
pub fn redact<S: AsRef<str>>(payload: &mut Value, fields: &[S]) -> usize {
    let Some(object) = payload.as_object_mut() else {
        return 0;
    };

    let mut replaced = 0;
    for field in fields {
        if let Some(value) = object.get_mut(field.as_ref()) {
            *value = Value::String(REDACTED.to_string());
            replaced += 1;
        }
    }
    replaced
}
