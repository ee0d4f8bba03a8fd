//! Message model for the Herald bus.
//!
//! This module provides the two message kinds the bus understands:
//!
//! - [`Event`] - A fact that happened; fanned out to zero or more handlers
//! - [`Command`] - A request for action; routed to exactly one handler
//!
//! Both are type-erased behind cheap, clonable wrappers ([`BoxedEvent`],
//! [`BoxedCommand`]) and unified by the closed [`Message`] enum, which is what
//! travels through the bus queue.
//!
//! # Derive Macros
//!
//! ```rust,ignore
//! use herald_core::{Command, Event};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Event)]
//! pub struct FolderCreated {
//!     pub id: String,
//!     pub user_id: String,
//! }
//!
//! #[derive(Debug, Clone, Command)]
//! pub struct CreateFolder {
//!     pub title: String,
//! }
//!
//! let message = Message::event(FolderCreated { id: "f1".into(), user_id: "u1".into() });
//! assert_eq!(message.name(), "FolderCreated");
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

// ============================================================================
// Message Traits
// ============================================================================

/// Static name of a message type.
///
/// Kept apart from [`Event`] and [`Command`] so those stay usable as trait
/// objects. Registration and decoding use this name to identify a type
/// without an instance at hand.
pub trait Named {
    /// The stable, human-readable message name.
    const NAME: &'static str;
}

/// An immutable record that something happened.
///
/// Events are routed by their concrete type. Every handler registered for the
/// type receives the event, in registration order. Use `#[derive(Event)]`
/// rather than implementing this by hand.
pub trait Event: Any + fmt::Debug + Send + Sync {
    /// Returns the event name, used in logs and on the worker boundary.
    fn event_name(&self) -> &'static str;

    /// Returns a reference to the event as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Serializes the event into a JSON payload.
    fn to_payload(&self) -> serde_json::Result<Value>;
}

/// An immutable request for an action to be performed.
///
/// Commands are routed by their concrete type to exactly one handler.
pub trait Command: Any + fmt::Debug + Send + Sync {
    /// Returns the command name, used in logs and errors.
    fn command_name(&self) -> &'static str;

    /// Returns a reference to the command as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Boxed Forms
// ============================================================================

/// A type-erased, cheaply clonable event.
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
}

impl BoxedEvent {
    /// Wraps a concrete event.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    /// Returns the underlying trait object.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Returns the event name.
    pub fn event_name(&self) -> &'static str {
        self.inner.event_name()
    }

    /// Returns the `TypeId` of the concrete event type.
    pub fn message_type(&self) -> TypeId {
        Any::type_id(self.inner.as_any())
    }

    /// Attempts to downcast to a concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref::<E>()
    }

    /// Returns `true` if the event is of type `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.inner.as_any().is::<E>()
    }

    /// Serializes the event into a JSON payload.
    pub fn to_payload(&self) -> serde_json::Result<Value> {
        self.inner.to_payload()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("name", &self.event_name())
            .finish_non_exhaustive()
    }
}

/// A type-erased, cheaply clonable command.
#[derive(Clone)]
pub struct BoxedCommand {
    inner: Arc<dyn Command>,
}

impl BoxedCommand {
    /// Wraps a concrete command.
    pub fn new<C: Command>(command: C) -> Self {
        Self {
            inner: Arc::new(command),
        }
    }

    pub fn inner(&self) -> &Arc<dyn Command> {
        &self.inner
    }

    pub fn command_name(&self) -> &'static str {
        self.inner.command_name()
    }

    /// Returns the `TypeId` of the concrete command type.
    pub fn message_type(&self) -> TypeId {
        Any::type_id(self.inner.as_any())
    }

    pub fn downcast_ref<C: Command>(&self) -> Option<&C> {
        self.inner.as_any().downcast_ref::<C>()
    }

    pub fn is<C: Command>(&self) -> bool {
        self.inner.as_any().is::<C>()
    }
}

impl fmt::Debug for BoxedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedCommand")
            .field("name", &self.command_name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Message
// ============================================================================

/// The kind of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Event,
    Command,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::Command => f.write_str("command"),
        }
    }
}

/// Anything the bus can route: an event or a command.
///
/// The set of kinds is closed, so dispatch never meets a message it cannot
/// classify. Payloads that name no known type are rejected earlier, when
/// decoded by [`EventCodec`](crate::codec::EventCodec).
#[derive(Debug, Clone)]
pub enum Message {
    Event(BoxedEvent),
    Command(BoxedCommand),
}

impl Message {
    /// Wraps a concrete event.
    pub fn event<E: Event>(event: E) -> Self {
        Self::Event(BoxedEvent::new(event))
    }

    /// Wraps a concrete command.
    pub fn command<C: Command>(command: C) -> Self {
        Self::Command(BoxedCommand::new(command))
    }

    /// Returns the event or command name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Event(event) => event.event_name(),
            Self::Command(command) => command.command_name(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Event(_) => MessageKind::Event,
            Self::Command(_) => MessageKind::Command,
        }
    }

    /// Returns the `TypeId` of the concrete message type.
    pub fn message_type(&self) -> TypeId {
        match self {
            Self::Event(event) => event.message_type(),
            Self::Command(command) => command.message_type(),
        }
    }

    /// Returns the message as `Any` for downcasting.
    pub fn as_any(&self) -> &dyn Any {
        match self {
            Self::Event(event) => event.inner().as_any(),
            Self::Command(command) => command.inner().as_any(),
        }
    }

    /// Attempts to downcast to a concrete event or command type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn as_event(&self) -> Option<&BoxedEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Command(_) => None,
        }
    }

    pub fn as_command(&self) -> Option<&BoxedCommand> {
        match self {
            Self::Command(command) => Some(command),
            Self::Event(_) => None,
        }
    }
}

impl From<BoxedEvent> for Message {
    fn from(event: BoxedEvent) -> Self {
        Self::Event(event)
    }
}

impl From<BoxedCommand> for Message {
    fn from(command: BoxedCommand) -> Self {
        Self::Command(command)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name())
    }
}
