//! Core of the Herald message bus.
//!
//! This crate provides the in-process bus that carries domain events and
//! commands between handlers:
//!
//! - [`message`] - The [`Event`] / [`Command`] traits and the [`Message`] enum
//! - [`handler`] / [`async_handler`] - Stateful and plain handlers, sync and async
//! - [`registry`] - Message type to handler routing
//! - [`context`] - Resources shared by all handlers of a bus
//! - [`extra`] - Per-call values handed to every handler of one call
//! - [`bus`] - [`SyncBus`], [`AsyncBus`] and [`DryRunBus`]
//! - [`codec`] - Event envelopes for the worker boundary
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use herald_core::*;
//!
//! #[derive(Debug, Clone, serde::Serialize, Event)]
//! struct FolderCreated { id: String, user_id: String }
//!
//! let mut bus = SyncBus::new();
//! bus.set_event_handlers(vec![
//!     BoxedHandler::from_fn(|event: &FolderCreated, _ctx: &Context| {
//!         tracing::info!(id = %event.id, "folder created");
//!         Ok(())
//!     }),
//! ]);
//! bus.handle(Message::event(FolderCreated { id: "f1".into(), user_id: "u1".into() }))?;
//! ```

extern crate self as herald_core;

pub mod async_handler;
pub mod bus;
pub mod codec;
pub mod context;
pub mod error;
pub mod extra;
pub mod handler;
pub mod message;
pub mod registry;

pub use async_handler::{AsyncBoxedHandler, AsyncErasedHandler, AsyncHandler};
pub use bus::{
    AsyncBus, AsyncBusBuilder, AsyncMessageBus, DispatchStep, Dispatched, DryRunBus, MessageBus,
    Recorded, SyncBus, SyncBusBuilder,
};
pub use codec::{EventCodec, EventEnvelope, REDACTED, decode_as, redact};
pub use context::Context;
pub use extra::Extra;
pub use error::{
    CodecError, ContextError, DispatchError, DispatchResult, HandlerError, HandlerResult,
    RegistryError,
};
pub use handler::{BoxedHandler, ErasedHandler, Handler, HandlerKind, Outbox, Output};
pub use message::{BoxedCommand, BoxedEvent, Command, Event, Message, MessageKind, Named};
pub use registry::HandlerRegistry;

pub use herald_macros::{Command, Event};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
