//! Default handler tables and bus construction.
//!
//! The audit logger is registered for the diagnostic, session and folder
//! events; the notifiers are registered for the password events. Other
//! catalogue events are published but have no default handlers.

use std::sync::Arc;

use herald_core::{
    AsyncBoxedHandler, AsyncBus, AsyncErasedHandler, BoxedHandler, ErasedHandler, Event,
    EventCodec, HandlerRegistry, Named, SyncBus,
};
use tracing::debug;

use crate::config::HeraldConfig;
use crate::event_log::{
    AsyncEventLogStore, AsyncEventsLogger, EVENT_LOG_KEY, EventLogStore, EventsLogger,
};
use crate::events::{
    AuthSessionClosed, FolderCreated, FolderRemoved, FolderUpdated, NoteCreated,
    NoteRelationCreated, NoteRelationRemoved, NoteRemoved, NoteUpdated,
    PasswordChangeRequestCreated, TestEvent, UserCreated, UserPasswordChanged,
};
use crate::notify::{
    LogMailer, MAILER_KEY, Mailer, PasswordChangeRequestNotifier, UserPasswordChangedNotifier,
};

fn audit<E: Event + Named>(config: &HeraldConfig) -> BoxedHandler<E> {
    BoxedHandler::stateful(EventsLogger::new(config.bus.redacted_fields.iter().cloned()))
        .named("EventsLogger")
}

fn async_audit<E: Event + Named>(config: &HeraldConfig) -> AsyncBoxedHandler<E> {
    AsyncBoxedHandler::stateful(AsyncEventsLogger::new(
        config.bus.redacted_fields.iter().cloned(),
    ))
    .named("AsyncEventsLogger")
}

/// Builds the default event handler table for a sync bus.
pub fn default_event_handlers(config: &HeraldConfig) -> HandlerRegistry<ErasedHandler> {
    let mut registry = HandlerRegistry::<ErasedHandler>::new();

    if config.bus.audit_log {
        registry.set_event_handlers(vec![audit::<TestEvent>(config)]);
        registry.set_event_handlers(vec![audit::<AuthSessionClosed>(config)]);
        registry.set_event_handlers(vec![audit::<FolderCreated>(config)]);
        registry.set_event_handlers(vec![audit::<FolderUpdated>(config)]);
        registry.set_event_handlers(vec![audit::<FolderRemoved>(config)]);
    }

    registry.set_event_handlers(vec![BoxedHandler::<PasswordChangeRequestCreated>::stateful(
        PasswordChangeRequestNotifier::new(config.notifications.clone()),
    )]);
    registry.set_event_handlers(vec![BoxedHandler::<UserPasswordChanged>::stateful(
        UserPasswordChangedNotifier::new(config.notifications.clone()),
    )]);

    registry
}

/// Builds the default event handler table for an async bus.
///
/// Only the audit logger has an async form, so the table is empty when the
/// audit log is disabled.
pub fn default_async_event_handlers(config: &HeraldConfig) -> HandlerRegistry<AsyncErasedHandler> {
    let mut registry = HandlerRegistry::<AsyncErasedHandler>::new();

    if config.bus.audit_log {
        registry.set_event_handlers(vec![async_audit::<TestEvent>(config)]);
        registry.set_event_handlers(vec![async_audit::<AuthSessionClosed>(config)]);
        registry.set_event_handlers(vec![async_audit::<FolderCreated>(config)]);
        registry.set_event_handlers(vec![async_audit::<FolderUpdated>(config)]);
        registry.set_event_handlers(vec![async_audit::<FolderRemoved>(config)]);
    }

    registry
}

/// Builds a sync bus with the default handlers, backed by `store`.
///
/// The context is seeded with the store under [`EVENT_LOG_KEY`] and a
/// [`LogMailer`] under [`MAILER_KEY`]; replace the latter to send real mail.
pub fn make_message_bus(config: &HeraldConfig, store: Arc<dyn EventLogStore>) -> SyncBus {
    let bus = SyncBus::from_registry(default_event_handlers(config));
    bus.context().insert(EVENT_LOG_KEY, store);
    bus.context()
        .insert::<dyn Mailer>(MAILER_KEY, Arc::new(LogMailer));

    debug!(events = ?bus.registry().event_names(), "Message bus ready");
    bus
}

/// Builds an async bus with the default handlers, backed by `store`.
pub fn make_async_message_bus(
    config: &HeraldConfig,
    store: Arc<dyn AsyncEventLogStore>,
) -> AsyncBus {
    let bus = AsyncBus::from_registry(default_async_event_handlers(config));
    bus.context().insert(EVENT_LOG_KEY, store);

    debug!(events = ?bus.registry().event_names(), "Async message bus ready");
    bus
}

/// A codec that can decode every event in the catalogue.
pub fn default_codec() -> EventCodec {
    EventCodec::new()
        .with::<TestEvent>()
        .with::<UserCreated>()
        .with::<FolderCreated>()
        .with::<FolderUpdated>()
        .with::<FolderRemoved>()
        .with::<NoteCreated>()
        .with::<NoteUpdated>()
        .with::<NoteRemoved>()
        .with::<NoteRelationCreated>()
        .with::<NoteRelationRemoved>()
        .with::<PasswordChangeRequestCreated>()
        .with::<UserPasswordChanged>()
        .with::<AuthSessionClosed>()
}
