//! Herald Runtime - Application layer around the Herald message bus.
//!
//! This crate provides:
//! - Configuration loading and validation (`HeraldConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`, `init_from_config`)
//! - The domain event catalogue (`events`)
//! - The audit log handler and its stores (`EventsLogger`, `EventLogStore`)
//! - Account notification handlers (`PasswordChangeRequestNotifier`, `Mailer`)
//! - Default handler tables and bus construction (`make_message_bus`)
//! - Background re-entry of events (`EventWorker`, `EventQueue`)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use herald_core::{Message, MessageBus};
//! use herald_runtime::{config::load_config, events::FolderCreated, logging, make_message_bus};
//! use herald_runtime::event_log::InMemoryEventLog;
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging)?;
//!
//! let bus = make_message_bus(&config, Arc::new(InMemoryEventLog::new()));
//! bus.handle(Message::event(FolderCreated { id: "f1".into(), user_id: "u1".into() }))?;
//! ```

pub mod config;
pub mod error;
pub mod event_log;
pub mod events;
pub mod factory;
pub mod logging;
pub mod notify;
pub mod worker;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, HeraldConfig, load_config};
pub use error::{RuntimeError, RuntimeResult};
pub use event_log::{
    AsyncEventLogStore, AsyncEventsLogger, EVENT_LOG_KEY, EventLog, EventLogStore, EventsLogger,
    InMemoryEventLog, META_KEY, OBJECT_ID_KEY, USER_ID_KEY,
};
pub use factory::{
    default_async_event_handlers, default_codec, default_event_handlers, make_async_message_bus,
    make_message_bus,
};
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};
pub use notify::{
    Delivery, LogMailer, MAILER_KEY, Mailer, PasswordChangeRequestNotifier,
    UserPasswordChangedNotifier,
};
pub use worker::{EventQueue, EventWorker, InMemoryEventQueue, WorkerReport, publish_event};
