//! # Herald
//!
//! An in-process message bus that carries domain events and commands from
//! application services to their handlers.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────┐  handle   ┌───────────┐  events: every handler   ┌──────────────┐
//! │ Service  │──────────▶│    Bus    │─────────────────────────▶│   Handlers   │
//! └──────────┘           │ FIFO queue│◀─────────────────────────│ (may emit)   │
//!                        └───────────┘  emitted messages        └──────────────┘
//! ```
//!
//! - **Events** fan out to every registered handler; a failing handler is
//!   logged and the others still run.
//! - **Commands** go to exactly one handler; a failure aborts the call.
//! - **Stateful handlers** get before/after hooks and can emit follow-up messages.
//! - **Context** shares resources (stores, mailers) between handlers.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! #[derive(Debug, Clone, serde::Serialize, Event)]
//! struct FolderCreated { id: String, user_id: String }
//!
//! let mut bus = SyncBus::new();
//! bus.set_event_handlers(vec![BoxedHandler::from_fn(
//!     |event: &FolderCreated, _ctx: &Context| Ok(event.id.clone()),
//! )]);
//!
//! let results = bus.handle(Message::event(FolderCreated { id: "f1".into(), user_id: "u1".into() }))?;
//! assert_eq!(results[0].output::<String>().map(String::as_str), Some("f1"));
//! ```
//!
//! The derives expand to paths under `::herald_core`, so crates deriving
//! `Event` or `Command` depend on `herald-core` directly.
//!
//! ## Features
//!
//! - `toml-config`: Load TOML configuration files (default)
//! - `yaml-config`: Load YAML configuration files
//! - `json-log`: JSON log output

pub use herald_core as core;
pub use herald_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    // Messages
    pub use herald_core::{Command, Event, Message, Named};

    // Handlers
    pub use herald_core::{
        AsyncBoxedHandler, AsyncHandler, BoxedHandler, Context, Extra, Handler, HandlerError,
        HandlerResult, Outbox,
    };

    // Buses
    pub use herald_core::{
        AsyncBus, AsyncMessageBus, DispatchError, DispatchResult, Dispatched, DryRunBus,
        MessageBus, SyncBus,
    };

    // Runtime
    pub use herald_runtime::{HeraldConfig, load_config, make_async_message_bus, make_message_bus};
}

#[cfg(all(test, feature = "toml-config"))]
mod tests {
    use crate::runtime::config::load_config_from_file;

    #[test]
    fn default_features_read_toml_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.toml");
        std::fs::write(&path, "[bus]\naudit_log = false\n").unwrap();

        let config = load_config_from_file(&path).unwrap();
        assert!(!config.bus.audit_log);
    }
}
