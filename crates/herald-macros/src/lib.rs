//! Procedural macros for the Herald message bus.
//!
//! This crate provides:
//!
//! - `#[derive(Event)]` - Implements `herald_core::Event` and `herald_core::Named`
//! - `#[derive(Command)]` - Implements `herald_core::Command` and `herald_core::Named`
//!
//! # Event Derive Macro
//!
//! Events must also derive `Serialize` (the generated `to_payload` serializes
//! the record for the worker boundary) and `Debug`:
//!
//! ```rust,ignore
//! use herald::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Event)]
//! pub struct FolderCreated {
//!     pub id: String,
//!     pub user_id: String,
//! }
//!
//! #[derive(Debug, Clone, Command)]
//! #[command(name = "folders.rename")]
//! pub struct RenameFolder {
//!     pub id: String,
//!     pub title: String,
//! }
//! ```

mod message;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

use message::MessageKind;

/// Derives `Event` and `Named` for a struct or enum.
///
/// # Attributes
///
/// - `#[event(name = "...")]` - Override the event name (default: the type name)
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_message(&input, MessageKind::Event) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `Command` and `Named` for a struct or enum.
///
/// # Attributes
///
/// - `#[command(name = "...")]` - Override the command name (default: the type name)
#[proc_macro_derive(Command, attributes(command))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_message(&input, MessageKind::Command) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
