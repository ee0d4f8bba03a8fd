//! Domain events published by the application services.
//!
//! Each event is a plain serializable struct; the `Event` derive names it after
//! the type, which is also the name used in [`EventEnvelope`](herald_core::EventEnvelope)s.

use herald_core::Event;
use serde::{Deserialize, Serialize};

/// Diagnostic event used to check that the bus and the audit log are wired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct TestEvent {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct UserCreated {
    pub id: String,
}

// =============================================================================
// Folders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct FolderCreated {
    pub id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct FolderUpdated {
    pub id: String,
    /// Names of the fields changed by the update.
    pub updated_fields: Vec<String>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct FolderRemoved {
    pub id: String,
    pub user_id: String,
}

// =============================================================================
// Notes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct NoteCreated {
    pub id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct NoteUpdated {
    pub id: String,
    pub updated_fields: Vec<String>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct NoteRemoved {
    pub id: String,
    pub user_id: String,
}

/// A note was attached under a parent note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct NoteRelationCreated {
    /// Parent note id.
    pub id: String,
    pub child_note_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct NoteRelationRemoved {
    pub id: String,
    pub child_note_id: String,
    pub user_id: String,
}

// =============================================================================
// Accounts
// =============================================================================

/// A password reset was requested. `token` is secret and must never be logged
/// unredacted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct PasswordChangeRequestCreated {
    pub user_id: String,
    pub token_id: String,
    pub token: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct UserPasswordChanged {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub struct AuthSessionClosed {
    pub id: String,
}
