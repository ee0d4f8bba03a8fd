//! Unified error types for the Herald core.
//!
//! Handler failures ([`HandlerError`]) are contained by the dispatcher when
//! they come from event handlers and surfaced as [`DispatchError`] when they
//! come from a command handler.

use thiserror::Error;

// =============================================================================
// Handler Errors
// =============================================================================

/// Errors raised by handler logic.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not complete its work.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler refused the message on business grounds.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The erased handler was invoked with a message of the wrong type.
    #[error("message type mismatch: expected '{expected}', got '{got}'")]
    MessageTypeMismatch {
        /// The type the handler was registered for.
        expected: &'static str,
        /// The name of the message actually delivered.
        got: &'static str,
    },

    /// A required context entry was missing or of the wrong type.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Serializing or decoding a payload failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Any other error produced by handler logic.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Creates a generic failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Creates a business rejection.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Wraps an arbitrary error.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors that abort a call to `handle`.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A command was dispatched with no handler registered for its type.
    #[error("no handler registered for command '{command}'")]
    CommandHandlerMissing {
        /// The command name.
        command: &'static str,
    },

    /// The command handler failed.
    #[error("command '{command}' failed in handler '{handler}': {source}")]
    CommandFailed {
        /// The command name.
        command: &'static str,
        /// The handler identity.
        handler: String,
        #[source]
        source: HandlerError,
    },

    /// A payload named a message type nobody knows about.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A payload could not be turned into a message.
    #[error(transparent)]
    Codec(CodecError),
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnknownEvent(name) => Self::UnknownMessageType(name),
            other => Self::Codec(other),
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Lookup failures in the handler registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no handlers registered for event '{event}'")]
    EventHandlersMissing { event: &'static str },

    #[error("no handler registered for command '{command}'")]
    CommandHandlerMissing { command: &'static str },
}

// =============================================================================
// Context Errors
// =============================================================================

/// Errors from typed access to the shared context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No entry under the key.
    #[error("context entry '{0}' not found")]
    Missing(String),

    /// The entry exists but holds a different type.
    #[error("context entry '{key}' holds '{actual}', not '{expected}'")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors crossing the serialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// No decoder registered under the event name.
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("failed to serialize event '{event}': {reason}")]
    Serialize { event: String, reason: String },

    #[error("failed to deserialize event '{event}': {reason}")]
    Deserialize { event: String, reason: String },
}

impl CodecError {
    pub(crate) fn serialize(event: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Serialize {
            event: event.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn deserialize(event: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Deserialize {
            event: event.into(),
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for handler logic.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Result type for bus dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_maps_to_unknown_message_type() {
        let err: DispatchError = CodecError::UnknownEvent("Ghost".into()).into();
        assert!(matches!(err, DispatchError::UnknownMessageType(ref name) if name == "Ghost"));
    }

    #[test]
    fn command_failure_keeps_source() {
        let err = DispatchError::CommandFailed {
            command: "RenameFolder",
            handler: "rename".into(),
            source: HandlerError::rejected("title taken"),
        };
        assert_eq!(
            err.to_string(),
            "command 'RenameFolder' failed in handler 'rename': rejected: title taken"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn context_error_converts_into_handler_error() {
        let err: HandlerError = ContextError::Missing("event_log".into()).into();
        assert_eq!(err.to_string(), "context entry 'event_log' not found");
    }
}
