//! Runtime error types.

use herald_core::{CodecError, DispatchError, HandlerError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A dispatched message aborted the call.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// An envelope could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A handler failed outside of a bus call.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// An envelope could not be handed to the worker queue.
    #[error("Queue error: {0}")]
    Queue(String),

    /// The global subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
