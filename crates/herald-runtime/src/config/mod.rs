//! Configuration module for the Herald runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for logging, bus behavior, and notification settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BusConfig, HeraldConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, NotificationConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
