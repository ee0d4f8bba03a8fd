//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Message bus settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Notification settings.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level.
    pub level: LogLevel,

    pub format: LogFormat,

    pub output: LogOutput,

    /// Per-module level overrides, e.g. `herald_core = "debug"`.
    pub filters: HashMap<String, LogLevel>,

    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    pub file_location: bool,

    /// Log file path, used when `output = "file"`.
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            filters: HashMap::new(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
        }
    }
}

// =============================================================================
// Bus
// =============================================================================

/// Message bus configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Event fields masked before an event is written to the audit log.
    #[serde(default = "default_redacted_fields")]
    pub redacted_fields: Vec<String>,

    /// Register the audit logger for the default event set.
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redacted_fields: default_redacted_fields(),
            audit_log: true,
        }
    }
}

fn default_redacted_fields() -> Vec<String> {
    vec!["password".to_string(), "token".to_string()]
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Notifications
// =============================================================================

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Send mail through the configured mailer. When off, notices are only logged.
    #[serde(default)]
    pub email_enabled: bool,

    /// Protocol used in links sent to users (`http` or `https`).
    #[serde(default = "default_web_protocol")]
    pub web_protocol: String,

    /// Host used in links sent to users.
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            email_enabled: false,
            web_protocol: default_web_protocol(),
            base_domain: default_base_domain(),
        }
    }
}

impl NotificationConfig {
    /// Builds an absolute link to `path` on the configured site.
    pub fn link(&self, path: &str) -> String {
        format!(
            "{}://{}/{}",
            self.web_protocol,
            self.base_domain,
            path.trim_start_matches('/')
        )
    }
}

fn default_web_protocol() -> String {
    "https".to_string()
}

fn default_base_domain() -> String {
    "localhost".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mask_password_and_token() {
        let config = HeraldConfig::default();
        assert_eq!(config.bus.redacted_fields, vec!["password", "token"]);
        assert!(config.bus.audit_log);
        assert!(!config.notifications.email_enabled);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config: HeraldConfig = serde_json::from_value(serde_json::json!({
            "bus": { "audit_log": false },
            "logging": { "level": "debug", "filters": { "herald_core": "trace" } }
        }))
        .unwrap();

        assert!(!config.bus.audit_log);
        assert_eq!(config.bus.redacted_fields, vec!["password", "token"]);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.filters["herald_core"], LogLevel::Trace);
        assert_eq!(config.notifications.web_protocol, "https");
    }

    #[test]
    fn link_joins_protocol_domain_and_path() {
        let notifications = NotificationConfig {
            email_enabled: false,
            web_protocol: "http".into(),
            base_domain: "notes.local".into(),
        };
        assert_eq!(
            notifications.link("/change-password?token=abc"),
            "http://notes.local/change-password?token=abc"
        );
    }
}
