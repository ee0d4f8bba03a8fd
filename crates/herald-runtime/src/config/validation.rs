//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BusConfig, HeraldConfig, LogOutput, LoggingConfig, NotificationConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HeraldConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bus_config(&config.bus)?;
    validate_notification_config(&config.notifications)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    for module in logging.filters.keys() {
        if module.trim().is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: {module:?}"
            )));
        }
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }

    Ok(())
}

/// Validates bus settings.
fn validate_bus_config(bus: &BusConfig) -> ConfigResult<()> {
    if bus.redacted_fields.iter().any(|field| field.trim().is_empty()) {
        return Err(ConfigError::validation(
            "bus.redacted_fields cannot contain empty names",
        ));
    }
    Ok(())
}

/// Validates notification settings.
fn validate_notification_config(notifications: &NotificationConfig) -> ConfigResult<()> {
    let valid_protocols = ["http", "https"];
    if !valid_protocols.contains(&notifications.web_protocol.as_str()) {
        return Err(ConfigError::validation(format!(
            "Invalid web protocol: {}. Valid values are: {:?}",
            notifications.web_protocol, valid_protocols
        )));
    }

    let domain = notifications.base_domain.trim();
    if domain.is_empty() {
        return Err(ConfigError::validation(
            "notifications.base_domain cannot be empty",
        ));
    }
    if domain.contains("://") || domain.contains('/') {
        return Err(ConfigError::validation(
            "notifications.base_domain must be a bare host, without scheme or path",
        ));
    }

    Ok(())
}
