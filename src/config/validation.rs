//! Configuration validation
//!
//! Checked once at startup, before any connection attempt:
//! - The account secret is present
//! - Endpoint URLs use the expected schemes
//! - Queue and watchdog settings are usable
//! - Filter regexes compile and every pattern suffix trips the completion guard

use super::bot_config::BotConfig;
use super::filter_config::FilterConfig;
use crate::HaikuBotError;
use regex::Regex;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref section) = self.section {
            write!(f, "[{}] {}: {}", section, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate the service configuration
pub fn validate_bot_config(config: &BotConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.password.trim().is_empty() {
        errors.push(ValidationError::new(
            "HAIKUBOT_PASSWORD",
            "HAIKUBOT_PASSWORD is required",
        ));
    }

    if config.handle.trim().is_empty() {
        errors.push(ValidationError::new("HAIKUBOT_HANDLE", "Handle cannot be empty"));
    }

    if !is_ws_url(&config.jetstream_url) {
        errors.push(ValidationError::new(
            "HAIKUBOT_JETSTREAM",
            format!("Invalid websocket URL: {}", config.jetstream_url),
        ));
    }

    if !is_http_url(&config.host) {
        errors.push(ValidationError::new(
            "HAIKUBOT_HOST",
            format!("Invalid host URL: {}", config.host),
        ));
    }

    if let Some(ref url) = config.heartbeat_url {
        if !is_http_url(url) {
            errors.push(ValidationError::new(
                "HEARTBEAT_URL",
                format!("Invalid heartbeat URL: {}", url),
            ));
        }
    }

    if config.queue_capacity == 0 {
        errors.push(ValidationError::new(
            "queue_capacity",
            "Queue capacity must be greater than 0",
        ));
    }

    if config.max_idle_ticks == 0 || config.idle_timeout.is_zero() {
        errors.push(ValidationError::new(
            "idle_timeout",
            "Idle timeout and idle tick limit must be greater than 0",
        ));
    }

    if config.heartbeat_interval.is_zero() {
        errors.push(ValidationError::new(
            "heartbeat_interval",
            "Heartbeat interval must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate filter rules
pub fn validate_filter_config(config: &FilterConfig) -> ValidationResult {
    let mut errors = Vec::new();

    for (field, pattern) in [
        ("script_pattern", &config.script_pattern),
        ("link_pattern", &config.link_pattern),
        ("tag_pattern", &config.tag_pattern),
    ] {
        if let Err(e) = Regex::new(pattern) {
            errors.push(
                ValidationError::new(field, format!("Invalid regex: {}", e)).with_section("filter"),
            );
        }
    }

    if config.completion_marker.trim().is_empty() {
        errors.push(
            ValidationError::new("completion_marker", "Completion marker cannot be empty")
                .with_section("filter"),
        );
    }

    if config.patterns.is_empty() {
        errors.push(
            ValidationError::new("patterns", "At least one pattern must be defined")
                .with_section("filter"),
        );
    }

    for pattern in &config.patterns {
        let section = format!("pattern {}", pattern.name);
        if pattern.segments.is_empty() || pattern.segments.contains(&0) {
            errors.push(
                ValidationError::new("segments", "Segments must be non-empty and positive")
                    .with_section(&section),
            );
        }
        // Our own posts end with the suffix; without the marker we would answer ourselves
        if !pattern.suffix.contains(&config.completion_marker) {
            errors.push(
                ValidationError::new(
                    "suffix",
                    format!(
                        "Suffix '{}' must contain the completion marker '{}'",
                        pattern.suffix, config.completion_marker
                    ),
                )
                .with_section(&section),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_ws_url(url: &str) -> bool {
    url.starts_with("wss://") || url.starts_with("ws://")
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// Validate both configurations and return a Result
pub fn validate_config_result(bot: &BotConfig, filter: &FilterConfig) -> crate::Result<()> {
    let mut errors = validate_bot_config(bot).err().unwrap_or_default();
    errors.extend(validate_filter_config(filter).err().unwrap_or_default());

    if errors.is_empty() {
        return Ok(());
    }

    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    Err(HaikuBotError::Config(format!(
        "Configuration validation failed:\n  - {}",
        messages.join("\n  - ")
    )))
}
