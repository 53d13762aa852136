// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, well-formed encryption keys, and window
//! orderings between the idempotency TTLs.

use crate::diagnostic::ConfigError;
use crate::model::UsherConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &UsherConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate bind_address is not empty and looks like an IP or hostname
    let addr = config.server.bind_address.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.bind_address must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!(
                    "server.bind_address `{addr}` is not a valid IP address or hostname"
                ),
            });
        }
    }

    // public_base_url feeds gateway callback/webhook URLs; it must be absolute
    let base = config.server.public_base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        errors.push(ConfigError::Validation {
            message: format!(
                "server.public_base_url must start with http:// or https://, got `{base}`"
            ),
        });
    } else if base.ends_with('/') {
        errors.push(ConfigError::Validation {
            message: "server.public_base_url must not end with a slash".to_string(),
        });
    }

    for (name, path) in [
        ("server.success_path", &config.server.success_path),
        ("server.pending_path", &config.server.pending_path),
        ("server.failure_path", &config.server.failure_path),
    ] {
        if !path.starts_with('/') {
            errors.push(ConfigError::Validation {
                message: format!("{name} must start with `/`, got `{path}`"),
            });
        }
    }

    if let Some(token) = &config.server.admin_token
        && token.trim().len() < 16
    {
        errors.push(ConfigError::Validation {
            message: "server.admin_token must be at least 16 characters".to_string(),
        });
    }

    // Validate database_path is not empty
    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // Lock and session lifetimes
    if config.registration.lock_ttl_minutes == 0 {
        errors.push(ConfigError::Validation {
            message: "registration.lock_ttl_minutes must be at least 1".to_string(),
        });
    }

    if config.session.ttl_minutes == 0 {
        errors.push(ConfigError::Validation {
            message: "session.ttl_minutes must be at least 1".to_string(),
        });
    }

    if config.session.card_ttl_minutes < config.session.ttl_minutes {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.card_ttl_minutes ({}) must not be shorter than session.ttl_minutes ({})",
                config.session.card_ttl_minutes, config.session.ttl_minutes
            ),
        });
    }

    // The session key must decode to exactly 32 bytes when present
    if let Some(key) = &config.session.encryption_key {
        match hex::decode(key) {
            Ok(bytes) if bytes.len() == 32 => {}
            Ok(bytes) => errors.push(ConfigError::Validation {
                message: format!(
                    "session.encryption_key must decode to 32 bytes, got {}",
                    bytes.len()
                ),
            }),
            Err(_) => errors.push(ConfigError::Validation {
                message: "session.encryption_key is not valid hex".to_string(),
            }),
        }
    }

    if config.gateway.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "gateway.timeout_secs must be at least 1".to_string(),
        });
    }

    if config.gateway.currency.len() != 3
        || !config.gateway.currency.chars().all(|c| c.is_ascii_alphabetic())
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "gateway.currency must be a 3-letter ISO code, got `{}`",
                config.gateway.currency
            ),
        });
    }

    if let Some(url) = &config.gateway.base_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ConfigError::Validation {
            message: format!("gateway.base_url must start with http:// or https://, got `{url}`"),
        });
    }

    // Idempotency windows: both non-zero, order window no wider than payload
    if config.webhook.payload_window_minutes == 0 {
        errors.push(ConfigError::Validation {
            message: "webhook.payload_window_minutes must be at least 1".to_string(),
        });
    }

    if config.webhook.order_window_minutes == 0 {
        errors.push(ConfigError::Validation {
            message: "webhook.order_window_minutes must be at least 1".to_string(),
        });
    }

    if config.webhook.order_window_minutes > config.webhook.payload_window_minutes {
        errors.push(ConfigError::Validation {
            message: format!(
                "webhook.order_window_minutes ({}) must not exceed webhook.payload_window_minutes ({})",
                config.webhook.order_window_minutes, config.webhook.payload_window_minutes
            ),
        });
    }

    if config.mailer.enabled && config.mailer.smtp_host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "mailer.smtp_host must not be empty when mailer.enabled".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks a config is complete enough to serve traffic, beyond static validity.
///
/// `config check` reports these as warnings; `serve` refuses to start on them.
pub fn serve_requirements(config: &UsherConfig) -> Vec<String> {
    let mut missing = Vec::new();
    if config.session.encryption_key.is_none() {
        missing.push("session.encryption_key is required to serve".to_string());
    }
    if config.gateway.api_key.is_none() {
        missing.push("gateway.api_key is required to serve".to_string());
    }
    if config.gateway.webhook_secret.is_none() {
        missing.push("gateway.webhook_secret is required to serve".to_string());
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = UsherConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = UsherConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn short_encryption_key_fails_validation() {
        let mut config = UsherConfig::default();
        config.session.encryption_key = Some("deadbeef".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("32 bytes"))));
    }

    #[test]
    fn non_hex_encryption_key_fails_validation() {
        let mut config = UsherConfig::default();
        config.session.encryption_key = Some("zz".repeat(32));
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("not valid hex"))));
    }

    #[test]
    fn full_length_encryption_key_passes() {
        let mut config = UsherConfig::default();
        config.session.encryption_key = Some("ab".repeat(32));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn order_window_wider_than_payload_window_fails() {
        let mut config = UsherConfig::default();
        config.webhook.order_window_minutes = 20;
        config.webhook.payload_window_minutes = 10;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("order_window_minutes"))));
    }

    #[test]
    fn card_ttl_shorter_than_session_ttl_fails() {
        let mut config = UsherConfig::default();
        config.session.ttl_minutes = 30;
        config.session.card_ttl_minutes = 10;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("card_ttl_minutes"))));
    }

    #[test]
    fn trailing_slash_base_url_fails() {
        let mut config = UsherConfig::default();
        config.server.public_base_url = "https://tickets.example.com/".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("slash"))));
    }

    #[test]
    fn bad_currency_code_fails() {
        let mut config = UsherConfig::default();
        config.gateway.currency = "EURO".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("ISO code"))));
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = UsherConfig::default();
        config.server.bind_address = "0.0.0.0".to_string();
        config.server.public_base_url = "https://tickets.example.com".to_string();
        config.storage.database_path = "/tmp/test.db".to_string();
        config.session.encryption_key = Some("0f".repeat(32));
        config.gateway.api_key = Some("gk_test_123".to_string());
        config.gateway.webhook_secret = Some("whsec_123".to_string());
        assert!(validate_config(&config).is_ok());
        assert!(serve_requirements(&config).is_empty());
    }

    #[test]
    fn serve_requirements_reports_missing_secrets() {
        let config = UsherConfig::default();
        let missing = serve_requirements(&config);
        assert_eq!(missing.len(), 3);
        assert!(missing.iter().any(|m| m.contains("encryption_key")));
        assert!(missing.iter().any(|m| m.contains("api_key")));
        assert!(missing.iter().any(|m| m.contains("webhook_secret")));
    }
}
