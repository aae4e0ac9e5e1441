//! Configuration parsing and validation for adwardend
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service timing and the account time zone
//! - Platform connection settings
//! - Shift schedules and defaults for new entity settings
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    let policy = Policy::from_raw(raw);
    tracing::debug!(
        shifts = policy.shifts.len(),
        allow_list = policy.allow_list.len(),
        "Configuration parsed"
    );
    Ok(policy)
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use adwarden_api::EntityLevel;
    use adwarden_util::{DaysOfWeek, EntityId};
    use std::io::Write;
    use std::time::Duration;

    const FULL_CONFIG: &str = r#"
        config_version = 1

        [service]
        tick_interval_seconds = 120
        timezone = "-06:00"

        [platform]
        account_id = "act_1234567890"
        level = "campaign"
        budget_in_minor_units = false

        [defaults]
        shift = "morning"
        spend_limit_percent = 60

        [automation]
        allow_list = ["111", "222"]

        [[shifts]]
        name = "morning"
        days = "weekdays"
        start = "06:00"
        end = "13:00"

        [[shifts]]
        name = "weekend"
        days = [5]
        start = 8
        end = 14
    "#;

    fn minimal(shifts: &str) -> String {
        format!(
            r#"
            config_version = 1

            [platform]
            account_id = "act_1"

            {}
            "#,
            shifts
        )
    }

    fn validation_errors(content: &str) -> Vec<ValidationError> {
        match parse_config(content) {
            Err(ConfigError::ValidationFailed { errors }) => errors,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn parse_full_config() {
        let policy = parse_config(FULL_CONFIG).unwrap();

        assert_eq!(policy.service.tick_interval, Duration::from_secs(120));
        assert_eq!(policy.service.timezone.local_minus_utc(), -6 * 3600);
        assert_eq!(policy.service.reset_grace, Duration::from_secs(300));
        assert_eq!(policy.platform.level, EntityLevel::Campaign);
        assert!(!policy.platform.budget_in_minor_units);
        assert_eq!(policy.platform.base_url, DEFAULT_BASE_URL);
        assert_eq!(policy.defaults.spend_limit_percent, 60.0);

        let morning = &policy.shifts["morning"];
        assert_eq!(morning.days, DaysOfWeek::WEEKDAYS);
        assert_eq!(morning.start_hour, 6.0);
        assert_eq!(morning.end_hour, 13.0);

        let weekend = &policy.shifts["weekend"];
        assert_eq!(weekend.days, DaysOfWeek::new(DaysOfWeek::SATURDAY));
        assert_eq!(weekend.end_hour, 14.0);

        assert_eq!(
            policy.allow_list,
            vec![EntityId::new("111"), EntityId::new("222")]
        );
    }

    #[test]
    fn defaults_apply() {
        let policy = parse_config(&minimal(
            r#"
            [[shifts]]
            name = "morning"
            days = "all"
            start = 6
            end = 13
            "#,
        ))
        .unwrap();

        assert_eq!(
            policy.service.tick_interval,
            Duration::from_secs(DEFAULT_TICK_INTERVAL_SECONDS)
        );
        assert_eq!(policy.service.timezone.local_minus_utc(), 0);
        assert_eq!(policy.defaults.shift, DEFAULT_SHIFT);
        assert_eq!(policy.defaults.spend_limit_percent, DEFAULT_SPEND_LIMIT_PERCENT);
        assert_eq!(policy.platform.level, EntityLevel::Adset);
        assert_eq!(policy.platform.access_token_env, DEFAULT_ACCESS_TOKEN_ENV);
        assert!(policy.platform.budget_in_minor_units);
        assert!(policy.allow_list.is_empty());
    }

    #[test]
    fn reject_wrong_version() {
        let config = FULL_CONFIG.replace("config_version = 1", "config_version = 99");
        let result = parse_config(&config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_unknown_default_shift() {
        let errors = validation_errors(&minimal(
            r#"
            [[shifts]]
            name = "night"
            days = "all"
            start = 18
            end = 24
            "#,
        ));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownDefaultShift(s) if s == "morning")));
    }

    #[test]
    fn reject_inverted_window_and_duplicates() {
        let errors = validation_errors(&minimal(
            r#"
            [[shifts]]
            name = "morning"
            days = "weekdays"
            start = "13:00"
            end = "06:00"

            [[shifts]]
            name = "morning"
            days = "weekends"
            start = 6
            end = 13
            "#,
        ));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateShift(s) if s == "morning")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ShiftError { shift, .. } if shift == "morning")));
    }

    #[test]
    fn reject_bad_service_values() {
        let config = FULL_CONFIG
            .replace("\"-06:00\"", "\"Mexico City\"")
            .replace("tick_interval_seconds = 120", "tick_interval_seconds = 5");
        let errors = validation_errors(&config);

        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidTimezone { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::GlobalError(m) if m.contains("tick_interval"))));
    }

    #[test]
    fn reject_negative_default_limit() {
        let config = FULL_CONFIG.replace("spend_limit_percent = 60", "spend_limit_percent = -1");
        let errors = validation_errors(&config);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.shifts.len(), 2);
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = load_config("/nonexistent/adwarden/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
