//! Configuration validation

use crate::schema::{RawConfig, RawDays, RawHour, RawShift};
use adwarden_util::{parse_utc_offset, DaysOfWeek, ShiftWindow};
use std::collections::HashSet;
use thiserror::Error;

/// Accepted range for `service.tick_interval_seconds`
pub const TICK_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 15..=3600;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Shift '{shift}': {message}")]
    ShiftError { shift: String, message: String },

    #[error("Duplicate shift name: {0}")]
    DuplicateShift(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Default shift '{0}' is not defined")]
    UnknownDefaultShift(String),

    #[error("Invalid timezone '{value}': {message}")]
    InvalidTimezone { value: String, message: String },

    #[error("Platform config error: {0}")]
    PlatformError(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for shift in &config.shifts {
        if !seen.insert(shift.name.as_str()) {
            errors.push(ValidationError::DuplicateShift(shift.name.clone()));
        }
    }

    for shift in &config.shifts {
        errors.extend(validate_shift(shift));
    }

    let default_shift = config
        .defaults
        .shift
        .as_deref()
        .unwrap_or(crate::DEFAULT_SHIFT);
    if !seen.contains(default_shift) {
        errors.push(ValidationError::UnknownDefaultShift(default_shift.to_string()));
    }

    if let Some(limit) = config.defaults.spend_limit_percent
        && (!limit.is_finite() || limit < 0.0)
    {
        errors.push(ValidationError::GlobalError(format!(
            "defaults.spend_limit_percent must be a non-negative number, got {}",
            limit
        )));
    }

    if let Some(tz) = &config.service.timezone
        && let Err(message) = parse_utc_offset(tz)
    {
        errors.push(ValidationError::InvalidTimezone {
            value: tz.clone(),
            message,
        });
    }

    if let Some(secs) = config.service.tick_interval_seconds
        && !TICK_INTERVAL_RANGE.contains(&secs)
    {
        errors.push(ValidationError::GlobalError(format!(
            "service.tick_interval_seconds must be between {} and {}, got {}",
            TICK_INTERVAL_RANGE.start(),
            TICK_INTERVAL_RANGE.end(),
            secs
        )));
    }

    if config.service.reset_grace_minutes == Some(0) {
        errors.push(ValidationError::GlobalError(
            "service.reset_grace_minutes must be at least 1".into(),
        ));
    }

    if config.platform.account_id.trim().is_empty() {
        errors.push(ValidationError::PlatformError("account_id cannot be empty".into()));
    }

    if config.platform.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::PlatformError(
            "request_timeout_seconds must be at least 1".into(),
        ));
    }

    if let Some(env) = &config.platform.access_token_env
        && env.trim().is_empty()
    {
        errors.push(ValidationError::PlatformError(
            "access_token_env cannot be empty".into(),
        ));
    }

    if config.automation.allow_list.iter().any(|id| id.trim().is_empty()) {
        errors.push(ValidationError::GlobalError(
            "automation.allow_list contains an empty id".into(),
        ));
    }

    errors
}

fn validate_shift(shift: &RawShift) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if shift.name.trim().is_empty() {
        errors.push(ValidationError::ShiftError {
            shift: shift.name.clone(),
            message: "name cannot be empty".into(),
        });
    }

    let days = match parse_days(&shift.days) {
        Ok(days) => Some(days),
        Err(message) => {
            errors.push(ValidationError::ShiftError {
                shift: shift.name.clone(),
                message,
            });
            None
        }
    };

    let start = parse_hour(&shift.start);
    if let Err(e) = &start {
        errors.push(hour_error(&shift.start, e));
    }
    let end = parse_hour(&shift.end);
    if let Err(e) = &end {
        errors.push(hour_error(&shift.end, e));
    }

    if let (Some(days), Ok(start), Ok(end)) = (days, start, end)
        && let Err(message) = ShiftWindow::new(days, start, end)
    {
        errors.push(ValidationError::ShiftError {
            shift: shift.name.clone(),
            message,
        });
    }

    errors
}

fn hour_error(raw: &RawHour, message: &str) -> ValidationError {
    let value = match raw {
        RawHour::Fractional(h) => h.to_string(),
        RawHour::Clock(s) => s.clone(),
    };
    ValidationError::InvalidTimeFormat {
        value,
        message: message.to_string(),
    }
}

/// Parse an hour of day into fractional hours in [0, 24]
pub fn parse_hour(hour: &RawHour) -> Result<f64, String> {
    match hour {
        RawHour::Fractional(h) => {
            if !h.is_finite() || *h < 0.0 || *h > 24.0 {
                return Err("Hour must be between 0 and 24".into());
            }
            Ok(*h)
        }
        RawHour::Clock(s) => {
            let (h, m) = parse_time(s)?;
            Ok(h as f64 + m as f64 / 60.0)
        }
    }
}

/// Parse HH:MM time format. "24:00" is accepted as end of day.
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }
    if hour > 24 || (hour == 24 && minute > 0) {
        return Err("Hour must be 0-23, or 24:00 for end of day".into());
    }

    Ok((hour, minute))
}

/// Parse a days-of-week value
pub fn parse_days(days: &RawDays) -> Result<DaysOfWeek, String> {
    match days {
        RawDays::Preset(preset) => match preset.to_lowercase().as_str() {
            "all" | "every" | "daily" => Ok(DaysOfWeek::ALL_DAYS),
            "weekdays" => Ok(DaysOfWeek::WEEKDAYS),
            "weekends" => Ok(DaysOfWeek::WEEKENDS),
            other => Err(format!("Unknown day preset: {}", other)),
        },
        RawDays::Indices(indices) => DaysOfWeek::from_indices(indices.iter().copied())
            .map_err(|i| format!("Day index {} out of range (0 = Monday .. 6 = Sunday)", i)),
        RawDays::List(list) => {
            let mut mask = 0u8;
            for day in list {
                let bit = match day.to_lowercase().as_str() {
                    "mon" | "monday" => DaysOfWeek::MONDAY,
                    "tue" | "tuesday" => DaysOfWeek::TUESDAY,
                    "wed" | "wednesday" => DaysOfWeek::WEDNESDAY,
                    "thu" | "thursday" => DaysOfWeek::THURSDAY,
                    "fri" | "friday" => DaysOfWeek::FRIDAY,
                    "sat" | "saturday" => DaysOfWeek::SATURDAY,
                    "sun" | "sunday" => DaysOfWeek::SUNDAY,
                    other => return Err(format!("Unknown day: {}", other)),
                };
                mask |= bit;
            }
            Ok(DaysOfWeek::new(mask))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30").unwrap(), (14, 30));
        assert_eq!(parse_time("00:00").unwrap(), (0, 0));
        assert_eq!(parse_time("24:00").unwrap(), (24, 0));

        assert!(parse_time("24:01").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn test_parse_hour() {
        assert_eq!(parse_hour(&RawHour::Fractional(6.5)).unwrap(), 6.5);
        assert_eq!(parse_hour(&RawHour::Clock("13:30".into())).unwrap(), 13.5);
        assert!(parse_hour(&RawHour::Fractional(24.5)).is_err());
        assert!(parse_hour(&RawHour::Fractional(-1.0)).is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(
            parse_days(&RawDays::Preset("weekdays".into())).unwrap(),
            DaysOfWeek::WEEKDAYS
        );
        assert_eq!(
            parse_days(&RawDays::Preset("weekends".into())).unwrap(),
            DaysOfWeek::WEEKENDS
        );
        assert_eq!(
            parse_days(&RawDays::List(vec!["mon".into(), "wed".into()])).unwrap(),
            DaysOfWeek::new(DaysOfWeek::MONDAY | DaysOfWeek::WEDNESDAY)
        );
        assert_eq!(
            parse_days(&RawDays::Indices(vec![5])).unwrap(),
            DaysOfWeek::new(DaysOfWeek::SATURDAY)
        );
        assert!(parse_days(&RawDays::Indices(vec![7])).is_err());
        assert!(parse_days(&RawDays::Preset("someday".into())).is_err());
    }
}
