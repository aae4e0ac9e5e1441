//! Validated policy structures

use crate::schema::{RawConfig, RawPlatformConfig, RawServiceConfig, RawShift};
use crate::validation::{parse_days, parse_hour};
use adwarden_api::{EntityLevel, SettingDefaults};
use adwarden_util::{
    default_data_dir, default_log_dir, default_socket_path, parse_utc_offset, DaysOfWeek,
    EntityId, ShiftWindow,
};
use chrono::{FixedOffset, Offset, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SHIFT: &str = "morning";
pub const DEFAULT_SPEND_LIMIT_PERCENT: f64 = 50.0;
pub const DEFAULT_TICK_INTERVAL_SECONDS: u64 = 90;
pub const DEFAULT_RESET_GRACE_MINUTES: u64 = 5;
pub const DEFAULT_SYNC_CACHE_SECONDS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v19.0";
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "ADWARDEN_ACCESS_TOKEN";

/// Validated policy ready for use by the engine and control plane
#[derive(Debug, Clone)]
pub struct Policy {
    pub service: ServiceConfig,
    pub platform: PlatformConfig,

    /// Defaults for settings created on first observation
    pub defaults: SettingDefaults,

    /// Entities under automation. Empty means all observed entities.
    pub allow_list: Vec<EntityId>,

    /// Shift windows to seed into the store
    pub shifts: BTreeMap<String, ShiftWindow>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let shifts = raw.shifts.into_iter().map(convert_shift).collect();

        let defaults = SettingDefaults {
            shift: raw
                .defaults
                .shift
                .unwrap_or_else(|| DEFAULT_SHIFT.to_string()),
            spend_limit_percent: raw
                .defaults
                .spend_limit_percent
                .unwrap_or(DEFAULT_SPEND_LIMIT_PERCENT),
        };

        Self {
            service: ServiceConfig::from_raw(raw.service),
            platform: PlatformConfig::from_raw(raw.platform),
            defaults,
            allow_list: raw
                .automation
                .allow_list
                .into_iter()
                .map(EntityId::new)
                .collect(),
            shifts,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    /// Account civil time zone
    pub timezone: FixedOffset,
    pub reset_grace: Duration,
    pub sync_cache: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            socket_path: raw.socket_path.unwrap_or(defaults.socket_path),
            log_dir: raw.log_dir.unwrap_or(defaults.log_dir),
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            tick_interval: raw
                .tick_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.tick_interval),
            timezone: raw
                .timezone
                .and_then(|tz| parse_utc_offset(&tz).ok())
                .unwrap_or(defaults.timezone),
            reset_grace: raw
                .reset_grace_minutes
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.reset_grace),
            sync_cache: raw
                .sync_cache_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_cache),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_dir: default_log_dir(),
            data_dir: default_data_dir(),
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECONDS),
            timezone: Utc.fix(),
            reset_grace: Duration::from_secs(DEFAULT_RESET_GRACE_MINUTES * 60),
            sync_cache: Duration::from_secs(DEFAULT_SYNC_CACHE_SECONDS),
        }
    }
}

/// Platform connection configuration
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub base_url: String,
    pub api_version: String,
    pub account_id: String,
    pub level: EntityLevel,
    pub access_token_env: String,
    pub request_timeout: Duration,
    pub budget_in_minor_units: bool,
}

impl PlatformConfig {
    fn from_raw(raw: RawPlatformConfig) -> Self {
        Self {
            base_url: raw
                .base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_version: raw
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            account_id: raw.account_id,
            level: raw.level,
            access_token_env: raw
                .access_token_env
                .unwrap_or_else(|| DEFAULT_ACCESS_TOKEN_ENV.to_string()),
            request_timeout: Duration::from_secs(
                raw.request_timeout_seconds
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            ),
            budget_in_minor_units: raw.budget_in_minor_units.unwrap_or(true),
        }
    }

    /// Read the access token from the configured environment variable
    pub fn access_token(&self) -> Option<String> {
        std::env::var(&self.access_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

// Conversion helpers

fn convert_shift(raw: RawShift) -> (String, ShiftWindow) {
    let days = parse_days(&raw.days).unwrap_or(DaysOfWeek::NONE);
    let start_hour = parse_hour(&raw.start).unwrap_or(0.0);
    let end_hour = parse_hour(&raw.end).unwrap_or(0.0);

    (
        raw.name,
        ShiftWindow {
            days,
            start_hour,
            end_hour,
        },
    )
}
