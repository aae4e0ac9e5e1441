//! Raw configuration schema (as parsed from TOML)

use adwarden_api::EntityLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Advertising platform connection
    pub platform: RawPlatformConfig,

    /// Values for settings created on first observation
    #[serde(default)]
    pub defaults: RawDefaults,

    /// Which entities the engine may touch
    #[serde(default)]
    pub automation: RawAutomation,

    /// Shift schedules, seeded into the store at startup
    #[serde(default)]
    pub shifts: Vec<RawShift>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Log directory
    pub log_dir: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Reconciliation period
    pub tick_interval_seconds: Option<u64>,

    /// Account civil time zone as a UTC offset, e.g. "-06:00"
    pub timezone: Option<String>,

    /// Window after local midnight in which frozen flags are cleared
    pub reset_grace_minutes: Option<u64>,

    /// How long a fetched entity list is reused for snapshots
    pub sync_cache_seconds: Option<u64>,
}

/// Platform connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPlatformConfig {
    pub base_url: Option<String>,
    pub api_version: Option<String>,

    /// Ad account identifier, e.g. "act_1234567890"
    pub account_id: String,

    /// Object level to automate (campaign, adset, ad)
    #[serde(default)]
    pub level: EntityLevel,

    /// Name of the environment variable holding the access token
    pub access_token_env: Option<String>,

    pub request_timeout_seconds: Option<u64>,

    /// Budgets reported in cents rather than major units
    pub budget_in_minor_units: Option<bool>,
}

/// Defaults for new entity settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDefaults {
    pub shift: Option<String>,
    pub spend_limit_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAutomation {
    /// Entity ids under automation. Empty means all observed entities.
    #[serde(default)]
    pub allow_list: Vec<String>,
}

/// Shift schedule definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawShift {
    /// Unique shift name
    pub name: String,

    /// Days of week: "weekdays", "weekends", "all", a list like ["mon", "tue"],
    /// or indices with 0 = Monday
    pub days: RawDays,

    /// Start, inclusive
    pub start: RawHour,

    /// End, exclusive
    pub end: RawHour,
}

/// Days of week, in any of the accepted forms
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDays {
    Preset(String),
    Indices(Vec<u8>),
    List(Vec<String>),
}

/// Hour of day, either fractional (6.5) or clock notation ("06:30")
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawHour {
    Fractional(f64),
    Clock(String),
}
