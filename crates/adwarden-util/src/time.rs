//! Time utilities for adwarden
//!
//! Advertiser schedules are written in human wall-clock terms, so every
//! shift comparison happens in the account's fixed civil time zone (a UTC
//! offset from configuration), never in UTC and never in the host's zone.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ADWARDEN_MOCK_TIME` environment variable overrides
//! the wall clock of an [`AccountClock`]. The value is read in the account's
//! time zone and advances at the real rate from process start.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-30 08:00:00`)
//!
//! ```bash
//! ADWARDEN_MOCK_TIME="2025-12-30 08:00:00" adwardend
//! ```

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ADWARDEN_MOCK_TIME";

const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of "now" in the account's local time zone
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// System clock projected into the account's fixed UTC offset
#[derive(Debug, Clone)]
pub struct AccountClock {
    offset: FixedOffset,
    mock_offset: Option<chrono::Duration>,
}

impl AccountClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            mock_offset: mock_offset_from_env(offset),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Returns whether mock time is active for this clock.
    pub fn is_mocked(&self) -> bool {
        self.mock_offset.is_some()
    }
}

impl Clock for AccountClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let real_now = Utc::now().with_timezone(&self.offset);
        match self.mock_offset {
            Some(offset) => real_now + offset,
            None => real_now,
        }
    }
}

#[cfg(debug_assertions)]
fn mock_offset_from_env(offset: FixedOffset) -> Option<chrono::Duration> {
    let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;

    let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) else {
        tracing::warn!(
            mock_time = %mock_time_str,
            expected_format = MOCK_TIME_FORMAT,
            "Invalid mock time format"
        );
        return None;
    };

    let mock_dt = offset.from_local_datetime(&naive_dt).single()?;
    let delta = mock_dt
        .with_timezone(&Utc)
        .signed_duration_since(Utc::now());

    tracing::info!(
        mock_time = %mock_time_str,
        offset_secs = delta.num_seconds(),
        "Mock time enabled"
    );
    Some(delta)
}

#[cfg(not(debug_assertions))]
fn mock_offset_from_env(_offset: FixedOffset) -> Option<chrono::Duration> {
    None
}

/// Manually driven clock for tests and dry runs
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Build a clock from a `YYYY-MM-DD HH:MM:SS` local time in the given offset
    pub fn at_local(local: &str, offset: FixedOffset) -> Option<Self> {
        let naive = NaiveDateTime::parse_from_str(local, MOCK_TIME_FORMAT).ok()?;
        let now = offset.from_local_datetime(&naive).single()?;
        Some(Self::new(now))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap()
    }
}

/// Parse a UTC offset such as `-06:00`, `+0530`, `+09` or `UTC`
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| "Invalid offset".to_string());
    }

    let sign = match s.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Err("Offset must start with '+' or '-'".into()),
    };

    let digits: String = s.get(1..).unwrap_or("").chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Offset must contain only digits after the sign".into());
    }
    let (hours, minutes) = match digits.len() {
        2 => (&digits[..2], "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err("Expected +HH:MM format".into()),
    };

    let hours: i32 = hours.parse().map_err(|_| "Invalid offset hours".to_string())?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| "Invalid offset minutes".to_string())?;

    if hours > 14 {
        return Err("Offset hours must be 0-14".into());
    }
    if minutes >= 60 {
        return Err("Offset minutes must be 0-59".into());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| "Offset out of range".to_string())
}

/// Fractional hour of day, e.g. 08:30:00 -> 8.5
pub fn hour_of_day<Tz: TimeZone>(dt: &DateTime<Tz>) -> f64 {
    let t = dt.time();
    t.hour() as f64 + t.minute() as f64 / 60.0 + t.second() as f64 / 3600.0
}

/// Seconds elapsed since local midnight
pub fn seconds_since_midnight<Tz: TimeZone>(dt: &DateTime<Tz>) -> u32 {
    dt.time().num_seconds_from_midnight()
}

/// True if `dt` lies within `grace` after local midnight
pub fn within_grace_after_midnight<Tz: TimeZone>(dt: &DateTime<Tz>, grace: Duration) -> bool {
    u64::from(seconds_since_midnight(dt)) < grace.as_secs()
}

/// Format a fractional hour as HH:MM
pub fn format_hour(hour: f64) -> String {
    let total_minutes = (hour * 60.0).round() as u32;
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}

/// Days of the week mask
///
/// Serialized as a sorted list of weekday indices, 0=Monday..6=Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct DaysOfWeek(u8);

impl DaysOfWeek {
    pub const MONDAY: u8 = 1 << 0;
    pub const TUESDAY: u8 = 1 << 1;
    pub const WEDNESDAY: u8 = 1 << 2;
    pub const THURSDAY: u8 = 1 << 3;
    pub const FRIDAY: u8 = 1 << 4;
    pub const SATURDAY: u8 = 1 << 5;
    pub const SUNDAY: u8 = 1 << 6;

    pub const WEEKDAYS: DaysOfWeek = DaysOfWeek(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const WEEKENDS: DaysOfWeek = DaysOfWeek(Self::SATURDAY | Self::SUNDAY);
    pub const ALL_DAYS: DaysOfWeek = DaysOfWeek(0x7F);
    pub const NONE: DaysOfWeek = DaysOfWeek(0);

    pub fn new(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    /// Build a mask from weekday indices (0=Monday..6=Sunday).
    /// Returns the first out-of-range index as the error.
    pub fn from_indices(indices: impl IntoIterator<Item = u8>) -> Result<Self, u8> {
        let mut mask = 0u8;
        for index in indices {
            if index > 6 {
                return Err(index);
            }
            mask |= 1 << index;
        }
        Ok(Self(mask))
    }

    pub fn indices(&self) -> Vec<u8> {
        (0..7).filter(|i| self.0 & (1 << i) != 0).collect()
    }

    pub fn mask(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        let bit = 1u8 << weekday.num_days_from_monday();
        (self.0 & bit) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DaysOfWeek {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl From<DaysOfWeek> for Vec<u8> {
    fn from(days: DaysOfWeek) -> Self {
        days.indices()
    }
}

impl TryFrom<Vec<u8>> for DaysOfWeek {
    type Error = String;

    fn try_from(indices: Vec<u8>) -> Result<Self, Self::Error> {
        DaysOfWeek::from_indices(indices)
            .map_err(|i| format!("weekday index {} out of range 0-6", i))
    }
}

/// A recurring shift: a same-day hour range on a set of weekdays.
///
/// The window is half-open, `start_hour <= hour < end_hour`, and never spans
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub days: DaysOfWeek,
    pub start_hour: f64,
    pub end_hour: f64,
}

impl ShiftWindow {
    pub fn new(days: DaysOfWeek, start_hour: f64, end_hour: f64) -> Result<Self, String> {
        let window = Self {
            days,
            start_hour,
            end_hour,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.start_hour.is_finite() || !self.end_hour.is_finite() {
            return Err("Shift hours must be finite numbers".into());
        }
        if !(0.0..=24.0).contains(&self.start_hour) || !(0.0..=24.0).contains(&self.end_hour) {
            return Err("Shift hours must be within 0-24".into());
        }
        if self.start_hour > self.end_hour {
            return Err(format!(
                "Shift start {} is after end {}",
                self.start_hour, self.end_hour
            ));
        }
        Ok(())
    }

    /// Check if the given local datetime falls within this shift
    pub fn contains<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        if !self.days.contains(dt.weekday()) {
            return false;
        }

        let hour = hour_of_day(dt);
        hour >= self.start_hour && hour < self.end_hour
    }
}

impl fmt::Display for ShiftWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} days {:?}",
            format_hour(self.start_hour),
            format_hour(self.end_hour),
            self.days.indices()
        )
    }
}
