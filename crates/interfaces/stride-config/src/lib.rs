//! Environment-derived runtime configuration. Every recognized setting is
//! parsed and validated exactly once, into one immutable value; the rest
//! of the system never touches the environment.

use std::collections::BTreeSet;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use stride_core::filter::FilterConfig;
use stride_core::{ActivityId, OutputKind};

/// Default activities per listing page.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Default minimum delay between any two remote calls, in seconds.
pub const DEFAULT_REQUEST_DELAY_SECONDS: f64 = 10.0;

/// Default bounded attempts per remote call before the unit is failed.
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 3;

/// Directory under the download root holding the record store, when
/// `STRIDE_STATE_DIR` does not say otherwise.
pub const DEFAULT_STATE_DIR_NAME: &str = ".stride";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },
    #[error("invalid {name} value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_owned(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub download_dir: Utf8PathBuf,
    pub state_dir: Utf8PathBuf,
    pub api_url: String,
    /// Absent token is not a startup error; the first remote call reports
    /// it as an auth failure instead. Session handling is not ours.
    pub api_token: Option<String>,
    pub batch_size: usize,
    pub request_delay: Duration,
    pub max_fetch_attempts: u32,
    pub check_for_activity_changes: bool,
    pub always_recheck_all_activities: bool,
    pub filter: FilterConfig,
}

impl SyncConfig {
    /// Load from the process environment (after `.env`, if present).
    pub fn from_env(download_dir: Utf8PathBuf, api_url: String) -> Result<SyncConfig, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(download_dir, api_url, |name| std::env::var(name).ok())
    }

    /// The parsing core, fed by an injected lookup so tests never mutate
    /// process-wide environment state.
    pub fn from_lookup(
        download_dir: Utf8PathBuf,
        api_url: String,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SyncConfig, ConfigError> {
        let state_dir = match lookup("STRIDE_STATE_DIR") {
            Some(dir) if !dir.trim().is_empty() => Utf8PathBuf::from(dir),
            _ => download_dir.join(DEFAULT_STATE_DIR_NAME),
        };

        let api_token = lookup("STRIDE_API_TOKEN").filter(|t| !t.trim().is_empty());

        let batch_size = parse_usize(&lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(invalid("BATCH_SIZE", "0", "must be positive"));
        }

        let delay_seconds =
            parse_f64(&lookup, "REQUEST_DELAY_SECONDS", DEFAULT_REQUEST_DELAY_SECONDS)?;
        if delay_seconds < 0.0 || !delay_seconds.is_finite() {
            return Err(invalid(
                "REQUEST_DELAY_SECONDS",
                &delay_seconds.to_string(),
                "must be a non-negative number",
            ));
        }

        let max_fetch_attempts =
            parse_usize(&lookup, "MAX_FETCH_ATTEMPTS", DEFAULT_MAX_FETCH_ATTEMPTS as usize)? as u32;
        if max_fetch_attempts == 0 {
            return Err(invalid("MAX_FETCH_ATTEMPTS", "0", "must be positive"));
        }

        let check_for_activity_changes =
            parse_bool(&lookup, "CHECK_FOR_ACTIVITY_CHANGES", true);
        let always_recheck_all_activities =
            parse_bool(&lookup, "ALWAYS_RECHECK_ALL_ACTIVITIES", false);

        let filter = FilterConfig {
            start_date: parse_date(&lookup, "START_DATE", false)?,
            end_date: parse_date(&lookup, "END_DATE", true)?,
            excluded_activity_types: parse_string_set(&lookup, "EXCLUDED_ACTIVITY_TYPES"),
            excluded_activity_ids: parse_id_set(&lookup, "EXCLUDED_ACTIVITY_IDS")?,
            excluded_output_kinds: parse_kind_set(&lookup, "EXCLUDED_FILE_TYPES")?,
            min_activity_age: parse_min_age(&lookup)?,
        };

        Ok(SyncConfig {
            download_dir,
            state_dir,
            api_url,
            api_token,
            batch_size,
            request_delay: Duration::from_secs_f64(delay_seconds),
            max_fetch_attempts,
            check_for_activity_changes,
            always_recheck_all_activities,
            filter,
        })
    }
}

fn parse_bool(lookup: impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    match lookup(name) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        None => default,
    }
}

fn parse_usize(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    match lookup(name) {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|_| invalid(name, &v, "must be a valid integer")),
        None => Ok(default),
    }
}

fn parse_f64(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: f64,
) -> Result<f64, ConfigError> {
    match lookup(name) {
        Some(v) => v
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(name, &v, "must be a valid number")),
        None => Ok(default),
    }
}

/// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`; a date-only end bound means the
/// end of that day.
fn parse_date(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    is_end_date: bool,
) -> Result<Option<DateTime<Utc>>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(&value, "%Y-%m-%d %H:%M:%S") {
        return Ok(Some(dt.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
        let time = if is_end_date {
            chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()
        } else {
            chrono::NaiveTime::MIN
        };
        return Ok(Some(date.and_time(time).and_utc()));
    }
    Err(invalid(name, &value, "expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"))
}

fn parse_string_set(lookup: impl Fn(&str) -> Option<String>, name: &str) -> BTreeSet<String> {
    lookup(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_id_set(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<BTreeSet<ActivityId>, ConfigError> {
    let mut out = BTreeSet::new();
    if let Some(value) = lookup(name) {
        for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let id = part
                .parse::<ActivityId>()
                .map_err(|_| invalid(name, part, "must be a valid integer"))?;
            out.insert(id);
        }
    }
    Ok(out)
}

fn parse_kind_set(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<BTreeSet<OutputKind>, ConfigError> {
    let mut out = BTreeSet::new();
    if let Some(value) = lookup(name) {
        for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind = OutputKind::from_dir_name(part).ok_or_else(|| {
                invalid(name, part, "valid values: activity_json, gpx, tcx, kml, csv")
            })?;
            if kind == OutputKind::Json {
                return Err(invalid(
                    name,
                    part,
                    "activity_json cannot be excluded; it anchors change tracking",
                ));
            }
            out.insert(kind);
        }
    }
    Ok(out)
}

fn parse_min_age(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<chrono::Duration>, ConfigError> {
    const NAME: &str = "MIN_ACTIVITY_AGE";
    let Some(value) = lookup(NAME) else {
        return Ok(None);
    };
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Ok(None);
    }
    let seconds = parse_timespan(&value)
        .ok_or_else(|| invalid(NAME, &value, "must be a duration like '45s', '5m', '6h', '2d'"))?;
    chrono::Duration::try_seconds(seconds as i64)
        .map(Some)
        .ok_or_else(|| invalid(NAME, &value, "duration out of range"))
}

/// `"90"` (seconds), `"45s"`, `"5m"`, `"6h"`, `"2d"`. No crate in our
/// stack parses these, so the handful of suffixes lives here.
fn parse_timespan(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last()? {
        's' => (&value[..value.len() - 1], 1),
        'm' => (&value[..value.len() - 1], 60),
        'h' => (&value[..value.len() - 1], 3600),
        'd' => (&value[..value.len() - 1], 86_400),
        c if c.is_ascii_digit() => (value, 1),
        _ => return None,
    };
    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}
