//! Column and time normalization.
//!
//! This module turns vendor-specific exports into the canonical shape the rest
//! of the pipeline expects:
//! - Renaming vendor column names to short canonical names (`Cur(A)` -> `I`)
//! - Converting duration columns to elapsed seconds (`f64`)
//! - Parsing textual timestamps into datetimes

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::table::{Column, Table};
use crate::config::{RenameConfig, TimeConfig};

/// Errors that can occur while normalizing a table.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("column not found: {0}")]
    MissingColumn(String),

    #[error("column '{column}' holds {actual} values and cannot be read as {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("row {row} of '{column}': cannot parse duration '{value}'")]
    InvalidDuration {
        column: String,
        row: usize,
        value: String,
    },

    #[error("row {row} of '{column}': cannot parse datetime '{value}'")]
    InvalidDatetime {
        column: String,
        row: usize,
        value: String,
    },

    #[error("unsupported time unit: {0}")]
    UnsupportedUnit(String),
}

/// Result type for normalization.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Built-in renames for the usual cycler export headers.
pub fn default_rename_map() -> HashMap<String, String> {
    [
        ("Record Index", "Index"),
        ("Cur(A)", "I"),
        ("Voltage(V)", "E"),
        ("CapaCity(Ah)", "Q"),
        ("Energy(Wh)", "Energy"),
        ("Absolute Time", "Datetime"),
        ("Relative Time(h:min:s.ms)", "Time"),
        ("Auxiliary channel TU1 T(°C)", "T"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// Effective source-name to canonical-name mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    mapping: HashMap<String, String>,
}

impl RenameMap {
    /// Build the effective map: defaults (if enabled) overlaid with `overrides`.
    pub fn new(use_defaults: bool, overrides: &HashMap<String, String>) -> Self {
        let mut mapping = if use_defaults {
            default_rename_map()
        } else {
            HashMap::new()
        };
        mapping.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { mapping }
    }

    /// Only the built-in defaults.
    pub fn defaults() -> Self {
        Self::new(true, &HashMap::new())
    }

    pub fn from_config(config: &RenameConfig) -> Self {
        Self::new(config.use_defaults, &config.mapping)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.mapping.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

/// Rename mapped columns in place. Unmapped columns are left untouched.
///
/// Returns the number of columns renamed.
pub fn rename_columns(table: &mut Table, map: &RenameMap) -> usize {
    let renames: Vec<(usize, String)> = table
        .column_names()
        .iter()
        .enumerate()
        .filter_map(|(i, name)| map.get(name).map(|to| (i, to.to_string())))
        .filter(|(i, to)| table.column_names()[*i] != *to)
        .collect();

    for (position, name) in &renames {
        table.rename_at(*position, name.clone());
    }

    let mut seen = HashSet::new();
    for name in table.column_names() {
        if !seen.insert(name.as_str()) {
            log::warn!("Duplicate column name after renaming: '{}'", name);
        }
    }

    renames.len()
}

/// Copy-and-return variant of [`rename_columns`].
pub fn renamed(table: &Table, map: &RenameMap) -> Table {
    let mut copy = table.clone();
    rename_columns(&mut copy, map);
    copy
}

/// Unit of a numeric duration column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of seconds in one unit.
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1e-9,
            TimeUnit::Microseconds => 1e-6,
            TimeUnit::Milliseconds => 1e-3,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86_400.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ns" | "nanosecond" | "nanoseconds" => Ok(TimeUnit::Nanoseconds),
            "us" | "µs" | "microsecond" | "microseconds" => Ok(TimeUnit::Microseconds),
            "ms" | "millisecond" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "s" | "S" | "sec" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "min" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "H" | "hour" | "hours" => Ok(TimeUnit::Hours),
            "d" | "D" | "day" | "days" => Ok(TimeUnit::Days),
            other => Err(TransformError::UnsupportedUnit(other.to_string())),
        }
    }
}

impl TryFrom<String> for TimeUnit {
    type Error = TransformError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeUnit> for String {
    fn from(unit: TimeUnit) -> Self {
        unit.as_str().to_string()
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a textual duration into seconds.
///
/// Accepted forms:
/// - clock time `H:MM:SS(.fff)` or `MM:SS(.fff)`, optionally negative
/// - an optional day prefix: `2 days 01:00:00`, `1 day, 00:00:05`
/// - a number with a unit suffix: `90s`, `1.5h`, `250ms`
/// - a bare number, interpreted in `unit`
pub fn parse_duration(text: &str, unit: TimeUnit) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest.trim_start()),
        None => (1.0, text),
    };

    let mut days = 0.0;
    let mut clock = body;
    if let Some(pos) = body.find("day") {
        days = body[..pos].trim().parse::<f64>().ok()?;
        clock = body[pos..]
            .trim_start_matches("days")
            .trim_start_matches("day")
            .trim_start_matches(',')
            .trim();
        if clock.is_empty() {
            return Some(sign * days * 86_400.0);
        }
    }

    let seconds = if clock.contains(':') {
        parse_clock(clock)?
    } else if days > 0.0 {
        return None;
    } else {
        parse_with_suffix(clock, unit)?
    };

    Some(sign * (days * 86_400.0 + seconds))
}

fn parse_clock(clock: &str) -> Option<f64> {
    let parts: Vec<&str> = clock.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (h.trim().parse::<f64>().ok()?, m.trim().parse::<f64>().ok()?, *s),
        [m, s] => (0.0, m.trim().parse::<f64>().ok()?, *s),
        _ => return None,
    };
    let s = s.trim().parse::<f64>().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

fn parse_with_suffix(text: &str, unit: TimeUnit) -> Option<f64> {
    let split = text
        .find(|c: char| c.is_alphabetic() || c == 'µ')
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    let value = number.trim().parse::<f64>().ok()?;
    let unit = if suffix.trim().is_empty() {
        unit
    } else {
        suffix.parse::<TimeUnit>().ok()?
    };
    Some(value * unit.seconds_per_unit())
}

/// Formats tried, in order, when no explicit datetime format is configured.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Parse a timestamp, using `format` when given or a list of common layouts.
pub fn parse_datetime(text: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Some(format) = format {
        return NaiveDateTime::parse_from_str(text, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            });
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Convert a duration column to elapsed seconds.
pub fn durations_to_seconds(column: &Column, name: &str, unit: TimeUnit) -> Result<Column> {
    match column {
        Column::Number(values) => {
            let factor = unit.seconds_per_unit();
            Ok(Column::Number(
                values.iter().map(|v| v.map(|x| x * factor)).collect(),
            ))
        }
        Column::Text(values) => {
            let mut seconds = Vec::with_capacity(values.len());
            for (row, cell) in values.iter().enumerate() {
                let parsed = match cell.as_deref().map(str::trim) {
                    None | Some("") => None,
                    Some(text) => Some(parse_duration(text, unit).ok_or_else(|| {
                        TransformError::InvalidDuration {
                            column: name.to_string(),
                            row,
                            value: text.to_string(),
                        }
                    })?),
                };
                seconds.push(parsed);
            }
            Ok(Column::Number(seconds))
        }
        Column::DateTime(_) => Err(TransformError::TypeMismatch {
            column: name.to_string(),
            expected: "duration",
            actual: column.dtype(),
        }),
    }
}

/// Convert a textual timestamp column to datetimes. Datetime columns pass through.
pub fn timestamps_to_datetime(column: &Column, name: &str, format: Option<&str>) -> Result<Column> {
    match column {
        Column::DateTime(_) => Ok(column.clone()),
        Column::Text(values) => {
            let mut parsed = Vec::with_capacity(values.len());
            for (row, cell) in values.iter().enumerate() {
                let value = match cell.as_deref().map(str::trim) {
                    None | Some("") => None,
                    Some(text) => Some(parse_datetime(text, format).ok_or_else(|| {
                        TransformError::InvalidDatetime {
                            column: name.to_string(),
                            row,
                            value: text.to_string(),
                        }
                    })?),
                };
                parsed.push(value);
            }
            Ok(Column::DateTime(parsed))
        }
        Column::Number(values) if column.is_all_null() => Ok(Column::DateTime(vec![None; values.len()])),
        Column::Number(_) => Err(TransformError::TypeMismatch {
            column: name.to_string(),
            expected: "datetime",
            actual: column.dtype(),
        }),
    }
}

/// Normalize the configured time and datetime columns in place.
///
/// Either conversion is skipped when its column name is not configured.
pub fn parse_time(table: &mut Table, config: &TimeConfig) -> Result<()> {
    if let Some(name) = config.time_column.as_deref() {
        let column = table
            .column(name)
            .map_err(|_| TransformError::MissingColumn(name.to_string()))?;
        let seconds = durations_to_seconds(column, name, config.time_unit)?;
        table
            .replace_column(name, seconds)
            .map_err(|_| TransformError::MissingColumn(name.to_string()))?;
    }

    if let Some(name) = config.datetime_column.as_deref() {
        let column = table
            .column(name)
            .map_err(|_| TransformError::MissingColumn(name.to_string()))?;
        let parsed = timestamps_to_datetime(column, name, config.datetime_format.as_deref())?;
        table
            .replace_column(name, parsed)
            .map_err(|_| TransformError::MissingColumn(name.to_string()))?;
    }

    Ok(())
}
