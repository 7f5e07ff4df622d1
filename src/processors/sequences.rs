//! Sequence extraction and time-axis stitching.
//!
//! A sequence is an ordered list of step keys. Extraction pulls the rows of
//! each step out of the source table (in the order the caller lists the
//! steps), shifts each step's relative time so the steps line up on one
//! continuous axis, and concatenates them into one table per sequence.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::core::table::{GroupKey, Table, TableError};

/// Errors that can occur during extraction.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("unknown time merge policy '{0}' (expected a gap in seconds, 'remove_first' or 'remove_last')")]
    UnknownPolicy(String),

    #[error("time merge gap must be finite and non-negative, got {0}")]
    InvalidGap(f64),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Result type for extraction.
pub type Result<T> = std::result::Result<T, SequenceError>;

/// How consecutive steps are stitched onto one time axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimeMergeRepr", into = "TimeMergeRepr")]
pub enum TimeMerge {
    /// Each step starts `gap` seconds after the previous step's last sample.
    Gap(f64),
    /// Steps touch at the boundary; the first sample of every step but the
    /// first is dropped.
    RemoveFirst,
    /// Steps touch at the boundary; the last sample of every step but the
    /// last is dropped.
    RemoveLast,
}

impl TimeMerge {
    fn validate(self) -> Result<Self> {
        match self {
            TimeMerge::Gap(gap) if !gap.is_finite() || gap < 0.0 => Err(SequenceError::InvalidGap(gap)),
            other => Ok(other),
        }
    }
}

/// Parse a policy where `none` (any case) disables merging.
pub fn parse_optional(s: &str) -> Result<Option<TimeMerge>> {
    if s.trim().eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        s.parse().map(Some)
    }
}

/// Deserialize an optional policy, reading `null` or `none` as no merging.
pub fn deserialize_optional<'de, D>(deserializer: D) -> std::result::Result<Option<TimeMerge>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<TimeMergeRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(TimeMergeRepr::Named(name)) => parse_optional(&name).map_err(de::Error::custom),
        Some(repr) => TimeMerge::try_from(repr).map(Some).map_err(de::Error::custom),
    }
}

impl FromStr for TimeMerge {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "remove_first" => Ok(TimeMerge::RemoveFirst),
            "remove_last" => Ok(TimeMerge::RemoveLast),
            other => match other.parse::<f64>() {
                Ok(gap) => TimeMerge::Gap(gap).validate(),
                Err(_) => Err(SequenceError::UnknownPolicy(other.to_string())),
            },
        }
    }
}

impl fmt::Display for TimeMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeMerge::Gap(gap) => write!(f, "gap {}s", gap),
            TimeMerge::RemoveFirst => f.write_str("remove_first"),
            TimeMerge::RemoveLast => f.write_str("remove_last"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TimeMergeRepr {
    Gap(f64),
    Named(String),
}

impl TryFrom<TimeMergeRepr> for TimeMerge {
    type Error = SequenceError;

    fn try_from(repr: TimeMergeRepr) -> Result<Self> {
        match repr {
            TimeMergeRepr::Gap(gap) => TimeMerge::Gap(gap).validate(),
            TimeMergeRepr::Named(name) => name.parse(),
        }
    }
}

impl From<TimeMerge> for TimeMergeRepr {
    fn from(merge: TimeMerge) -> Self {
        match merge {
            TimeMerge::Gap(gap) => TimeMergeRepr::Gap(gap),
            other => TimeMergeRepr::Named(other.to_string()),
        }
    }
}

/// Whether the concatenated rows of `steps` are consecutive source records.
///
/// True only when every row directly follows the previous one in the source
/// table, i.e. the steps are adjacent and listed in file order.
pub fn is_sequential(steps: &[Table]) -> bool {
    let mut labels = steps.iter().flat_map(|s| s.index().iter().copied());
    let Some(mut previous) = labels.next() else {
        return true;
    };
    for label in labels {
        if label != previous + 1 {
            return false;
        }
        previous = label;
    }
    true
}

/// Split out the rows of each step in `steps`, in the order given.
///
/// Rows keep their source order within a step. A step with no rows yields an
/// empty sub-table.
pub fn select_steps(table: &Table, steps: &[GroupKey], group_column: &str) -> Result<Vec<Table>> {
    let mut rows_by_key: HashMap<GroupKey, Vec<usize>> = HashMap::new();
    for (row, key) in table.column(group_column)?.keys().into_iter().enumerate() {
        if let Some(key) = key {
            rows_by_key.entry(key).or_default().push(row);
        }
    }

    let selected: Vec<Table> = steps
        .iter()
        .map(|step| match rows_by_key.get(step) {
            Some(rows) => table.take_rows(rows),
            None => {
                log::warn!("No rows with {} = {}", group_column, step);
                table.take_rows(&[])
            }
        })
        .collect();

    if !is_sequential(&selected) {
        let listed: Vec<String> = steps.iter().map(|s| s.to_string()).collect();
        log::warn!(
            "Steps [{}] of '{}' are not sequential in the source data",
            listed.join(", "),
            group_column
        );
    }

    Ok(selected)
}

/// Shift the time column of every step by `increment`; return the shifted
/// maximum, if the step has any time values.
fn shift_step(step: &mut Table, time_column: &str, increment: f64) -> Result<Option<f64>> {
    let times = step.numbers_mut(time_column)?;
    let mut max: Option<f64> = None;
    for value in times.iter_mut().flatten() {
        *value += increment;
        max = Some(max.map_or(*value, |m: f64| m.max(*value)));
    }
    Ok(max)
}

/// Rebase `time_column` across `steps` onto one continuous axis.
///
/// With no policy the steps are returned untouched.
pub fn merge_time(mut steps: Vec<Table>, policy: Option<TimeMerge>, time_column: &str) -> Result<Vec<Table>> {
    let Some(policy) = policy else {
        return Ok(steps);
    };
    let policy = policy.validate()?;

    let gap = match policy {
        TimeMerge::Gap(gap) => gap,
        TimeMerge::RemoveFirst | TimeMerge::RemoveLast => 0.0,
    };

    let mut increment = 0.0;
    for step in &mut steps {
        // Empty steps leave the running increment where it was.
        if let Some(max) = shift_step(step, time_column, increment)? {
            increment = max + gap;
        }
    }

    let last = steps.len().saturating_sub(1);
    match policy {
        TimeMerge::Gap(_) => {}
        TimeMerge::RemoveFirst => {
            for step in steps.iter_mut().skip(1) {
                *step = step.slice(1, step.len());
            }
        }
        TimeMerge::RemoveLast => {
            for step in steps.iter_mut().take(last) {
                *step = step.slice(0, step.len().saturating_sub(1));
            }
        }
    }

    Ok(steps)
}

/// Extract every sequence from `table` as one time-stitched table.
///
/// Output order follows `sequences`. `time_column` must be numeric (elapsed
/// seconds) whenever a merge policy is given.
pub fn extract_sequences(
    table: &Table,
    sequences: &[Vec<GroupKey>],
    policy: Option<TimeMerge>,
    group_column: &str,
    time_column: &str,
) -> Result<Vec<Table>> {
    if policy.is_some() {
        table.numbers(time_column)?;
    }

    let mut extracted = Vec::with_capacity(sequences.len());
    for sequence in sequences {
        if sequence.is_empty() {
            log::warn!("Empty step sequence requested; producing an empty table");
        }
        let steps = select_steps(table, sequence, group_column)?;
        let merged = merge_time(steps, policy, time_column)?;
        let joined = if merged.is_empty() {
            table.take_rows(&[])
        } else {
            Table::concat(&merged)?
        };
        extracted.push(joined);
    }

    log::info!(
        "Extracted {} sequence(s) ({} rows total)",
        extracted.len(),
        extracted.iter().map(Table::len).sum::<usize>()
    );

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table::Column;

    fn numbers(values: &[f64]) -> Column {
        Column::Number(values.iter().copied().map(Some).collect())
    }

    fn time_table(times: &[f64]) -> Table {
        Table::from_columns([("Time", numbers(times))]).unwrap()
    }

    fn times(table: &Table) -> Vec<f64> {
        table.numbers("Time").unwrap().iter().flatten().copied().collect()
    }

    fn cycler_table() -> Table {
        Table::from_columns([
            ("Step", numbers(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0])),
            ("I", numbers(&[0.0, 0.0, -1.0, -1.0, 1.0, 1.0])),
            ("Time", numbers(&[0.0, 5.0, 0.0, 2.0, 0.0, 3.0])),
        ])
        .unwrap()
    }

    fn steps(keys: &[i64]) -> Vec<GroupKey> {
        keys.iter().copied().map(GroupKey::Int).collect()
    }

    #[test]
    fn test_gap_merge() {
        let parts = vec![time_table(&[0.0, 5.0]), time_table(&[0.0, 3.0])];
        let merged = merge_time(parts, Some(TimeMerge::Gap(1.0)), "Time").unwrap();

        assert_eq!(times(&merged[0]), vec![0.0, 5.0]);
        assert_eq!(times(&merged[1]), vec![6.0, 9.0]);
    }

    #[test]
    fn test_remove_first_drops_boundary_duplicate() {
        let parts = vec![time_table(&[0.0, 5.0]), time_table(&[0.0, 3.0])];
        let merged = merge_time(parts, Some(TimeMerge::RemoveFirst), "Time").unwrap();

        assert_eq!(times(&merged[0]), vec![0.0, 5.0]);
        assert_eq!(times(&merged[1]), vec![8.0]);
    }

    #[test]
    fn test_remove_last_drops_boundary_duplicate() {
        let parts = vec![
            time_table(&[0.0, 5.0]),
            time_table(&[0.0, 3.0]),
            time_table(&[0.0, 1.0]),
        ];
        let merged = merge_time(parts, Some(TimeMerge::RemoveLast), "Time").unwrap();

        assert_eq!(times(&merged[0]), vec![0.0]);
        assert_eq!(times(&merged[1]), vec![5.0]);
        assert_eq!(times(&merged[2]), vec![8.0, 9.0]);
    }

    #[test]
    fn test_no_merge_keeps_times() {
        let parts = vec![time_table(&[0.0, 5.0]), time_table(&[0.0, 3.0])];
        let merged = merge_time(parts.clone(), None, "Time").unwrap();
        assert_eq!(merged, parts);
    }

    #[test]
    fn test_end_to_end_gap_zero() {
        let table = cycler_table();
        let out = extract_sequences(&table, &[steps(&[1, 2, 3])], Some(TimeMerge::Gap(0.0)), "Step", "Time").unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 6);
        let t = times(&out[0]);
        assert_eq!(t, vec![0.0, 5.0, 5.0, 7.0, 7.0, 10.0]);
        assert!(t.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_caller_order_is_respected() {
        let table = cycler_table();
        let out = extract_sequences(&table, &[steps(&[3, 1])], None, "Step", "Time").unwrap();

        assert_eq!(out[0].numbers("Step").unwrap(), &[Some(3.0), Some(3.0), Some(1.0), Some(1.0)]);
        assert_eq!(out[0].index(), &[4, 5, 0, 1]);
    }

    #[test]
    fn test_multiple_sequences_in_order() {
        let table = cycler_table();
        let out = extract_sequences(
            &table,
            &[steps(&[2, 3]), steps(&[1])],
            Some(TimeMerge::RemoveFirst),
            "Step",
            "Time",
        )
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(times(&out[0]), vec![0.0, 2.0, 5.0]);
        assert_eq!(times(&out[1]), vec![0.0, 5.0]);
    }

    #[test]
    fn test_source_table_untouched() {
        let table = cycler_table();
        let before = table.clone();
        let _ = extract_sequences(&table, &[steps(&[1, 2])], Some(TimeMerge::Gap(1.0)), "Step", "Time").unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn test_is_sequential() {
        let table = cycler_table();
        let ordered = select_steps(&table, &steps(&[1, 2]), "Step").unwrap();
        assert!(is_sequential(&ordered));

        let skipped = select_steps(&table, &steps(&[1, 3]), "Step").unwrap();
        assert!(!is_sequential(&skipped));

        let reversed = select_steps(&table, &steps(&[2, 1]), "Step").unwrap();
        assert!(!is_sequential(&reversed));
    }

    #[test]
    fn test_missing_step_yields_empty_part() {
        let table = cycler_table();
        let parts = select_steps(&table, &steps(&[1, 42]), "Step").unwrap();
        assert_eq!(parts[1].len(), 0);
        assert_eq!(parts[1].width(), 3);
    }

    #[test]
    fn test_non_numeric_time_column_rejected() {
        let table = Table::from_columns([
            ("Step", numbers(&[1.0])),
            ("Time", Column::Text(vec![Some("0:00:01".into())])),
        ])
        .unwrap();
        let err = extract_sequences(&table, &[steps(&[1])], Some(TimeMerge::Gap(0.0)), "Step", "Time").unwrap_err();
        assert!(matches!(err, SequenceError::Table(TableError::TypeMismatch { .. })));
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("remove_first".parse::<TimeMerge>().unwrap(), TimeMerge::RemoveFirst);
        assert_eq!("remove_last".parse::<TimeMerge>().unwrap(), TimeMerge::RemoveLast);
        assert_eq!("2.5".parse::<TimeMerge>().unwrap(), TimeMerge::Gap(2.5));
        assert!(matches!("overlap".parse::<TimeMerge>(), Err(SequenceError::UnknownPolicy(_))));
        assert!(matches!("-1".parse::<TimeMerge>(), Err(SequenceError::InvalidGap(_))));
    }

    #[test]
    fn test_parse_optional_none() {
        assert_eq!(parse_optional("none").unwrap(), None);
        assert_eq!(parse_optional(" None ").unwrap(), None);
        assert_eq!(parse_optional("remove_last").unwrap(), Some(TimeMerge::RemoveLast));
        assert!(parse_optional("nothing").is_err());
    }
}
