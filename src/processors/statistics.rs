//! Per-step aggregate statistics.
//!
//! Rows are grouped by a step marker (a column, or externally computed labels
//! aligned with the rows) and each requested column is summarized with one or
//! more [`StatMethod`]s. The result has one row per group, in the order the
//! groups first appear in the source table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::core::table::{Column, GroupKey, Table, TableError, Value};

/// Distinct-value count above which `unique` is reported as suspicious.
pub const UNIQUE_WARN_THRESHOLD: usize = 10;

/// Separator used when joining distinct values.
const UNIQUE_SEPARATOR: &str = ", ";

/// Errors that can occur during aggregation.
#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("unsupported aggregation method: '{0}'")]
    UnsupportedMethod(String),

    #[error("method '{method}' cannot summarize {dtype} column '{column}'")]
    UnsupportedColumnType {
        column: String,
        method: StatMethod,
        dtype: &'static str,
    },

    #[error("group marker has {actual} labels, table has {expected} rows")]
    MarkerLength { expected: usize, actual: usize },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Result type for aggregation.
pub type Result<T> = std::result::Result<T, StatisticsError>;

/// Aggregation method applied to one column within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatMethod {
    Mean,
    /// Sample standard deviation (n - 1 denominator)
    Std,
    Max,
    Min,
    First,
    Last,
    /// `max - min`
    Range,
    /// Mean of successive differences within the group
    Diff,
    Count,
    /// Distinct values joined into one string
    Unique,
}

impl StatMethod {
    /// Tag used in configuration and as the output column suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            StatMethod::Mean => "mean",
            StatMethod::Std => "std",
            StatMethod::Max => "max",
            StatMethod::Min => "min",
            StatMethod::First => "first",
            StatMethod::Last => "last",
            StatMethod::Range => "range",
            StatMethod::Diff => "diff",
            StatMethod::Count => "count",
            StatMethod::Unique => "unique",
        }
    }
}

impl FromStr for StatMethod {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "mean" => Ok(StatMethod::Mean),
            "std" => Ok(StatMethod::Std),
            "max" => Ok(StatMethod::Max),
            "min" => Ok(StatMethod::Min),
            "first" => Ok(StatMethod::First),
            "last" => Ok(StatMethod::Last),
            "range" => Ok(StatMethod::Range),
            "diff" => Ok(StatMethod::Diff),
            "count" => Ok(StatMethod::Count),
            "unique" | "unique_values" => Ok(StatMethod::Unique),
            other => Err(StatisticsError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for StatMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping of column name to the methods computed for it.
///
/// Insertion order is kept so output columns come out in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsSpec {
    entries: Vec<(String, Vec<StatMethod>)>,
}

impl StatisticsSpec {
    /// An empty spec.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder form of [`insert`](Self::insert) for several methods.
    pub fn with(mut self, column: &str, methods: &[StatMethod]) -> Self {
        for &method in methods {
            self.insert(column, method);
        }
        self
    }

    /// Request `method` for `column`. Repeated requests are ignored.
    pub fn insert(&mut self, column: &str, method: StatMethod) {
        match self.entries.iter_mut().find(|(name, _)| name == column) {
            Some((_, methods)) => {
                if !methods.contains(&method) {
                    methods.push(method);
                }
            }
            None => self.entries.push((column.to_string(), vec![method])),
        }
    }

    /// Parse textual method names for `column`.
    pub fn insert_named(&mut self, column: &str, methods: &[&str]) -> Result<()> {
        for name in methods {
            self.insert(column, name.parse()?);
        }
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[StatMethod])> {
        self.entries
            .iter()
            .map(|(name, methods)| (name.as_str(), methods.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StatisticsSpec {
    /// Current, duration, voltage and temperature summary.
    fn default() -> Self {
        StatisticsSpec::new()
            .with("I", &[StatMethod::Mean, StatMethod::Std])
            .with("Time", &[StatMethod::Max, StatMethod::Diff])
            .with("E", &[StatMethod::Mean])
            .with("T", &[StatMethod::Min, StatMethod::Max])
    }
}

impl Serialize for StatisticsSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, methods) in &self.entries {
            if let [single] = methods.as_slice() {
                map.serialize_entry(column, single.as_str())?;
            } else {
                let names: Vec<&str> = methods.iter().map(|m| m.as_str()).collect();
                map.serialize_entry(column, &names)?;
            }
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMethods {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for StatisticsSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = StatisticsSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of column name to a method or list of methods")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<StatisticsSpec, A::Error> {
                let mut spec = StatisticsSpec::new();
                while let Some((column, raw)) = map.next_entry::<String, RawMethods>()? {
                    let names = match raw {
                        RawMethods::One(name) => vec![name],
                        RawMethods::Many(names) => names,
                    };
                    for name in names {
                        let method = name.parse::<StatMethod>().map_err(de::Error::custom)?;
                        spec.insert(&column, method);
                    }
                }
                Ok(spec)
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}

/// How rows are assigned to groups.
#[derive(Debug, Clone, Copy)]
pub enum GroupMarker<'a> {
    /// Group by the values of a column.
    Column(&'a str),
    /// Group by labels aligned row-for-row with the table.
    Labels(&'a [GroupKey]),
}

/// Label rows by how many times `column` has changed value so far.
///
/// The first row is labelled 1 and the label increments whenever a row's
/// value differs from the previous row's, so each run of equal values forms
/// one group even when the same value reappears later.
pub fn change_marker(table: &Table, column: &str) -> Result<Vec<GroupKey>> {
    let column = table.column(column)?;
    let mut labels = Vec::with_capacity(column.len());
    let mut label = 0_i64;
    let mut previous: Option<Value> = None;

    for row in 0..column.len() {
        let value = column.get(row);
        if previous.as_ref() != Some(&value) {
            label += 1;
        }
        labels.push(GroupKey::Int(label));
        previous = Some(value);
    }

    Ok(labels)
}

/// One row per group: keys plus one column per `(column, method)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsTable {
    key_name: String,
    keys: Vec<GroupKey>,
    table: Table,
}

impl StatisticsTable {
    /// Name of the grouping column (or `"group"` for external labels).
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Group keys in first-appearance order.
    pub fn keys(&self) -> &[GroupKey] {
        &self.keys
    }

    /// The statistics columns, one row per key.
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Numeric statistics column, e.g. `I_mean`.
    pub fn series(&self, column: &str) -> Result<&[Option<f64>]> {
        Ok(self.table.numbers(column)?)
    }

    /// Row position of `key`.
    pub fn position(&self, key: &GroupKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// Flatten into a plain table with the keys as the first column.
    pub fn to_table(&self) -> Result<Table> {
        let key_column = if self.keys.iter().all(|k| k.as_int().is_some()) {
            Column::Number(
                self.keys
                    .iter()
                    .map(|k| k.as_int().map(|v| v as f64))
                    .collect(),
            )
        } else {
            Column::Text(self.keys.iter().map(|k| Some(k.to_string())).collect())
        };

        let mut out = Table::new();
        out.push_column(self.key_name.clone(), key_column)?;
        for (name, column) in self.table.columns() {
            out.push_column(name, column.clone())?;
        }
        Ok(out)
    }
}

struct Group {
    key: GroupKey,
    rows: Vec<usize>,
}

fn collect_groups(keys: &[Option<GroupKey>]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut lookup: HashMap<GroupKey, usize> = HashMap::new();

    for (row, key) in keys.iter().enumerate() {
        let Some(key) = key else { continue };
        match lookup.get(key) {
            Some(&g) => groups[g].rows.push(row),
            None => {
                lookup.insert(key.clone(), groups.len());
                groups.push(Group {
                    key: key.clone(),
                    rows: vec![row],
                });
            }
        }
    }

    groups
}

/// Group `table` by `marker` and compute every statistic in `spec`.
///
/// The source table is not modified. Output columns are named
/// `<column>_<method>`; groups keep their first-appearance order. Rows whose
/// marker is missing belong to no group.
pub fn aggregate(table: &Table, marker: GroupMarker<'_>, spec: &StatisticsSpec) -> Result<StatisticsTable> {
    let (key_name, keys) = match marker {
        GroupMarker::Column(name) => (name.to_string(), table.column(name)?.keys()),
        GroupMarker::Labels(labels) => {
            if labels.len() != table.len() {
                return Err(StatisticsError::MarkerLength {
                    expected: table.len(),
                    actual: labels.len(),
                });
            }
            ("group".to_string(), labels.iter().cloned().map(Some).collect())
        }
    };

    let groups = collect_groups(&keys);
    let mut stats = Table::new();

    for (name, methods) in spec.entries() {
        let column = table.column(name)?;
        for &method in methods {
            let reduced = reduce(column, name, method, &groups)?;
            stats.push_column(format!("{}_{}", name, method), reduced)?;
        }
    }

    log::debug!(
        "Aggregated {} rows into {} groups by '{}' ({} statistics)",
        table.len(),
        groups.len(),
        key_name,
        stats.width()
    );

    Ok(StatisticsTable {
        key_name,
        keys: groups.into_iter().map(|g| g.key).collect(),
        table: stats,
    })
}

fn reduce(column: &Column, name: &str, method: StatMethod, groups: &[Group]) -> Result<Column> {
    let unsupported = || StatisticsError::UnsupportedColumnType {
        column: name.to_string(),
        method,
        dtype: column.dtype(),
    };

    let reduced = match (method, column) {
        (StatMethod::Count, Column::Number(v)) => Column::Number(
            groups
                .iter()
                .map(|g| Some(present(v, &g.rows).len() as f64))
                .collect(),
        ),
        (StatMethod::Count, _) => Column::Number(
            groups
                .iter()
                .map(|g| Some(g.rows.iter().filter(|&&r| !column.get(r).is_null()).count() as f64))
                .collect(),
        ),
        (StatMethod::Unique, _) => unique_joined(column, name, groups),

        (StatMethod::First | StatMethod::Last, Column::Number(v)) => {
            Column::Number(groups.iter().map(|g| pick(v, &g.rows, method)).collect())
        }
        (StatMethod::First | StatMethod::Last, Column::Text(v)) => {
            Column::Text(groups.iter().map(|g| pick(v, &g.rows, method)).collect())
        }
        (StatMethod::First | StatMethod::Last, Column::DateTime(v)) => {
            Column::DateTime(groups.iter().map(|g| pick(v, &g.rows, method)).collect())
        }

        (StatMethod::Max | StatMethod::Min, Column::Number(v)) => Column::Number(
            groups
                .iter()
                .map(|g| float_extreme(v, &g.rows, method == StatMethod::Max))
                .collect(),
        ),
        (StatMethod::Max | StatMethod::Min, Column::Text(v)) => Column::Text(
            groups
                .iter()
                .map(|g| ord_extreme(v, &g.rows, method == StatMethod::Max))
                .collect(),
        ),
        (StatMethod::Max | StatMethod::Min, Column::DateTime(v)) => Column::DateTime(
            groups
                .iter()
                .map(|g| ord_extreme(v, &g.rows, method == StatMethod::Max))
                .collect(),
        ),

        (StatMethod::Mean | StatMethod::Std, Column::Number(v)) => Column::Number(
            groups
                .iter()
                .map(|g| {
                    let values = present(v, &g.rows);
                    if method == StatMethod::Mean {
                        mean(&values)
                    } else {
                        sample_std(&values)
                    }
                })
                .collect(),
        ),

        (StatMethod::Range | StatMethod::Diff, Column::Number(v)) => {
            numeric_spread(v, name, method, groups)
        }
        (StatMethod::Range | StatMethod::Diff, Column::DateTime(v)) => {
            let seconds: Vec<Option<f64>> = v
                .iter()
                .map(|dt| dt.map(|dt| dt.and_utc().timestamp_micros() as f64 / 1e6))
                .collect();
            numeric_spread(&seconds, name, method, groups)
        }

        _ => return Err(unsupported()),
    };

    Ok(reduced)
}

fn present(values: &[Option<f64>], rows: &[usize]) -> Vec<f64> {
    rows.iter().filter_map(|&r| values[r]).filter(|v| !v.is_nan()).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn pick<T: Clone>(values: &[Option<T>], rows: &[usize], method: StatMethod) -> Option<T> {
    let mut present = rows.iter().filter_map(|&r| values[r].as_ref());
    let found = if method == StatMethod::Last {
        present.last()
    } else {
        present.next()
    };
    found.cloned()
}

fn float_extreme(values: &[Option<f64>], rows: &[usize], max: bool) -> Option<f64> {
    present(values, rows).into_iter().reduce(|a, b| {
        if max {
            a.max(b)
        } else {
            a.min(b)
        }
    })
}

fn ord_extreme<T: Ord + Clone>(values: &[Option<T>], rows: &[usize], max: bool) -> Option<T> {
    let present = rows.iter().filter_map(|&r| values[r].as_ref());
    let found = if max { present.max() } else { present.min() };
    found.cloned()
}

/// `range` and `diff` over numeric (or datetime-as-seconds) values.
fn numeric_spread(values: &[Option<f64>], name: &str, method: StatMethod, groups: &[Group]) -> Column {
    if method == StatMethod::Range {
        return Column::Number(
            groups
                .iter()
                .map(|g| {
                    let max = float_extreme(values, &g.rows, true)?;
                    let min = float_extreme(values, &g.rows, false)?;
                    Some(max - min)
                })
                .collect(),
        );
    }

    let mut undefined: Vec<&GroupKey> = Vec::new();
    let out = groups
        .iter()
        .map(|g| {
            let diffs: Vec<f64> = g
                .rows
                .windows(2)
                .filter_map(|pair| match (values[pair[0]], values[pair[1]]) {
                    (Some(a), Some(b)) => Some(b - a),
                    _ => None,
                })
                .filter(|d| !d.is_nan())
                .collect();
            let result = mean(&diffs);
            if result.is_none() {
                undefined.push(&g.key);
            }
            result
        })
        .collect();

    if !undefined.is_empty() {
        let preview: Vec<String> = undefined.iter().take(5).map(|k| k.to_string()).collect();
        log::warn!(
            "'{}_diff' is undefined for {} group(s) with fewer than two values (e.g. {})",
            name,
            undefined.len(),
            preview.join(", ")
        );
    }

    Column::Number(out)
}

fn unique_joined(column: &Column, name: &str, groups: &[Group]) -> Column {
    let mut worst: Option<(&GroupKey, usize)> = None;

    let joined = groups
        .iter()
        .map(|g| {
            let mut seen = HashSet::new();
            let mut distinct = Vec::new();
            for &row in &g.rows {
                let value = column.get(row);
                if value.is_null() {
                    continue;
                }
                let text = value.to_string();
                if seen.insert(text.clone()) {
                    distinct.push(text);
                }
            }
            if distinct.len() > UNIQUE_WARN_THRESHOLD
                && worst.map_or(true, |(_, n)| distinct.len() > n)
            {
                worst = Some((&g.key, distinct.len()));
            }
            if distinct.is_empty() {
                None
            } else {
                Some(distinct.join(UNIQUE_SEPARATOR))
            }
        })
        .collect();

    if let Some((key, count)) = worst {
        log::warn!(
            "'{}_unique': group {} has {} distinct values (more than {}); '{}' does not look categorical",
            name,
            key,
            count,
            UNIQUE_WARN_THRESHOLD,
            name
        );
    }

    Column::Text(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> Column {
        Column::Number(values.iter().copied().map(Some).collect())
    }

    fn step_table() -> Table {
        Table::from_columns([
            ("Step", numbers(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0])),
            ("I", numbers(&[0.0, 0.0, -1.0, -1.0, 1.0, 1.0])),
            ("Time", numbers(&[0.0, 5.0, 0.0, 2.0, 0.0, 3.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_one_row_per_group() {
        let spec = StatisticsSpec::new().with("I", &[StatMethod::Mean]);
        let stats = aggregate(&step_table(), GroupMarker::Column("Step"), &spec).unwrap();

        assert_eq!(stats.len(), 3);
        assert_eq!(stats.keys(), &[GroupKey::Int(1), GroupKey::Int(2), GroupKey::Int(3)]);
        assert_eq!(stats.series("I_mean").unwrap(), &[Some(0.0), Some(-1.0), Some(1.0)]);
    }

    #[test]
    fn test_first_appearance_order() {
        let table = Table::from_columns([
            ("Step", numbers(&[5.0, 5.0, 2.0, 9.0, 2.0])),
            ("I", numbers(&[1.0, 1.0, 2.0, 3.0, 2.0])),
        ])
        .unwrap();
        let spec = StatisticsSpec::new().with("I", &[StatMethod::Count]);
        let stats = aggregate(&table, GroupMarker::Column("Step"), &spec).unwrap();

        assert_eq!(stats.keys(), &[GroupKey::Int(5), GroupKey::Int(2), GroupKey::Int(9)]);
        assert_eq!(stats.series("I_count").unwrap(), &[Some(2.0), Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_count_skips_nan_like_mean() {
        let table = Table::from_columns([
            ("Step", numbers(&[1.0, 1.0, 1.0, 2.0])),
            ("E", Column::Number(vec![Some(3.0), Some(f64::NAN), None, Some(f64::NAN)])),
        ])
        .unwrap();
        let spec = StatisticsSpec::new().with("E", &[StatMethod::Count, StatMethod::Mean]);
        let stats = aggregate(&table, GroupMarker::Column("Step"), &spec).unwrap();

        assert_eq!(stats.series("E_count").unwrap(), &[Some(1.0), Some(0.0)]);
        assert_eq!(stats.series("E_mean").unwrap(), &[Some(3.0), None]);
    }

    #[test]
    fn test_diff_is_mean_of_successive_differences() {
        let table = Table::from_columns([
            ("Step", numbers(&[1.0, 1.0, 1.0, 2.0])),
            ("Time", numbers(&[1.0, 3.0, 6.0, 10.0])),
        ])
        .unwrap();
        let spec = StatisticsSpec::new().with("Time", &[StatMethod::Diff, StatMethod::Range]);
        let stats = aggregate(&table, GroupMarker::Column("Step"), &spec).unwrap();

        assert_eq!(stats.series("Time_diff").unwrap(), &[Some(2.0), None]);
        assert_eq!(stats.series("Time_range").unwrap(), &[Some(5.0), Some(0.0)]);
    }

    #[test]
    fn test_std_min_max_first_last() {
        let spec = StatisticsSpec::new()
            .with("Time", &[StatMethod::Std, StatMethod::Min, StatMethod::Max])
            .with("Time", &[StatMethod::First, StatMethod::Last]);
        let stats = aggregate(&step_table(), GroupMarker::Column("Step"), &spec).unwrap();

        let std = stats.series("Time_std").unwrap();
        assert!((std[0].unwrap() - 12.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.series("Time_min").unwrap(), &[Some(0.0), Some(0.0), Some(0.0)]);
        assert_eq!(stats.series("Time_max").unwrap(), &[Some(5.0), Some(2.0), Some(3.0)]);
        assert_eq!(stats.series("Time_first").unwrap(), &[Some(0.0), Some(0.0), Some(0.0)]);
        assert_eq!(stats.series("Time_last").unwrap(), &[Some(5.0), Some(2.0), Some(3.0)]);
        assert_eq!(
            stats.table().column_names(),
            &["Time_std", "Time_min", "Time_max", "Time_first", "Time_last"]
        );
    }

    #[test]
    fn test_unique_joins_distinct_values() {
        let table = Table::from_columns([
            ("Step", numbers(&[1.0, 1.0, 1.0, 2.0])),
            (
                "Mode",
                Column::Text(vec![
                    Some("CC_Chg".into()),
                    Some("CV_Chg".into()),
                    Some("CC_Chg".into()),
                    Some("Rest".into()),
                ]),
            ),
        ])
        .unwrap();
        let spec = StatisticsSpec::new().with("Mode", &[StatMethod::Unique]);
        let stats = aggregate(&table, GroupMarker::Column("Step"), &spec).unwrap();

        assert_eq!(
            stats.table().value(0, "Mode_unique").unwrap(),
            Value::Text("CC_Chg, CV_Chg".into())
        );
        assert_eq!(stats.table().value(1, "Mode_unique").unwrap(), Value::Text("Rest".into()));
    }

    #[test]
    fn test_unique_high_cardinality_still_returns() {
        let n = 15;
        let table = Table::from_columns([
            ("Step", numbers(&vec![1.0; n])),
            ("E", numbers(&(0..n).map(|i| i as f64).collect::<Vec<_>>())),
        ])
        .unwrap();
        let spec = StatisticsSpec::new().with("E", &[StatMethod::Unique]);
        let stats = aggregate(&table, GroupMarker::Column("Step"), &spec).unwrap();

        let Value::Text(joined) = stats.table().value(0, "E_unique").unwrap() else {
            panic!("expected text");
        };
        assert_eq!(joined.split(UNIQUE_SEPARATOR).count(), n);
    }

    #[test]
    fn test_unsupported_method_name() {
        let err = "median".parse::<StatMethod>().unwrap_err();
        assert!(matches!(err, StatisticsError::UnsupportedMethod(ref m) if m == "median"));

        let mut spec = StatisticsSpec::new();
        assert!(spec.insert_named("I", &["mean", "mode"]).is_err());
    }

    #[test]
    fn test_mean_on_text_column_fails() {
        let table = Table::from_columns([
            ("Step", numbers(&[1.0])),
            ("Mode", Column::Text(vec![Some("Rest".into())])),
        ])
        .unwrap();
        let spec = StatisticsSpec::new().with("Mode", &[StatMethod::Mean]);
        let err = aggregate(&table, GroupMarker::Column("Step"), &spec).unwrap_err();
        assert!(matches!(err, StatisticsError::UnsupportedColumnType { .. }));
    }

    #[test]
    fn test_missing_column_fails() {
        let spec = StatisticsSpec::new().with("Q", &[StatMethod::Max]);
        let err = aggregate(&step_table(), GroupMarker::Column("Step"), &spec).unwrap_err();
        assert!(matches!(err, StatisticsError::Table(TableError::MissingColumn(_))));
    }

    #[test]
    fn test_source_table_untouched() {
        let table = step_table();
        let before = table.clone();
        let _ = aggregate(&table, GroupMarker::Column("Step"), &StatisticsSpec::new().with("I", &[StatMethod::Mean]));
        assert_eq!(table, before);
    }

    #[test]
    fn test_change_marker_groups_runs() {
        let table = Table::from_columns([(
            "Step Type",
            Column::Text(
                ["Rest", "Rest", "CC DChg", "Rest", "Rest"]
                    .iter()
                    .map(|s| Some(s.to_string()))
                    .collect(),
            ),
        )])
        .unwrap();
        let labels = change_marker(&table, "Step Type").unwrap();
        let labels: Vec<i64> = labels.iter().filter_map(GroupKey::as_int).collect();
        assert_eq!(labels, vec![1, 1, 2, 3, 3]);
    }

    #[test]
    fn test_label_marker_length_checked() {
        let labels = vec![GroupKey::Int(1)];
        let err = aggregate(
            &step_table(),
            GroupMarker::Labels(&labels),
            &StatisticsSpec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, StatisticsError::MarkerLength { expected: 6, actual: 1 }));
    }

    #[test]
    fn test_label_marker_groups() {
        let table = step_table();
        let labels = change_marker(&table, "I").unwrap();
        let spec = StatisticsSpec::new().with("Time", &[StatMethod::Max]);
        let stats = aggregate(&table, GroupMarker::Labels(&labels), &spec).unwrap();

        assert_eq!(stats.key_name(), "group");
        assert_eq!(stats.series("Time_max").unwrap(), &[Some(5.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_to_table_prepends_keys() {
        let spec = StatisticsSpec::new().with("I", &[StatMethod::Mean]);
        let stats = aggregate(&step_table(), GroupMarker::Column("Step"), &spec).unwrap();
        let flat = stats.to_table().unwrap();

        assert_eq!(flat.column_names(), &["Step", "I_mean"]);
        assert_eq!(flat.numbers("Step").unwrap(), &[Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_default_spec_order() {
        let spec = StatisticsSpec::default();
        let columns: Vec<&str> = spec.entries().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["I", "Time", "E", "T"]);
    }
}
