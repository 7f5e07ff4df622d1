//! In-memory tabular data model.
//!
//! A [`Table`] is an ordered set of named, homogeneously typed columns plus a
//! row index recording where each row originally came from. Row order is
//! significant (it is the record/time order of the cycler export) and every
//! operation here preserves it.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Format used when rendering datetime cells as text.
pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Errors raised by table manipulation.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("column not found: {0}")]
    MissingColumn(String),

    #[error("column '{column}' holds {actual} values, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("column '{column}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("cannot concatenate tables: {0}")]
    SchemaMismatch(String),
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Numeric view of the cell, if it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(v) => write!(f, "{}", format_number(*v)),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_DISPLAY_FORMAT)),
        }
    }
}

/// Render a float the way the exporters do: integral values without a
/// fractional part, everything else with Rust's shortest round-trip form.
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Label identifying a group of rows (typically a step number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Int(i64),
    Text(String),
}

impl GroupKey {
    /// Derive a key from a cell. Null cells have no key.
    ///
    /// Integral numbers become [`GroupKey::Int`]; any other number is keyed by
    /// its textual rendering so that float keys still compare by equality.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(v) => {
                if v.is_nan() {
                    None
                } else if v.fract() == 0.0 && v.abs() < 9.0e15 {
                    Some(GroupKey::Int(*v as i64))
                } else {
                    Some(GroupKey::Text(v.to_string()))
                }
            }
            Value::Text(s) => Some(GroupKey::Text(s.clone())),
            Value::DateTime(dt) => Some(GroupKey::Text(
                dt.format(DATETIME_DISPLAY_FORMAT).to_string(),
            )),
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            GroupKey::Int(v) => Some(*v),
            GroupKey::Text(_) => None,
        }
    }

    /// Cell value equivalent of this key.
    pub fn to_value(&self) -> Value {
        match self {
            GroupKey::Int(v) => Value::Number(*v as f64),
            GroupKey::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl From<i64> for GroupKey {
    fn from(v: i64) -> Self {
        GroupKey::Int(v)
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        GroupKey::Text(s.to_string())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Int(v) => write!(f, "{}", v),
            GroupKey::Text(s) => f.write_str(s),
        }
    }
}

/// A homogeneously typed column. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Number(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    DateTime(Vec<Option<NaiveDateTime>>),
}

impl Column {
    /// Number of cells in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Number(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::DateTime(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the column type, used in diagnostics.
    pub fn dtype(&self) -> &'static str {
        match self {
            Column::Number(_) => "number",
            Column::Text(_) => "text",
            Column::DateTime(_) => "datetime",
        }
    }

    /// Cell at `row` as a [`Value`].
    pub fn get(&self, row: usize) -> Value {
        match self {
            Column::Number(v) => v
                .get(row)
                .copied()
                .flatten()
                .map_or(Value::Null, Value::Number),
            Column::Text(v) => v
                .get(row)
                .cloned()
                .flatten()
                .map_or(Value::Null, Value::Text),
            Column::DateTime(v) => v
                .get(row)
                .copied()
                .flatten()
                .map_or(Value::Null, Value::DateTime),
        }
    }

    /// Whether every cell is missing.
    pub fn is_all_null(&self) -> bool {
        match self {
            Column::Number(v) => v.iter().all(Option::is_none),
            Column::Text(v) => v.iter().all(Option::is_none),
            Column::DateTime(v) => v.iter().all(Option::is_none),
        }
    }

    /// A column of the same type as `self` holding `n` missing cells.
    pub fn nulls_like(&self, n: usize) -> Column {
        match self {
            Column::Number(_) => Column::Number(vec![None; n]),
            Column::Text(_) => Column::Text(vec![None; n]),
            Column::DateTime(_) => Column::DateTime(vec![None; n]),
        }
    }

    /// Append `n` missing cells.
    pub fn push_nulls(&mut self, n: usize) {
        match self {
            Column::Number(v) => v.extend(std::iter::repeat(None).take(n)),
            Column::Text(v) => v.extend(std::iter::repeat(None).take(n)),
            Column::DateTime(v) => v.extend(std::iter::repeat(None).take(n)),
        }
    }

    /// Gather the cells at `positions`, in that order.
    pub fn take(&self, positions: &[usize]) -> Column {
        match self {
            Column::Number(v) => Column::Number(positions.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(positions.iter().map(|&i| v[i].clone()).collect()),
            Column::DateTime(v) => Column::DateTime(positions.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Append the cells of `other`.
    ///
    /// A column that is entirely missing adopts the type of the other side, so
    /// sheets whose optional columns happened to be empty still concatenate.
    /// Returns `false` when the types are incompatible.
    pub fn extend_from(&mut self, other: &Column) -> bool {
        match (&mut *self, other) {
            (Column::Number(a), Column::Number(b)) => {
                a.extend_from_slice(b);
                return true;
            }
            (Column::Text(a), Column::Text(b)) => {
                a.extend_from_slice(b);
                return true;
            }
            (Column::DateTime(a), Column::DateTime(b)) => {
                a.extend_from_slice(b);
                return true;
            }
            _ => {}
        }

        if other.is_all_null() {
            self.push_nulls(other.len());
            true
        } else if self.is_all_null() {
            let mut widened = other.nulls_like(self.len());
            widened.extend_from(other);
            *self = widened;
            true
        } else {
            false
        }
    }

    /// Numeric cells, if this is a number column.
    pub fn as_numbers(&self) -> Option<&[Option<f64>]> {
        match self {
            Column::Number(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_numbers_mut(&mut self) -> Option<&mut Vec<Option<f64>>> {
        match self {
            Column::Number(v) => Some(v),
            _ => None,
        }
    }

    /// Group key of every cell; `None` for missing cells.
    pub fn keys(&self) -> Vec<Option<GroupKey>> {
        (0..self.len())
            .map(|row| GroupKey::from_value(&self.get(row)))
            .collect()
    }
}

/// Ordered collection of named columns sharing a row index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    index: Vec<usize>,
}

impl Table {
    /// Creates an empty table with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns, assigning the index `0..n`.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        let mut table = Table::new();
        for (name, column) in columns {
            table.push_column(name, column)?;
        }
        Ok(table)
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Iterate over `(name, column)` pairs in column order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Original record position of every row.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Replace the row index.
    pub fn set_index(&mut self, index: Vec<usize>) -> Result<()> {
        if index.len() != self.len() && self.width() > 0 {
            return Err(TableError::LengthMismatch {
                column: "<index>".to_string(),
                expected: self.len(),
                actual: index.len(),
            });
        }
        self.index = index;
        Ok(())
    }

    /// Renumber rows `0..n`.
    pub fn reset_index(&mut self) {
        self.index = (0..self.len()).collect();
    }

    /// Position of the first column called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    #[inline]
    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.position(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        match self.position(name) {
            Some(i) => Ok(&mut self.columns[i]),
            None => Err(TableError::MissingColumn(name.to_string())),
        }
    }

    /// Numeric cells of `name`; fails if the column is missing or not numeric.
    pub fn numbers(&self, name: &str) -> Result<&[Option<f64>]> {
        let column = self.column(name)?;
        column.as_numbers().ok_or_else(|| TableError::TypeMismatch {
            column: name.to_string(),
            expected: "number",
            actual: column.dtype(),
        })
    }

    pub fn numbers_mut(&mut self, name: &str) -> Result<&mut Vec<Option<f64>>> {
        let column = self.column_mut(name)?;
        let actual = column.dtype();
        column
            .as_numbers_mut()
            .ok_or_else(|| TableError::TypeMismatch {
                column: name.to_string(),
                expected: "number",
                actual,
            })
    }

    /// Cell at (`row`, `name`).
    pub fn value(&self, row: usize, name: &str) -> Result<Value> {
        Ok(self.column(name)?.get(row))
    }

    /// Append a column. The first column of an empty table fixes the row
    /// count and the index `0..n`.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.width() == 0 {
            self.index = (0..column.len()).collect();
        } else if column.len() != self.len() {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.len(),
                actual: column.len(),
            });
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Replace the contents of an existing column.
    pub fn replace_column(&mut self, name: &str, column: Column) -> Result<()> {
        if column.len() != self.len() {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.len(),
                actual: column.len(),
            });
        }
        *self.column_mut(name)? = column;
        Ok(())
    }

    /// Remove a column and return its cells. The row index is kept.
    pub fn remove_column(&mut self, name: &str) -> Result<Column> {
        let position = self
            .position(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        self.names.remove(position);
        Ok(self.columns.remove(position))
    }

    /// Rename the column at `position`.
    pub fn rename_at(&mut self, position: usize, name: impl Into<String>) {
        if let Some(slot) = self.names.get_mut(position) {
            *slot = name.into();
        }
    }

    /// Rows at `positions`, in that order, keeping their index labels.
    pub fn take_rows(&self, positions: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(positions)).collect(),
            index: positions.iter().map(|&i| self.index[i]).collect(),
        }
    }

    /// Rows in `start..end` (clamped to the table length).
    pub fn slice(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.len());
        let start = start.min(end);
        let positions: Vec<usize> = (start..end).collect();
        self.take_rows(&positions)
    }

    /// Sub-table with only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let mut names_out = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            columns.push(self.column(name)?.clone());
            names_out.push(name.to_string());
        }
        Ok(Table {
            names: names_out,
            columns,
            index: self.index.clone(),
        })
    }

    /// Stack tables vertically, keeping each row's index label.
    ///
    /// Columns are matched by name; every table must carry the same column
    /// set with compatible types.
    pub fn concat(tables: &[Table]) -> Result<Table> {
        let Some(first) = tables.first() else {
            return Ok(Table::new());
        };

        let mut out = first.clone();
        for table in &tables[1..] {
            if table.width() != out.width() {
                return Err(TableError::SchemaMismatch(format!(
                    "expected {} columns, found {}",
                    out.width(),
                    table.width()
                )));
            }

            let positions: HashMap<&str, usize> = table
                .names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.as_str(), i))
                .collect();

            for (name, column) in out.names.iter().zip(out.columns.iter_mut()) {
                let other = positions
                    .get(name.as_str())
                    .map(|&i| &table.columns[i])
                    .ok_or_else(|| {
                        TableError::SchemaMismatch(format!("column '{}' missing", name))
                    })?;
                if !column.extend_from(other) {
                    return Err(TableError::SchemaMismatch(format!(
                        "column '{}' is {} in one table and {} in another",
                        name,
                        column.dtype(),
                        other.dtype()
                    )));
                }
            }
            out.index.extend_from_slice(&table.index);
        }
        Ok(out)
    }

    /// Join `other`'s columns alongside this table's by row position.
    ///
    /// The shorter side is padded with missing cells; the index of the longer
    /// side is kept.
    pub fn hstack(mut self, other: &Table) -> Table {
        let rows = self.len().max(other.len());

        if other.len() > self.len() {
            let pad = other.len() - self.len();
            for column in &mut self.columns {
                column.push_nulls(pad);
            }
            self.index = other.index.clone();
        }

        for (name, column) in other.columns() {
            let mut column = column.clone();
            column.push_nulls(rows - column.len());
            self.names.push(name.to_string());
            self.columns.push(column);
        }

        if self.index.len() != rows {
            self.index = (0..rows).collect();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns([
            ("Step", Column::Number(vec![Some(1.0), Some(1.0), Some(2.0)])),
            (
                "Mode",
                Column::Text(vec![
                    Some("Rest".to_string()),
                    Some("Rest".to_string()),
                    Some("CC_DChg".to_string()),
                ]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_assigns_index() {
        let table = sample();
        assert_eq!(table.len(), 3);
        assert_eq!(table.width(), 2);
        assert_eq!(table.index(), &[0, 1, 2]);
    }

    #[test]
    fn test_push_column_length_mismatch() {
        let mut table = sample();
        let err = table
            .push_column("I", Column::Number(vec![Some(0.0)]))
            .unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { .. }));
    }

    #[test]
    fn test_take_rows_keeps_index_labels() {
        let table = sample();
        let picked = table.take_rows(&[2, 0]);
        assert_eq!(picked.index(), &[2, 0]);
        assert_eq!(picked.value(0, "Mode").unwrap(), Value::Text("CC_DChg".into()));
    }

    #[test]
    fn test_concat_matches_columns_by_name() {
        let a = sample();
        let b = Table::from_columns([
            ("Mode", Column::Text(vec![Some("Rest".to_string())])),
            ("Step", Column::Number(vec![Some(3.0)])),
        ])
        .unwrap();

        let joined = Table::concat(&[a, b]).unwrap();
        assert_eq!(joined.len(), 4);
        assert_eq!(joined.numbers("Step").unwrap()[3], Some(3.0));
        assert_eq!(joined.index(), &[0, 1, 2, 0]);
    }

    #[test]
    fn test_concat_widens_all_null_column() {
        let a = Table::from_columns([("T", Column::Number(vec![None, None]))]).unwrap();
        let b = Table::from_columns([("T", Column::Text(vec![Some("25".to_string())]))]).unwrap();

        let joined = Table::concat(&[a, b]).unwrap();
        assert_eq!(joined.column("T").unwrap().dtype(), "text");
        assert_eq!(joined.len(), 3);
    }

    #[test]
    fn test_concat_rejects_type_conflict() {
        let a = Table::from_columns([("T", Column::Number(vec![Some(1.0)]))]).unwrap();
        let b = Table::from_columns([("T", Column::Text(vec![Some("x".to_string())]))]).unwrap();
        assert!(Table::concat(&[a, b]).is_err());
    }

    #[test]
    fn test_hstack_pads_shorter_side() {
        let a = sample();
        let b = Table::from_columns([("T", Column::Number(vec![Some(25.0)]))]).unwrap();

        let joined = a.hstack(&b);
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.numbers("T").unwrap(), &[Some(25.0), None, None]);
    }

    #[test]
    fn test_group_key_from_value() {
        assert_eq!(GroupKey::from_value(&Value::Number(3.0)), Some(GroupKey::Int(3)));
        assert_eq!(
            GroupKey::from_value(&Value::Number(1.5)),
            Some(GroupKey::Text("1.5".to_string()))
        );
        assert_eq!(GroupKey::from_value(&Value::Null), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.25), "-0.25");
    }
}
