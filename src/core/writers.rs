//! Delimited-file writers for tables and extracted sequences.
//!
//! This module provides functions for persisting pipeline results:
//! - A single [`Table`] as a delimited file, optionally with its row index
//! - A list of sequence tables as `0.csv`, `1.csv`, ... in one directory

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use thiserror::Error;

use super::loaders::delimiter_byte;
use super::table::{format_number, Table, TableError, Value};
use crate::config::ExportConfig;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("unsupported output encoding '{0}' (only utf-8 is supported)")]
    UnsupportedEncoding(String),

    #[error("delimiter must be a single-byte character, got '{0}'")]
    InvalidDelimiter(char),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            ensure_dir(parent)?;
        }
    }
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
        path: dir.display().to_string(),
        source: e,
    })
}

fn check_encoding(encoding: &str) -> Result<()> {
    let normalized = encoding.trim().to_ascii_lowercase().replace(['-', '_'], "");
    if normalized == "utf8" {
        Ok(())
    } else {
        Err(WriteError::UnsupportedEncoding(encoding.to_string()))
    }
}

/// Render one cell the way it is written to disk.
///
/// Missing values become empty fields. Numbers use `float_precision` decimals
/// when set, and the shortest exact form otherwise.
pub fn format_cell(value: &Value, config: &ExportConfig) -> String {
    match value {
        Value::Null => String::new(),
        Value::Number(v) => match config.float_precision {
            Some(precision) if v.is_finite() => format!("{:.*}", precision, v),
            _ => format_number(*v),
        },
        Value::Text(s) => s.clone(),
        Value::DateTime(dt) => dt.format(&config.datetime_format).to_string(),
    }
}

/// Write a table to a delimited file.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `table` - Table to write
/// * `config` - Header, index column, column subset, delimiter and number
///   formatting options
///
/// # Errors
///
/// Returns an error if:
/// - The encoding or delimiter is not supported
/// - A requested column does not exist
/// - Parent directories cannot be created
/// - File cannot be created or written to
///
/// # Example
///
/// ```no_run
/// use cycler_pipeline::config::ExportConfig;
/// use cycler_pipeline::core::table::Table;
/// use cycler_pipeline::core::writers::write_table_csv;
/// use std::path::Path;
///
/// let table = Table::new();
/// write_table_csv(Path::new("output.csv"), &table, &ExportConfig::default()).unwrap();
/// ```
pub fn write_table_csv(path: &Path, table: &Table, config: &ExportConfig) -> Result<()> {
    check_encoding(&config.encoding)?;
    let delimiter = delimiter_byte(config.delimiter).ok_or(WriteError::InvalidDelimiter(config.delimiter))?;

    let table = match &config.columns {
        Some(columns) => table.select(columns)?,
        None => table.clone(),
    };

    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let buf_writer = BufWriter::new(file);
    let mut csv_writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(buf_writer);

    let path_str = path.display().to_string();

    if config.include_header {
        let mut header: Vec<&str> = Vec::with_capacity(table.width() + 1);
        if config.include_index {
            header.push(&config.index_label);
        }
        header.extend(table.column_names().iter().map(String::as_str));
        csv_writer
            .write_record(&header)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    let mut record: Vec<String> = Vec::with_capacity(table.width() + 1);
    for (row, label) in table.index().iter().enumerate() {
        record.clear();
        if config.include_index {
            record.push(label.to_string());
        }
        record.extend(table.columns().map(|(_, column)| format_cell(&column.get(row), config)));
        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write each sequence table to `<directory>/<i>.csv`, `i` counting from 0.
///
/// The directory is created if missing; existing files of the same name are
/// overwritten. Returns the written paths in order.
pub fn save_sequences(tables: &[Table], directory: &Path, config: &ExportConfig) -> Result<Vec<PathBuf>> {
    ensure_dir(directory)?;

    let mut written = Vec::with_capacity(tables.len());
    for (i, table) in tables.iter().enumerate() {
        let path = directory.join(format!("{}.csv", i));
        write_table_csv(&path, table, config)?;
        log::debug!("Wrote sequence {} ({} rows) to {}", i, table.len(), path.display());
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::load_table_csv;
    use crate::core::table::Column;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn create_test_table() -> Table {
        let mut table = Table::from_columns([
            ("Time", Column::Number(vec![Some(0.0), Some(1.5), None])),
            (
                "Mode",
                Column::Text(vec![Some("Rest".into()), Some("CC Chg".into()), None]),
            ),
        ])
        .unwrap();
        table.set_index(vec![4, 5, 6]).unwrap();
        table
    }

    #[test]
    fn test_write_table_with_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");

        write_table_csv(&path, &create_test_table(), &ExportConfig::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["Index,Time,Mode", "4,0,Rest", "5,1.5,CC Chg", "6,,"]);
    }

    #[test]
    fn test_write_table_options() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.tsv");
        let config = ExportConfig {
            include_index: false,
            include_header: false,
            columns: Some(vec!["Time".to_string()]),
            delimiter: '\t',
            float_precision: Some(2),
            ..ExportConfig::default()
        };

        write_table_csv(&path, &create_test_table(), &config).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[..2], ["0.00", "1.50"]);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_datetime_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dt.csv");
        let dt = NaiveDate::from_ymd_opt(2023, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let table = Table::from_columns([("Datetime", Column::DateTime(vec![Some(dt)]))]).unwrap();
        let config = ExportConfig {
            include_index: false,
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
            ..ExportConfig::default()
        };

        write_table_csv(&path, &table, &config).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().nth(1), Some("2023-05-01 12:30:00"));
    }

    #[test]
    fn test_unsupported_encoding() {
        let dir = tempdir().unwrap();
        let config = ExportConfig {
            encoding: "latin-1".to_string(),
            ..ExportConfig::default()
        };
        let err = write_table_csv(&dir.path().join("x.csv"), &create_test_table(), &config).unwrap_err();
        assert!(matches!(err, WriteError::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_missing_export_column() {
        let dir = tempdir().unwrap();
        let config = ExportConfig {
            columns: Some(vec!["Voltage".to_string()]),
            ..ExportConfig::default()
        };
        let err = write_table_csv(&dir.path().join("x.csv"), &create_test_table(), &config).unwrap_err();
        assert!(matches!(err, WriteError::Table(TableError::MissingColumn(_))));
    }

    #[test]
    fn test_save_sequences_creates_numbered_files() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("sequences");
        let tables = vec![create_test_table(), create_test_table().slice(0, 1)];

        let written = save_sequences(&tables, &out, &ExportConfig::default()).unwrap();

        assert_eq!(written, vec![out.join("0.csv"), out.join("1.csv")]);
        let reloaded = load_table_csv(&written[1], ',', Some("Index")).unwrap();
        assert_eq!(reloaded.index(), &[4]);
        assert_eq!(reloaded.numbers("Time").unwrap(), &[Some(0.0)]);
    }

    #[test]
    fn test_save_no_sequences() {
        let dir = tempdir().unwrap();
        let written = save_sequences(&[], dir.path(), &ExportConfig::default()).unwrap();
        assert!(written.is_empty());
    }
}
