//! Loaders for cycler exports.
//!
//! This module provides:
//! - Delimited text files read into a [`Table`] with per-column type inference
//! - Spreadsheet workbooks (xlsx, xls, xlsb, ods) read sheet by sheet
//! - Workbook assembly: data sheets concatenated, temperature sheets joined
//! - Recursive source file discovery by extension

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, DataType, ExcelDateTime, Reader};
use csv::ReaderBuilder;
use thiserror::Error;

use super::table::{Column, Table, TableError};
use crate::config::ImportConfig;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("No sheet name contains '{0}'")]
    MissingSheets(String),

    #[error("Delimiter must be a single-byte character, got '{0}'")]
    InvalidDelimiter(char),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Extensions read as spreadsheet workbooks rather than delimited text.
pub const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// A named sheet of a workbook.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
}

/// Convert a delimiter character into the byte the CSV reader/writer expects.
pub fn delimiter_byte(delimiter: char) -> Option<u8> {
    u8::try_from(u32::from(delimiter)).ok().filter(|b| b.is_ascii())
}

/// Build a typed column from raw cells.
///
/// The column is numeric when every present cell parses as a float, text
/// otherwise. Blank cells are missing.
pub fn infer_column(cells: Vec<Option<String>>) -> Column {
    let numeric = cells
        .iter()
        .flatten()
        .all(|cell| cell.trim().parse::<f64>().is_ok());

    if numeric {
        Column::Number(
            cells
                .iter()
                .map(|cell| cell.as_deref().and_then(|c| c.trim().parse().ok()))
                .collect(),
        )
    } else {
        Column::Text(cells)
    }
}

/// Load a delimited file with a header row into a [`Table`].
///
/// # Arguments
///
/// * `path` - Path to the file
/// * `delimiter` - Field delimiter
/// * `index_column` - Column holding saved row index labels (e.g. `Index` in
///   files written by this crate); it is consumed into the table index
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no header, or the index
/// column holds anything but non-negative integers.
pub fn load_table_csv<P: AsRef<Path>>(path: P, delimiter: char, index_column: Option<&str>) -> Result<Table> {
    let path = path.as_ref();
    let delimiter = delimiter_byte(delimiter).ok_or(LoaderError::InvalidDelimiter(delimiter))?;

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(4096); headers.len()];
    for result in reader.records() {
        let record = result?;
        for (i, column) in cells.iter_mut().enumerate() {
            let cell = record
                .get(i)
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            column.push(cell);
        }
    }

    let mut table = Table::new();
    for (name, column) in headers.into_iter().zip(cells) {
        table.push_column(name, infer_column(column))?;
    }

    if let Some(index_column) = index_column {
        if table.has_column(index_column) {
            let labels = table.remove_column(index_column)?;
            let index = index_labels(&labels, index_column)?;
            table.set_index(index)?;
        }
    }

    log::debug!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.width(),
        path.display()
    );

    Ok(table)
}

fn index_labels(column: &Column, name: &str) -> Result<Vec<usize>> {
    let values = column.as_numbers().ok_or_else(|| {
        LoaderError::ParseError(format!("index column '{}' is not numeric", name))
    })?;
    values
        .iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(x) if *x >= 0.0 && x.fract() == 0.0 => Ok(*x as usize),
            _ => Err(LoaderError::ParseError(format!(
                "row {} of index column '{}' is not a non-negative integer",
                row, name
            ))),
        })
        .collect()
}

/// Files under `directory` (recursively) whose extension is in `extensions`.
///
/// Extensions are matched case-insensitively and without the leading dot.
/// The result is sorted by file name, then by full path.
pub fn list_files<S: AsRef<str>>(directory: &Path, extensions: &[S]) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(LoaderError::DirectoryNotFound(directory.to_path_buf()));
    }

    let mut found = Vec::new();
    let mut pending = vec![directory.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if has_extension(&path, extensions) {
                found.push(path);
            }
        }
    }

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
    Ok(found)
}

fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|wanted| ext.eq_ignore_ascii_case(wanted.as_ref().trim_start_matches('.')))
        })
        .unwrap_or(false)
}

/// Read a directory of delimited files as workbook sheets, one per file.
///
/// The sheet name is the file stem. Sheets are ordered by name.
pub fn load_workbook_dir(directory: &Path, delimiter: char) -> Result<Vec<Sheet>> {
    if !directory.is_dir() {
        return Err(LoaderError::DirectoryNotFound(directory.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, &["csv", "txt", "tsv"]))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let table = load_table_csv(&path, delimiter, None)?;
            Ok(Sheet { name, table })
        })
        .collect()
}

/// Read every sheet of a spreadsheet workbook, in workbook order.
///
/// The first used row of a sheet is its header; blank header cells are named
/// `Unnamed: <position>`. A column whose cells are all calendar datetimes
/// becomes a datetime column. Every other column is inferred like a delimited
/// file, with time-of-day and duration cells rendered as `H:MM:SS.fff`.
/// Sheets without any cells are skipped.
pub fn load_workbook(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();

    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            log::debug!("Skipping empty sheet '{}' in {}", name, path.display());
            continue;
        };

        let mut cells: Vec<Vec<&Data>> = vec![Vec::new(); header.len()];
        for row in rows {
            for (column, cell) in cells.iter_mut().zip(row) {
                column.push(cell);
            }
        }

        let mut table = Table::new();
        for (i, (title, column)) in header.iter().zip(cells).enumerate() {
            let title = cell_text(title).unwrap_or_else(|| format!("Unnamed: {}", i));
            table.push_column(title, sheet_column(&column))?;
        }

        log::debug!(
            "Loaded sheet '{}': {} rows x {} columns",
            name,
            table.len(),
            table.width()
        );
        sheets.push(Sheet { name, table });
    }

    Ok(sheets)
}

fn sheet_column(cells: &[&Data]) -> Column {
    let is_date = |cell: &Data| matches!(cell, Data::DateTime(dt) if !is_clock(dt)) && cell.as_datetime().is_some();
    let dated = cells.iter().any(|cell| !cell.is_empty())
        && cells.iter().all(|cell| cell.is_empty() || is_date(*cell));

    if dated {
        Column::DateTime(cells.iter().map(|cell| cell.as_datetime()).collect())
    } else {
        infer_column(cells.iter().map(|cell| cell_text(cell)).collect())
    }
}

/// A workbook cell as the text a delimited export would hold.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            Some(s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Data::Int(v) => Some(v.to_string()),
        Data::Float(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(dt) if is_clock(dt) => cell.as_duration().map(clock_text),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    }
}

/// Durations and bare times of day (serial value below one day).
fn is_clock(dt: &ExcelDateTime) -> bool {
    dt.is_duration() || dt.as_f64() < 1.0
}

fn clock_text(duration: chrono::Duration) -> String {
    let millis = duration.num_milliseconds();
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();
    format!(
        "{}{}:{:02}:{:02}.{:03}",
        sign,
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000
    )
}

/// Concatenate the sheets whose name contains `pattern`, renumbering rows.
/// `None` when no sheet matches.
pub fn concat_sheets(sheets: &[Sheet], pattern: &str) -> Result<Option<Table>> {
    let selected: Vec<Table> = sheets
        .iter()
        .filter(|sheet| sheet.name.contains(pattern))
        .map(|sheet| sheet.table.clone())
        .collect();

    if selected.is_empty() {
        return Ok(None);
    }

    let mut table = Table::concat(&selected)?;
    table.reset_index();
    Ok(Some(table))
}

/// Use the first row as the header when every cell of it is text.
fn promote_header_row(table: Table) -> Result<Table> {
    let header_like = table.len() > 0
        && table
            .columns()
            .all(|(_, column)| matches!(column, Column::Text(cells) if cells[0].is_some()));
    if !header_like {
        return Ok(table);
    }

    let mut promoted = Table::new();
    for (_, column) in table.columns() {
        let Column::Text(cells) = column else {
            continue;
        };
        let name = cells[0].clone().unwrap_or_default();
        promoted.push_column(name, infer_column(cells[1..].to_vec()))?;
    }
    Ok(promoted)
}

/// Assemble one experiment table from workbook sheets.
///
/// All data sheets (name contains `config.data_sheet_pattern`) are stacked.
/// If temperature sheets exist they are stacked too, and their columns whose
/// name contains `config.temp_column_pattern` are joined alongside the data
/// by row position.
pub fn assemble_workbook(sheets: &[Sheet], config: &ImportConfig) -> Result<Table> {
    let data = concat_sheets(sheets, &config.data_sheet_pattern)?
        .ok_or_else(|| LoaderError::MissingSheets(config.data_sheet_pattern.clone()))?;

    let Some(temperature) = concat_sheets(sheets, &config.temp_sheet_pattern)? else {
        return Ok(data);
    };

    let temperature = promote_header_row(temperature)?;
    let wanted: Vec<String> = temperature
        .column_names()
        .iter()
        .filter(|name| name.contains(&config.temp_column_pattern))
        .cloned()
        .collect();

    if wanted.is_empty() {
        log::warn!(
            "Temperature sheets found but no column contains '{}'",
            config.temp_column_pattern
        );
        return Ok(data);
    }

    if temperature.len() != data.len() {
        log::warn!(
            "Temperature sheets have {} rows, data sheets have {}; missing cells are left empty",
            temperature.len(),
            data.len()
        );
    }

    Ok(data.hstack(&temperature.select(&wanted)?))
}

/// Load one experiment: a spreadsheet workbook, a directory of sheet files,
/// or a delimited file.
pub fn load_source(path: &Path, config: &ImportConfig) -> Result<Table> {
    if path.is_dir() {
        let sheets = load_workbook_dir(path, config.delimiter)?;
        assemble_workbook(&sheets, config)
    } else if has_extension(path, &WORKBOOK_EXTENSIONS) {
        let sheets = load_workbook(path)?;
        assemble_workbook(&sheets, config)
    } else {
        load_table_csv(path, config.delimiter, None)
    }
}
