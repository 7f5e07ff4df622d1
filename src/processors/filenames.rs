//! Metadata extraction from file names.
//!
//! Cycler exports usually encode the experiment in the file name (cell id,
//! channel, temperature, ...). A regular expression with capture groups pulls
//! those fields out into a [`Table`] with one row per match and the source
//! name in a trailing `Path` column.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use thiserror::Error;

use crate::core::loaders::infer_column;
use crate::core::table::{Column, Table, TableError};

/// Name of the column holding the parsed string.
pub const PATH_COLUMN: &str = "Path";

/// Errors that can occur while parsing file names.
#[derive(Debug, Error)]
pub enum FilenameError {
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("pattern yields {groups} field(s) but {names} column name(s) were given")]
    ColumnCount { groups: usize, names: usize },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Result type for file-name operations.
pub type Result<T> = std::result::Result<T, FilenameError>;

/// Summary of how a pattern matches a list of names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchAudit {
    /// Matches over all names
    pub total: usize,
    /// Distinct matched texts
    pub unique: BTreeSet<String>,
    /// Names that did not match exactly once, with their match count
    pub irregular: Vec<(String, usize)>,
}

impl MatchAudit {
    /// Every name matched exactly once.
    pub fn is_clean(&self) -> bool {
        self.irregular.is_empty()
    }
}

/// File name of `path` as text, falling back to the whole path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .to_string()
}

/// Count the matches of `pattern` in every name.
///
/// A name that does not match exactly once is logged as a warning and listed
/// in [`MatchAudit::irregular`]; useful when tuning a pattern against a whole
/// directory.
pub fn audit_matches<S: AsRef<str>>(pattern: &str, names: &[S]) -> Result<MatchAudit> {
    let regex = Regex::new(pattern)?;
    let mut audit = MatchAudit::default();

    for name in names {
        let name = name.as_ref();
        let found: Vec<&str> = regex.find_iter(name).map(|m| m.as_str()).collect();
        if found.len() != 1 {
            log::warn!("Pattern '{}' found {} match(es) in '{}'", pattern, found.len(), name);
            audit.irregular.push((name.to_string(), found.len()));
        }
        audit.total += found.len();
        audit.unique.extend(found.into_iter().map(str::to_string));
    }

    Ok(audit)
}

/// Parse every name with `pattern` into a table.
///
/// Each match becomes a row holding its capture groups (or the whole match
/// when the pattern has no groups) under `columns`, followed by the source
/// name under `Path`. Fields that look numeric become number columns.
pub fn parse_names<S: AsRef<str>>(pattern: &str, names: &[S], columns: &[&str]) -> Result<Table> {
    let regex = Regex::new(pattern)?;
    let groups = (regex.captures_len() - 1).max(1);
    if columns.len() != groups {
        return Err(FilenameError::ColumnCount {
            groups,
            names: columns.len(),
        });
    }

    let mut fields: Vec<Vec<Option<String>>> = vec![Vec::new(); groups];
    let mut paths: Vec<Option<String>> = Vec::new();

    for name in names {
        let name = name.as_ref();
        let mut matched = 0;
        for captures in regex.captures_iter(name) {
            matched += 1;
            for (i, field) in fields.iter_mut().enumerate() {
                // group 0 is the whole match, used only for group-less patterns
                let group = if regex.captures_len() == 1 { 0 } else { i + 1 };
                field.push(captures.get(group).map(|m| m.as_str().to_string()));
            }
            paths.push(Some(name.to_string()));
        }
        if matched != 1 {
            log::warn!("Pattern '{}' found {} match(es) in '{}'", pattern, matched, name);
        }
    }

    let mut table = Table::new();
    for (column, cells) in columns.iter().zip(fields) {
        table.push_column(*column, infer_column(cells))?;
    }
    table.push_column(PATH_COLUMN, Column::Text(paths))?;

    Ok(table)
}
