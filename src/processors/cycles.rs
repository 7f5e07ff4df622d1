//! End-to-end cycle splitting for one export file or a directory of them.
//!
//! The flow per file is: load, rename columns, normalize time, aggregate per
//! step, pick step sequences (explicit or detected), extract and stitch them,
//! then write `statistics.csv` plus one numbered file per sequence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{DetectionConfig, HealthConfig, PipelineConfig, StatisticsConfig, TimeConfig};
use crate::core::loaders::{list_files, load_source};
use crate::core::table::{Column, GroupKey, Table};
use crate::core::transforms::{parse_time, rename_columns, renamed, RenameMap};
use crate::core::writers::{save_sequences, write_table_csv};
use crate::processors::health::state_of_health;
use crate::processors::pattern::{find_windows, SignPattern};
use crate::processors::sequences::extract_sequences;
use crate::processors::statistics::{
    aggregate, change_marker, GroupMarker, StatisticsSpec, StatisticsTable,
};

/// File name of the exported statistics table.
pub const STATISTICS_FILE: &str = "statistics.csv";

/// Column added to the data when grouping by value changes.
pub const CHANGE_GROUP_COLUMN: &str = "Group";

/// Name of the state-of-health column in the exported statistics.
pub const HEALTH_COLUMN: &str = "SoH";

/// Outcome of splitting one file.
#[derive(Debug, Clone, Default)]
pub struct SplitReport {
    pub input: PathBuf,
    pub rows: usize,
    pub groups: usize,
    /// Windows found by pattern detection (0 when sequences were explicit)
    pub windows: usize,
    pub sequences: usize,
    pub statistics_file: Option<PathBuf>,
    pub written: Vec<PathBuf>,
}

/// Outcome of a directory batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: Vec<SplitReport>,
}

impl BatchReport {
    pub fn files_written(&self) -> usize {
        self.processed.iter().map(|r| r.written.len()).sum()
    }
}

/// Load one experiment and normalize its columns and time representation.
pub fn prepare_table(input: &Path, config: &PipelineConfig) -> Result<Table> {
    let loaded = load_source(input, &config.import)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let map = RenameMap::from_config(&config.rename);
    let mut table = if config.rename.in_place {
        let mut table = loaded;
        let count = rename_columns(&mut table, &map);
        log::debug!("Renamed {} column(s) in place", count);
        table
    } else {
        renamed(&loaded, &map)
    };

    let time = present_time_columns(&table, &config.time);
    parse_time(&mut table, &time)
        .with_context(|| format!("Failed to normalize time columns of {}", input.display()))?;

    log::info!("Loaded {} rows x {} columns from {}", table.len(), table.width(), input.display());
    Ok(table)
}

/// Drop configured time columns the table does not have, so that a file
/// without (say) an absolute timestamp still goes through.
fn present_time_columns(table: &Table, config: &TimeConfig) -> TimeConfig {
    let keep = |name: &Option<String>, what: &str| match name {
        Some(n) if !table.has_column(n) => {
            log::warn!("No {} column '{}'; skipping its conversion", what, n);
            None
        }
        other => other.clone(),
    };

    TimeConfig {
        time_column: keep(&config.time_column, "duration"),
        datetime_column: keep(&config.datetime_column, "timestamp"),
        ..config.clone()
    }
}

/// Aggregate `table` per step.
///
/// When `change_column` is configured, the groups are runs of equal values of
/// that column; their labels are stored in [`CHANGE_GROUP_COLUMN`] so that the
/// same groups can be extracted afterwards. Returns the statistics and the
/// name of the column holding the group of every row.
pub fn compute_statistics(table: &mut Table, config: &StatisticsConfig) -> Result<(StatisticsTable, String)> {
    let group_column = match &config.change_column {
        Some(column) => {
            let labels = change_marker(table, column)
                .with_context(|| format!("Failed to compute change groups of '{}'", column))?;
            let cells = labels.iter().map(|k| k.as_int().map(|v| v as f64)).collect();
            if table.has_column(CHANGE_GROUP_COLUMN) {
                table.replace_column(CHANGE_GROUP_COLUMN, Column::Number(cells))?;
            } else {
                table.push_column(CHANGE_GROUP_COLUMN, Column::Number(cells))?;
            }
            CHANGE_GROUP_COLUMN.to_string()
        }
        None => config.group_column.clone(),
    };

    let spec = available_spec(table, &config.spec);
    let stats = aggregate(table, GroupMarker::Column(&group_column), &spec)
        .with_context(|| format!("Failed to aggregate by '{}'", group_column))?;
    Ok((stats, group_column))
}

/// The part of `spec` whose columns exist in `table`.
fn available_spec(table: &Table, spec: &StatisticsSpec) -> StatisticsSpec {
    let mut available = StatisticsSpec::new();
    for (column, methods) in spec.entries() {
        if !table.has_column(column) {
            log::warn!("No column '{}' to aggregate; skipping its statistics", column);
            continue;
        }
        for &method in methods {
            available.insert(column, method);
        }
    }
    available
}

/// Detect step windows with the configured sign pattern.
///
/// `None` when no pattern is configured.
pub fn detect_windows(stats: &StatisticsTable, config: &DetectionConfig) -> Result<Option<Vec<Vec<GroupKey>>>> {
    let Some(pattern) = config.pattern.as_deref() else {
        return Ok(None);
    };
    let pattern: SignPattern = pattern
        .parse()
        .with_context(|| format!("Invalid sign pattern '{}'", pattern))?;
    let series = stats
        .series(&config.column)
        .with_context(|| format!("Statistics have no numeric column '{}'", config.column))?;

    let windows = find_windows(stats.keys(), series, &pattern)?;
    log::info!(
        "Pattern '{}' on '{}' matched {} window(s)",
        pattern,
        config.column,
        windows.len()
    );
    Ok(Some(windows))
}

/// Statistics as written to disk, with the optional state-of-health column.
pub fn statistics_export(stats: &StatisticsTable, config: &HealthConfig) -> Result<Table> {
    let mut table = stats.to_table()?;
    let Some(column) = config.column.as_deref() else {
        return Ok(table);
    };

    let baseline = match config.baseline {
        Some(key) => GroupKey::Int(key),
        None => match stats.keys().first() {
            Some(key) => key.clone(),
            None => return Ok(table),
        },
    };

    let soh = state_of_health(stats, column, &baseline)
        .with_context(|| format!("Failed to compute state of health from '{}'", column))?;
    table.push_column(HEALTH_COLUMN, soh)?;
    Ok(table)
}

/// Run the whole pipeline on one file, writing into `output_dir`.
pub fn split_file(input: &Path, output_dir: &Path, config: &PipelineConfig) -> Result<SplitReport> {
    let mut table = prepare_table(input, config)?;
    let (stats, stats_group) = compute_statistics(&mut table, &config.statistics)?;

    let statistics_path = output_dir.join(STATISTICS_FILE);
    let export = statistics_export(&stats, &config.health)?;
    let mut stats_config = config.export.clone();
    stats_config.include_index = false;
    stats_config.columns = None;
    write_table_csv(&statistics_path, &export, &stats_config)
        .with_context(|| format!("Failed to write {}", statistics_path.display()))?;

    let detected = detect_windows(&stats, &config.detection)?;
    let windows = detected.as_ref().map_or(0, Vec::len);

    let (sequences, group_column): (Vec<Vec<GroupKey>>, String) = match (&config.extraction.sequences, detected) {
        (Some(explicit), _) => (
            explicit
                .iter()
                .map(|steps| steps.iter().copied().map(GroupKey::Int).collect())
                .collect(),
            config.extraction.group_column.clone(),
        ),
        (None, Some(windows)) => (windows, stats_group),
        (None, None) => {
            log::warn!(
                "No sequences configured and no pattern to detect them in {}",
                input.display()
            );
            (Vec::new(), stats_group)
        }
    };

    let extracted = extract_sequences(
        &table,
        &sequences,
        config.extraction.time_merge,
        &group_column,
        &config.extraction.time_column,
    )
    .with_context(|| format!("Failed to extract sequences from {}", input.display()))?;

    let written = save_sequences(&extracted, output_dir, &config.export)
        .with_context(|| format!("Failed to save sequences to {}", output_dir.display()))?;

    Ok(SplitReport {
        input: input.to_path_buf(),
        rows: table.len(),
        groups: stats.len(),
        windows,
        sequences: extracted.len(),
        statistics_file: Some(statistics_path),
        written,
    })
}

/// Run [`split_file`] on every source file under `input_dir`.
///
/// Each file writes into `output_dir/<file stem>/`. The first failing file
/// aborts the batch with an error naming it; files after it are not touched.
/// `on_file` is called after each file that was split.
pub fn split_batch<F>(input_dir: &Path, output_dir: &Path, config: &PipelineConfig, mut on_file: F) -> Result<BatchReport>
where
    F: FnMut(&Path),
{
    let files = list_files(input_dir, &config.import.extensions)
        .with_context(|| format!("Failed to scan {}", input_dir.display()))?;
    log::info!("Found {} file(s) in {}", files.len(), input_dir.display());

    let mut report = BatchReport::default();
    for file in files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let destination = output_dir.join(stem);

        let split = split_file(&file, &destination, config)
            .with_context(|| format!("Failed to split {}", file.display()))?;
        report.processed.push(split);
        on_file(&file);
    }

    Ok(report)
}
