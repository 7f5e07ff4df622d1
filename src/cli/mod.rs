//! Command-line interface for the cycler pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::loaders::list_files;
use crate::core::table::Table;
use crate::core::writers::{format_cell, write_table_csv};
use crate::processors::cycles;
use crate::processors::filenames::{self, display_name};
use crate::processors::sequences::{self, TimeMerge};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "cycler-pipeline")]
#[command(about = "Battery cycler export processing pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate one export into per-step statistics
    Stats {
        /// Export file (or directory of sheet files)
        input: PathBuf,
        /// Write the statistics here instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the step windows matching a sign pattern
    Detect {
        /// Export file (or directory of sheet files)
        input: PathBuf,
        /// Sign pattern over '0', '+', '-' (e.g. 0-0+0)
        #[arg(short, long, allow_hyphen_values = true)]
        pattern: Option<String>,
        /// Statistics column the pattern is matched against
        #[arg(long)]
        column: Option<String>,
    },

    /// Split exports into time-stitched cycle sequences
    Split {
        /// Export file, or a directory of exports with --batch
        input: PathBuf,
        /// Output directory
        output_dir: PathBuf,
        /// Sign pattern over '0', '+', '-' (e.g. 0-0+0)
        #[arg(short, long, allow_hyphen_values = true)]
        pattern: Option<String>,
        /// Time merge: gap in seconds, remove_first, remove_last or none
        #[arg(long, value_parser = parse_merge)]
        merge: Option<MergeArg>,
        /// Process every export under the input directory
        #[arg(long)]
        batch: bool,
    },

    /// Check file names in a directory against a regular expression
    Scan {
        /// Directory to scan (recursively)
        directory: PathBuf,
        /// Regular expression to test
        #[arg(long)]
        regex: String,
        /// Column names for the capture groups; prints the parsed table
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },
}

/// `--merge` value; `None` disables merging.
#[derive(Debug, Clone, Copy)]
struct MergeArg(Option<TimeMerge>);

fn parse_merge(s: &str) -> Result<MergeArg, String> {
    sequences::parse_optional(s)
        .map(MergeArg)
        .map_err(|e| e.to_string())
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a progress bar over `len` files
fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Print a table to stdout, tab separated
fn print_table(table: &Table, config: &PipelineConfig) {
    println!("{}", table.column_names().join("\t"));
    for row in 0..table.len() {
        let cells: Vec<String> = table
            .columns()
            .map(|(_, column)| format_cell(&column.get(row), &config.export))
            .collect();
        println!("{}", cells.join("\t"));
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Stats { input, output } => {
            cmd_stats(&input, output.as_deref(), &config);
        }
        Commands::Detect { input, pattern, column } => {
            cmd_detect(&input, pattern, column, config);
        }
        Commands::Split { input, output_dir, pattern, merge, batch } => {
            cmd_split(&input, &output_dir, pattern, merge, batch, config);
        }
        Commands::Scan { directory, regex, columns } => {
            cmd_scan(&directory, &regex, &columns, &config);
        }
    }
}

fn cmd_stats(input: &Path, output: Option<&Path>, config: &PipelineConfig) {
    let start = Instant::now();
    let spinner = create_spinner("Aggregating steps...");

    let result = cycles::prepare_table(input, config).and_then(|mut table| {
        let (stats, _) = cycles::compute_statistics(&mut table, &config.statistics)?;
        let export = cycles::statistics_export(&stats, &config.health)?;
        Ok((table.len(), export))
    });

    spinner.finish_and_clear();

    let (rows, export) = match result {
        Ok(r) => r,
        Err(e) => {
            error!("Aggregation failed: {:#}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            let mut export_config = config.export.clone();
            export_config.include_index = false;
            export_config.columns = None;
            if let Err(e) = write_table_csv(path, &export, &export_config) {
                error!("Failed to write statistics: {}", e);
                std::process::exit(1);
            }
        }
        None => print_table(&export, config),
    }

    print_summary(
        "Statistics Complete",
        &[
            ("Input", input.display().to_string()),
            ("Rows", rows.to_string()),
            ("Groups", export.len().to_string()),
            ("Statistics", export.width().saturating_sub(1).to_string()),
            (
                "Output",
                output.map_or("stdout".to_string(), |p| p.display().to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_detect(input: &Path, pattern: Option<String>, column: Option<String>, mut config: PipelineConfig) {
    let start = Instant::now();

    // CLI flags take precedence over the config file
    if pattern.is_some() {
        config.detection.pattern = pattern;
    }
    if let Some(column) = column {
        config.detection.column = column;
    }
    let Some(pattern) = config.detection.pattern.clone() else {
        error!("No sign pattern given (use --pattern or detection.pattern in the config)");
        std::process::exit(1);
    };

    let spinner = create_spinner("Detecting step windows...");

    let result = cycles::prepare_table(input, &config).and_then(|mut table| {
        let (stats, _) = cycles::compute_statistics(&mut table, &config.statistics)?;
        let windows = cycles::detect_windows(&stats, &config.detection)?.unwrap_or_default();
        Ok((stats.len(), windows))
    });

    spinner.finish_and_clear();

    match result {
        Ok((groups, windows)) => {
            for window in &windows {
                let keys: Vec<String> = window.iter().map(|k| k.to_string()).collect();
                println!("[{}]", keys.join(", "));
            }

            print_summary(
                "Detection Complete",
                &[
                    ("Input", input.display().to_string()),
                    ("Pattern", pattern),
                    ("Column", config.detection.column.clone()),
                    ("Groups", groups.to_string()),
                    ("Windows", windows.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Detection failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_split(
    input: &Path,
    output_dir: &Path,
    pattern: Option<String>,
    merge: Option<MergeArg>,
    batch: bool,
    mut config: PipelineConfig,
) {
    let start = Instant::now();

    if pattern.is_some() {
        config.detection.pattern = pattern;
    }
    if let Some(MergeArg(policy)) = merge {
        config.extraction.time_merge = policy;
    }

    let merge_label = config
        .extraction
        .time_merge
        .map_or("none".to_string(), |p| p.to_string());

    if batch {
        println!("Splitting exports in batch mode...");
        println!("Input directory: {}", input.display());
        println!("Output directory: {}", output_dir.display());

        let total = list_files(input, &config.import.extensions).map_or(0, |f| f.len());
        let pb = create_progress_bar(total as u64);

        let result = cycles::split_batch(input, output_dir, &config, |file| {
            pb.set_message(display_name(file));
            pb.inc(1);
        });
        pb.finish_and_clear();

        match result {
            Ok(report) => {
                print_summary(
                    "Batch Split Complete",
                    &[
                        ("Input directory", input.display().to_string()),
                        ("Output directory", output_dir.display().to_string()),
                        ("Files processed", report.processed.len().to_string()),
                        ("Sequences written", report.files_written().to_string()),
                        ("Time merge", merge_label),
                        ("Duration", format!("{:.2?}", start.elapsed())),
                    ],
                );
            }
            Err(e) => {
                error!("Batch split failed: {:#}", e);
                std::process::exit(1);
            }
        }
    } else {
        let spinner = create_spinner("Splitting export into sequences...");

        match cycles::split_file(input, output_dir, &config) {
            Ok(report) => {
                spinner.finish_and_clear();

                print_summary(
                    "Split Complete",
                    &[
                        ("Input file", input.display().to_string()),
                        ("Output directory", output_dir.display().to_string()),
                        ("Rows", report.rows.to_string()),
                        ("Groups", report.groups.to_string()),
                        ("Windows detected", report.windows.to_string()),
                        ("Sequences written", report.written.len().to_string()),
                        ("Time merge", merge_label),
                        ("Duration", format!("{:.2?}", start.elapsed())),
                    ],
                );
            }
            Err(e) => {
                spinner.finish_and_clear();
                error!("Split failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn cmd_scan(directory: &Path, regex: &str, columns: &[String], config: &PipelineConfig) {
    let start = Instant::now();
    let spinner = create_spinner("Scanning directory...");

    let files = match list_files(directory, &config.import.extensions) {
        Ok(files) => files,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Scan failed: {}", e);
            std::process::exit(1);
        }
    };
    let names: Vec<String> = files.iter().map(|f| display_name(f)).collect();

    spinner.finish_and_clear();

    let audit = match filenames::audit_matches(regex, &names) {
        Ok(audit) => audit,
        Err(e) => {
            error!("Scan failed: {}", e);
            std::process::exit(1);
        }
    };

    if !columns.is_empty() {
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        match filenames::parse_names(regex, &names, &columns) {
            Ok(table) => print_table(&table, config),
            Err(e) => {
                error!("Failed to parse file names: {}", e);
                std::process::exit(1);
            }
        }
    }

    let unique: Vec<&str> = audit.unique.iter().map(String::as_str).collect();
    print_summary(
        "Scan Complete",
        &[
            ("Directory", directory.display().to_string()),
            ("Files", names.len().to_string()),
            ("Matches", audit.total.to_string()),
            ("Unique matches", audit.unique.len().to_string()),
            ("Irregular names", audit.irregular.len().to_string()),
            ("Values", unique.join(", ")),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}
