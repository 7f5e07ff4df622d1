//! Battery cycler export processing pipeline.
//!
//! This crate provides tools for:
//! - Loading cycler exports (delimited files or workbook sheets) into tables
//! - Normalizing vendor column names and time representations
//! - Aggregating per-step statistics and detecting charge/discharge cycles
//!   with sign patterns over those statistics
//! - Extracting step sequences onto one continuous time axis and exporting them
//!
//! # Example
//!
//! ```no_run
//! use cycler_pipeline::core::loaders::load_table_csv;
//! use cycler_pipeline::processors::pattern::{find_windows, SignPattern};
//! use cycler_pipeline::processors::statistics::{aggregate, GroupMarker, StatisticsSpec};
//!
//! let table = load_table_csv("cell.csv", ',', None).unwrap();
//! let stats = aggregate(&table, GroupMarker::Column("Step"), &StatisticsSpec::default()).unwrap();
//! let pattern: SignPattern = "0-0+0".parse().unwrap();
//! let windows = find_windows(stats.keys(), stats.series("I_mean").unwrap(), &pattern).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{
    DetectionConfig, ExportConfig, ExtractionConfig, HealthConfig, ImportConfig, PipelineConfig,
    RenameConfig, StatisticsConfig, TimeConfig,
};
pub use core::table::{Column, GroupKey, Table, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
