//! Data processing modules.

pub mod cycles;
pub mod filenames;
pub mod health;
pub mod pattern;
pub mod sequences;
pub mod statistics;

// Re-export key types for convenience
pub use cycles::{split_batch, split_file, BatchReport, SplitReport};
pub use filenames::{audit_matches, parse_names, FilenameError, MatchAudit};
pub use health::{state_of_health, HealthError};
pub use pattern::{find_step_windows, find_windows, PatternError, SignPattern};
pub use sequences::{extract_sequences, merge_time, SequenceError, TimeMerge};
pub use statistics::{
    aggregate, change_marker, GroupMarker, StatMethod, StatisticsError, StatisticsSpec,
    StatisticsTable,
};
