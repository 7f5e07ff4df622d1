//! Core data types and I/O operations.

pub mod loaders;
pub mod table;
pub mod transforms;
pub mod writers;

pub use loaders::{assemble_workbook, list_files, load_source, load_table_csv, LoaderError, Sheet};
pub use table::{Column, GroupKey, Table, TableError, Value};
pub use transforms::{parse_time, rename_columns, renamed, RenameMap, TimeUnit, TransformError};
pub use writers::{save_sequences, write_table_csv, WriteError};
