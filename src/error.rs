// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds raised by the pipeline itself. Library errors (io, csv,
/// arrow, duckdb, ...) are carried through `anyhow` with context instead.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("unsupported file type {extension:?} for {path}")]
    UnsupportedType { path: PathBuf, extension: String },

    #[error("column set of {file} does not match the first input (missing {missing:?}, unexpected {unexpected:?})")]
    SchemaMismatch {
        file: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("cannot cast {value:?} in column {column} (row {row}) to float64")]
    Coercion {
        column: String,
        row: usize,
        value: String,
    },

    #[error("cannot insert column {0}, it already exists")]
    DuplicateColumn(String),

    #[error("no tables to concatenate")]
    NoInputs,

    #[error("column {column} has {found} rows, expected {expected}")]
    RaggedTable {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column {column} is not normalized: {reason}")]
    NotNormalized { column: String, reason: String },

    #[error("table has no columns to insert")]
    EmptySchema,
}
