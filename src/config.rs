// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs::File,
    path::{Path, PathBuf},
};

use crate::discover::{DirectorySource, FileSource, FixedFiles};

/// Target type a column is coerced to before loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Float64,
}

/// Static name → type mapping: allowlisted names are float64, the rest text.
#[derive(Debug, Clone, Default)]
pub struct ColumnPolicy {
    float_columns: HashSet<String>,
}

impl ColumnPolicy {
    pub fn new<I, S>(float_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            float_columns: float_columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn type_of(&self, column: &str) -> ColumnType {
        if self.float_columns.contains(column) {
            ColumnType::Float64
        } else {
            ColumnType::Text
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub shard_rows: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("interim"),
            shard_rows: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB database file, or `:memory:`.
    pub connection: String,
    pub table: String,
    /// Issue `CREATE TABLE IF NOT EXISTS` before inserting.
    pub create_table: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: "tabload.duckdb".into(),
            table: "default_table".into(),
            create_table: false,
        }
    }
}

/// Run configuration, built once at startup and passed to every stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_dir: PathBuf,
    /// Read only `sample_file` instead of listing `source_dir`.
    pub test_mode: bool,
    pub sample_file: String,
    /// Name of the column recording each row's input file.
    pub source_tag: String,
    pub float_columns: Vec<String>,
    pub snapshot: SnapshotConfig,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data"),
            test_mode: false,
            sample_file: "filename.xlsx".into(),
            source_tag: "Filename".into(),
            float_columns: vec!["col_A".into(), "col_B".into(), "col_C".into()],
            snapshot: SnapshotConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening config {:?}", path))?;
        serde_yaml::from_reader(file).with_context(|| format!("parsing config {:?}", path))
    }

    pub fn policy(&self) -> ColumnPolicy {
        ColumnPolicy::new(self.float_columns.iter().cloned())
    }

    /// The file list to process: the single sample file in test mode,
    /// otherwise a listing of `source_dir`.
    pub fn file_source(&self) -> Box<dyn FileSource> {
        if self.test_mode {
            Box::new(FixedFiles::new(
                &self.source_dir,
                vec![self.sample_file.clone()],
            ))
        } else {
            Box::new(DirectorySource::new(&self.source_dir))
        }
    }
}
