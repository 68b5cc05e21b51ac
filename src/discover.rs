// src/discover.rs

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const XLSX_EXT: &str = "xlsx";
pub const CSV_EXT: &str = "csv";

/// Extensions the loader knows how to read.
pub const RECOGNIZED_EXTS: &[&str] = &[XLSX_EXT, CSV_EXT];

/// Everything after the last `.`, case preserved. Empty when there is no dot.
pub fn extension_of(name: &str) -> &str {
    name.rsplit_once('.').map_or("", |(_, ext)| ext)
}

/// List the loadable files directly inside `dir`, in directory order.
pub fn list_files<P: AsRef<Path>>(dir: P) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {:?}", dir))? {
        let entry = entry.with_context(|| format!("reading entry in {:?}", dir))?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if RECOGNIZED_EXTS.contains(&extension_of(&name)) {
            out.push(name);
        }
    }
    debug!(dir = %dir.display(), count = out.len(), "listed input files");
    Ok(out)
}

/// Supplies the names of the files to process, relative to `root()`.
pub trait FileSource: Send + Sync {
    fn root(&self) -> &Path;
    fn files(&self) -> Result<Vec<String>>;
}

/// Every recognized file in a directory.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileSource for DirectorySource {
    fn root(&self) -> &Path {
        &self.dir
    }

    fn files(&self) -> Result<Vec<String>> {
        list_files(&self.dir)
    }
}

/// A fixed list of names, not checked against the filesystem.
pub struct FixedFiles {
    root: PathBuf,
    names: Vec<String>,
}

impl FixedFiles {
    pub fn new(root: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            root: root.into(),
            names,
        }
    }
}

impl FileSource for FixedFiles {
    fn root(&self) -> &Path {
        &self.root
    }

    fn files(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }
}
