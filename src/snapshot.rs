// src/snapshot.rs

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use glob::{glob, Pattern};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

use crate::table::Table;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Written alongside the shards so a snapshot can be inspected or reloaded
/// without scanning the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub created_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub shards: Vec<ShardInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub file: String,
    pub rows: usize,
}

pub fn shard_file_name(idx: usize) -> String {
    format!("part.{}.parquet", idx)
}

/// Write `table` to `dir` as Parquet shards of at most `shard_rows` rows.
/// Shards from an earlier run are removed first. An empty table still gets
/// one shard so the schema is recorded.
#[instrument(level = "info", skip(table, dir), fields(dir = %dir.as_ref().display(), rows = table.num_rows()))]
pub fn write<P: AsRef<Path>>(table: &Table, dir: P, shard_rows: usize) -> Result<SnapshotManifest> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("creating snapshot directory {:?}", dir))?;
    clear(dir)?;

    let batch = table.to_record_batch()?;
    let rows = batch.num_rows();
    let shard_rows = shard_rows.max(1);
    let shard_count = rows.div_ceil(shard_rows).max(1);

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut shards = Vec::with_capacity(shard_count);
    for idx in 0..shard_count {
        let offset = idx * shard_rows;
        let len = shard_rows.min(rows - offset);
        let file = shard_file_name(idx);
        write_shard(&dir.join(&file), &batch.slice(offset, len), props.clone())?;
        debug!(shard = %file, rows = len, "wrote shard");
        shards.push(ShardInfo { file, rows: len });
    }

    let manifest = SnapshotManifest {
        created_at: Utc::now(),
        rows,
        columns: table.column_names().iter().map(|s| s.to_string()).collect(),
        shards,
    };
    write_manifest(dir, &manifest)?;
    info!(shards = manifest.shards.len(), "snapshot written");
    Ok(manifest)
}

fn write_shard(out_path: &Path, batch: &RecordBatch, props: WriterProperties) -> Result<()> {
    let temp_path = out_path.with_extension("tmp");
    let file =
        File::create(&temp_path).with_context(|| format!("creating shard {:?}", temp_path))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating Arrow writer for shard")?;
    writer.write(batch).context("writing shard batch")?;
    writer.close().context("closing shard writer")?;
    fs::rename(&temp_path, out_path)
        .with_context(|| format!("renaming {:?} -> {:?}", temp_path, out_path))?;
    Ok(())
}

fn write_manifest(dir: &Path, manifest: &SnapshotManifest) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    let tmp_path = dir.join(format!(".{}.tmp", MANIFEST_FILE));
    let mut tmp = BufWriter::new(
        File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?,
    );
    serde_json::to_writer_pretty(&mut tmp, manifest).context("serializing manifest")?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    drop(tmp);
    fs::rename(&tmp_path, &path)
        .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;
    Ok(())
}

/// Remove shards and manifest left by a previous snapshot in `dir`.
fn clear(dir: &Path) -> Result<()> {
    let base = Pattern::escape(&dir.to_string_lossy());
    let stale: Vec<PathBuf> = glob(&format!("{}/part.*.parquet", base))?
        .filter_map(|entry| entry.ok())
        .chain(std::iter::once(dir.join(MANIFEST_FILE)))
        .filter(|p| p.is_file())
        .collect();
    for path in &stale {
        fs::remove_file(path).with_context(|| format!("removing stale {:?}", path))?;
    }
    if !stale.is_empty() {
        debug!(removed = stale.len(), "cleared previous snapshot");
    }
    Ok(())
}

pub fn read_manifest<P: AsRef<Path>>(dir: P) -> Result<SnapshotManifest> {
    let path = dir.as_ref().join(MANIFEST_FILE);
    let file = File::open(&path).with_context(|| format!("opening {:?}", path))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {:?}", path))
}

/// Load a snapshot written by [`write`] back into a single table.
pub fn read<P: AsRef<Path>>(dir: P) -> Result<Table> {
    let dir = dir.as_ref();
    let manifest = read_manifest(dir)?;

    let mut batches = Vec::new();
    let mut schema = None;
    for shard in &manifest.shards {
        let path = dir.join(&shard.file);
        let file = File::open(&path).with_context(|| format!("opening shard {:?}", path))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata of {:?}", path))?;
        schema.get_or_insert_with(|| builder.schema().clone());
        for batch in builder.build()? {
            batches.push(batch.with_context(|| format!("decoding {:?}", path))?);
        }
    }
    if batches.is_empty() {
        if let Some(schema) = schema {
            batches.push(RecordBatch::new_empty(schema));
        }
    }
    Table::from_record_batches(&batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnData};
    use tempfile::tempdir;

    fn numbers(n: usize) -> Table {
        Table::new(vec![
            Column::new(
                "Filename",
                ColumnData::Text((0..n).map(|i| Some(format!("f{}", i))).collect()),
            ),
            Column::new(
                "col_A",
                ColumnData::Float64((0..n).map(|i| Some(i as f64)).collect()),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn shards_by_row_limit() -> Result<()> {
        let dir = tempdir()?;
        let table = numbers(7);
        let manifest = write(&table, dir.path(), 3)?;

        let rows: Vec<usize> = manifest.shards.iter().map(|s| s.rows).collect();
        assert_eq!(rows, vec![3, 3, 1]);
        for shard in &manifest.shards {
            assert!(dir.path().join(&shard.file).is_file());
        }
        assert_eq!(read_manifest(dir.path())?, manifest);
        assert_eq!(read(dir.path())?, table);
        Ok(())
    }

    #[test]
    fn exact_multiple_has_no_trailing_shard() -> Result<()> {
        let dir = tempdir()?;
        let manifest = write(&numbers(4), dir.path(), 2)?;
        let rows: Vec<usize> = manifest.shards.iter().map(|s| s.rows).collect();
        assert_eq!(rows, vec![2, 2]);
        assert!(!dir.path().join(shard_file_name(2)).exists());
        Ok(())
    }

    #[test]
    fn rewrite_removes_stale_shards() -> Result<()> {
        let dir = tempdir()?;
        write(&numbers(10), dir.path(), 2)?;
        assert!(dir.path().join(shard_file_name(4)).is_file());

        write(&numbers(3), dir.path(), 2)?;
        assert!(!dir.path().join(shard_file_name(2)).exists());
        assert_eq!(read(dir.path())?.num_rows(), 3);
        Ok(())
    }

    #[test]
    fn empty_table_keeps_schema() -> Result<()> {
        let dir = tempdir()?;
        let table = numbers(0);
        let manifest = write(&table, dir.path(), 5_000_000)?;
        assert_eq!(manifest.shards.len(), 1);
        assert_eq!(manifest.rows, 0);

        let back = read(dir.path())?;
        assert_eq!(back.num_rows(), 0);
        assert_eq!(back.column_names(), vec!["Filename", "col_A"]);
        Ok(())
    }
}
