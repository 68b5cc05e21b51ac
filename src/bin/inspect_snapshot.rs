use anyhow::{Context, Result};
use parquet::file::metadata::RowGroupMetaData;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::{env, fs::File, path::Path, process::exit};
use tabload::snapshot::{self, SnapshotManifest};

fn main() {
    // Expect exactly one CLI argument: the snapshot directory.
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        let prog = args.first().map_or("inspect_snapshot", String::as_str);
        eprintln!("Usage: {} <SNAPSHOT_DIR>", prog);
        exit(1);
    }
    if let Err(e) = inspect_snapshot(Path::new(&args[1])) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

/// Print the manifest, then each shard's Parquet layout, then check the
/// shards decode to the row count the manifest claims.
fn inspect_snapshot(dir: &Path) -> Result<()> {
    let manifest = snapshot::read_manifest(dir)?;
    print_manifest(dir, &manifest);

    for shard in &manifest.shards {
        let path = dir.join(&shard.file);
        let file = File::open(&path).with_context(|| format!("opening {:?}", path))?;
        let reader = SerializedFileReader::new(file)
            .with_context(|| format!("reading parquet footer of {:?}", path))?;
        let meta = reader.metadata();

        println!("=== Shard: {} ===", shard.file);
        println!("Rows (footer):        {}", meta.file_metadata().num_rows());
        println!("Rows (manifest):      {}", shard.rows);
        println!("Row groups:           {}", meta.num_row_groups());
        println!(
            "Size on disk:         {} bytes",
            std::fs::metadata(&path)?.len()
        );
        for rg_idx in 0..meta.num_row_groups() {
            print_row_group(rg_idx, meta.row_group(rg_idx));
        }
        println!();
    }

    let table = snapshot::read(dir)?;
    if table.num_rows() == manifest.rows {
        println!("✔ {} rows decoded, matches manifest", table.num_rows());
    } else {
        println!(
            "✘ {} rows decoded, manifest says {}",
            table.num_rows(),
            manifest.rows
        );
    }
    Ok(())
}

fn print_manifest(dir: &Path, manifest: &SnapshotManifest) {
    println!("=== Snapshot: {} ===", dir.display());
    println!("Created at:   {}", manifest.created_at.to_rfc3339());
    println!("Total rows:   {}", manifest.rows);
    println!("Shards:       {}", manifest.shards.len());
    println!("Columns:      {}", manifest.columns.join(", "));
    println!();
}

/// One line per column chunk: type, compression, sizes and null count.
fn print_row_group(idx: usize, rg_md: &RowGroupMetaData) {
    println!("--- Row Group {} ({} rows) ---", idx, rg_md.num_rows());
    for col_md in rg_md.columns() {
        let descr = col_md.column_descr();
        let nulls = col_md
            .statistics()
            .and_then(|s| s.null_count_opt())
            .map_or("?".to_string(), |n| n.to_string());
        println!(
            "  {:<24} {:<12} {:<10} {:>10} / {:>10} bytes  nulls={}",
            descr.name(),
            format!("{:?}", descr.physical_type()),
            format!("{:?}", col_md.compression()),
            col_md.compressed_size(),
            col_md.uncompressed_size(),
            nulls
        );
    }
}
