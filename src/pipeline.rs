// src/pipeline.rs

use anyhow::Result;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::{
    aggregate::aggregate,
    config::Config,
    discover::FileSource,
    duck::{self, LoadReport},
    load::load_file,
    normalize::normalize,
    table::Table,
};

/// Load every file the source lists and aggregate them into one table.
/// Files are parsed in parallel; the concatenation keeps listing order.
#[instrument(level = "info", skip_all, fields(root = %source.root().display()))]
pub fn load_all(source: &dyn FileSource, cfg: &Config) -> Result<Table> {
    let files = source.files()?;
    info!(count = files.len(), "total count of files");

    let start = Instant::now();
    let loaded = files
        .into_par_iter()
        .map(|name| {
            let path = source.root().join(&name);
            debug!(file = %name, "read file");
            let table = load_file(&path)?;
            Ok((name, table))
        })
        .collect::<Result<Vec<_>>>()?;
    info!(elapsed = ?start.elapsed(), "loaded all files");

    aggregate(loaded, cfg)
}

/// Bulk-load `table` into the configured database table. Without a table,
/// everything `source` lists is loaded and aggregated first.
pub fn write(table: Option<Table>, cfg: &Config, source: &dyn FileSource) -> Result<LoadReport> {
    let table = match table {
        Some(table) => table,
        None => normalize(load_all(source, cfg)?, &cfg.policy())?,
    };
    info!(columns = table.num_columns(), rows = table.num_rows(), "writing table");
    duck::bulk_insert(&table, &cfg.database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DatabaseConfig, SnapshotConfig},
        discover::{DirectorySource, FixedFiles},
        error::EtlError,
        snapshot,
        table::ColumnData,
    };
    use rust_xlsxwriter::Workbook;
    use std::{fs, path::Path};
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,tabload=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn test_config(work: &TempDir) -> Config {
        Config {
            source_dir: work.path().join("in"),
            snapshot: SnapshotConfig {
                enabled: true,
                dir: work.path().join("interim"),
                shard_rows: 5_000_000,
            },
            database: DatabaseConfig {
                connection: work.path().join("out.duckdb").to_string_lossy().to_string(),
                table: "default_table".into(),
                create_table: true,
            },
            ..Config::default()
        }
    }

    fn write_inputs(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(
            dir.join("first.csv"),
            "col_A,col_B,col_C,Name\n1.5,,3, alpha \n,2,NA,beta\n",
        )?;

        let mut book = Workbook::new();
        let sheet = book.add_worksheet();
        for (i, h) in ["Name", "col_C", "col_B", "col_A"].iter().enumerate() {
            sheet.write_string(0, i as u16, *h)?;
        }
        sheet.write_string(1, 0, "gamma")?;
        sheet.write_number(1, 1, 4.0)?;
        sheet.write_string(1, 2, " 5 ")?;
        book.save(dir.join("second.xlsx"))?;

        fs::write(dir.join("notes.txt"), "ignored")?;
        Ok(())
    }

    #[test]
    fn end_to_end_directory_load() -> Result<()> {
        init_test_logging();
        let work = tempdir()?;
        let cfg = test_config(&work);
        write_inputs(&cfg.source_dir)?;

        let source = DirectorySource::new(&cfg.source_dir);
        let report = write(None, &cfg, &source)?;
        assert_eq!(report.rows, 3);
        assert_eq!(report.columns, 5);

        let conn = duck::open_db(&cfg.database.connection)?;
        let total: f64 = conn.query_row(
            "SELECT SUM(\"col_A\") + SUM(\"col_B\") + SUM(\"col_C\") FROM default_table",
            [],
            |r| r.get(0),
        )?;
        // col_A 1.5 + 0 + 0, col_B 0 + 2 + 5, col_C 3 + 0 + 4
        assert_eq!(total, 15.5);

        let names: i64 = conn.query_row(
            "SELECT COUNT(*) FROM default_table WHERE \"Name\" IN ('alpha', 'beta', 'gamma')",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(names, 3);

        let snap = snapshot::read(&cfg.snapshot.dir)?;
        assert_eq!(snap.num_rows(), 3);
        assert_eq!(snap.columns()[0].name, "Filename");
        Ok(())
    }

    #[test]
    fn fixed_file_source_reads_one_file() -> Result<()> {
        let work = tempdir()?;
        let cfg = test_config(&work);
        write_inputs(&cfg.source_dir)?;

        let source = FixedFiles::new(&cfg.source_dir, vec!["first.csv".into()]);
        let table = load_all(&source, &cfg)?;
        assert_eq!(table.num_rows(), 2);
        assert_eq!(
            table.column("Filename").unwrap().data,
            ColumnData::Text(vec![Some("first.csv".into()), Some("first.csv".into())])
        );
        assert_eq!(
            table.column("col_C").unwrap().data,
            ColumnData::Float64(vec![Some(3.0), Some(0.0)])
        );
        Ok(())
    }

    #[test]
    fn unsupported_file_aborts_the_batch() -> Result<()> {
        let work = tempdir()?;
        let cfg = test_config(&work);
        write_inputs(&cfg.source_dir)?;
        fs::write(cfg.source_dir.join("report.pdf"), "x")?;

        let source = FixedFiles::new(
            &cfg.source_dir,
            vec!["first.csv".into(), "report.pdf".into()],
        );
        let err = write(None, &cfg, &source).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::UnsupportedType { .. })
        ));
        assert!(!Path::new(&cfg.database.connection).exists());
        Ok(())
    }

    #[test]
    fn supplied_table_skips_discovery() -> Result<()> {
        let work = tempdir()?;
        let cfg = test_config(&work);
        let source = FixedFiles::new(work.path().join("does-not-exist"), Vec::new());

        let table = Table::new(vec![crate::table::Column::new(
            "Name",
            ColumnData::Text(vec![Some("only".into())]),
        )])?;
        let report = write(Some(table), &cfg, &source)?;
        assert_eq!(report.rows, 1);
        Ok(())
    }
}
