// src/duck/mod.rs

use anyhow::{Context, Result};
use duckdb::{
    vtab::{arrow::ArrowVTab, arrow_recordbatch_to_query_params},
    Connection,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::{
    config::DatabaseConfig,
    error::EtlError,
    table::{ColumnData, Table},
};

pub const IN_MEMORY: &str = ":memory:";

/// Name the Arrow scan table function is registered under.
const ARROW_SCAN: &str = "arrow";

/// Outcome of one bulk load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    pub elapsed: Duration,
}

/// Open a DuckDB database: in memory for `:memory:`, otherwise the file at
/// `connection`, created if missing.
pub fn open_db(connection: &str) -> Result<Connection> {
    let conn = if connection == IN_MEMORY {
        Connection::open_in_memory()
    } else {
        Connection::open(connection)
    };
    conn.with_context(|| format!("opening database {}", connection))
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `INSERT INTO <target> ("a", "b") SELECT * FROM arrow(?, ?)`: the two
/// parameters are the FFI array and schema of one record batch.
pub fn insert_statement(target: &str, columns: &[&str]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "INSERT INTO {} ({}) SELECT * FROM {}(?, ?)",
        target,
        names.join(", "),
        ARROW_SCAN
    )
}

/// `CREATE TABLE IF NOT EXISTS` matching the table's column types.
pub fn create_table_statement(target: &str, table: &Table) -> Result<String> {
    let mut defs = Vec::with_capacity(table.num_columns());
    for c in table.columns() {
        let sql_type = match c.data {
            ColumnData::Float64(_) => "DOUBLE",
            ColumnData::Int64(_) => "BIGINT",
            ColumnData::Text(_) => "VARCHAR",
            ColumnData::Mixed(_) => {
                return Err(not_normalized(&c.name, "mixed column has no SQL type"))
            }
        };
        defs.push(format!("{} {}", quote_ident(&c.name), sql_type));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        target,
        defs.join(", ")
    ))
}

fn not_normalized(column: &str, reason: &str) -> anyhow::Error {
    EtlError::NotNormalized {
        column: column.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// The insert path has no null handling and no mixed-type columns.
fn check_loadable(table: &Table) -> Result<()> {
    if table.num_columns() == 0 {
        return Err(EtlError::EmptySchema.into());
    }
    for c in table.columns() {
        if matches!(c.data, ColumnData::Mixed(_)) {
            return Err(not_normalized(&c.name, "mixed value types"));
        }
        let nulls = c.data.null_count();
        if nulls > 0 {
            return Err(not_normalized(&c.name, &format!("{} null values", nulls)));
        }
    }
    Ok(())
}

/// Insert every row of `table` into `db.table` in one transaction.
///
/// The table goes over as a single Arrow batch and the INSERT runs exactly
/// once, reading all rows through the `arrow` table function. The
/// transaction rolls back and the connection closes on any error; nothing is
/// partially committed.
#[instrument(level = "info", skip(table, db), fields(table_name = %db.table, rows = table.num_rows()))]
pub fn bulk_insert(table: &Table, db: &DatabaseConfig) -> Result<LoadReport> {
    let start = Instant::now();
    check_loadable(table)?;

    let batch = table.to_record_batch()?;
    let sql = insert_statement(&db.table, &table.column_names());
    debug!(sql = %sql, "built insert statement");

    let mut conn = open_db(&db.connection)?;
    conn.register_table_function::<ArrowVTab>(ARROW_SCAN)
        .context("registering arrow scan")?;
    info!(columns = table.num_columns(), "connection is created, now to writing");

    let inserted = {
        let tx = conn.transaction().context("starting transaction")?;
        if db.create_table {
            let ddl = create_table_statement(&db.table, table)?;
            tx.execute_batch(&ddl)
                .with_context(|| format!("creating table {}", db.table))?;
        }
        let inserted = if batch.num_rows() == 0 {
            debug!("empty table, skipping insert");
            0
        } else {
            let mut stmt = tx
                .prepare(&sql)
                .with_context(|| format!("preparing {}", sql))?;
            stmt.execute(arrow_recordbatch_to_query_params(batch))
                .with_context(|| format!("bulk inserting into {}", db.table))?
        };
        tx.commit().context("committing bulk insert")?;
        inserted
    };
    conn.close()
        .map_err(|(_, e)| e)
        .context("closing database connection")?;

    let report = LoadReport {
        table: db.table.clone(),
        rows: inserted,
        columns: table.num_columns(),
        elapsed: start.elapsed(),
    };
    info!(
        rows = report.rows,
        "completed in {} s",
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}
