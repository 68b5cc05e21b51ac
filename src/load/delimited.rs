// src/load/delimited.rs

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::path::Path;

use super::{clean_headers, is_na};
use crate::table::{Column, ColumnData, Table};

/// Read a comma-delimited file whose first record is the header row.
/// Records shorter than the header are padded with nulls; longer ones are
/// rejected.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let headers = clean_headers(
        rdr.headers()
            .with_context(|| format!("reading CSV header of {:?}", path))?
            .iter()
            .map(str::to_string)
            .collect(),
    );

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (idx, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("CSV parse error in {:?} at record {}", path, idx))?;
        if record.len() > headers.len() {
            bail!(
                "CSV record {} in {:?} has {} fields, header has {}",
                idx,
                path,
                record.len(),
                headers.len()
            );
        }
        for (i, col) in cells.iter_mut().enumerate() {
            col.push(
                record
                    .get(i)
                    .filter(|raw| !is_na(raw))
                    .map(str::to_string),
            );
        }
    }

    Table::new(
        headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::new(name, infer_column(values)))
            .collect(),
    )
}

/// Integer if every present cell parses as one, then float, else text.
fn infer_column(values: Vec<Option<String>>) -> ColumnData {
    let present = || values.iter().flatten().map(|s| s.trim());

    if present().next().is_none() {
        return ColumnData::Float64(vec![None; values.len()]);
    }
    if present().all(|s| s.parse::<i64>().is_ok()) {
        return ColumnData::Int64(
            values
                .iter()
                .map(|c| c.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        );
    }
    if present().all(|s| s.parse::<f64>().is_ok()) {
        return ColumnData::Float64(
            values
                .iter()
                .map(|c| c.as_deref().and_then(|s| s.trim().parse().ok()))
                .collect(),
        );
    }
    ColumnData::Text(values)
}
