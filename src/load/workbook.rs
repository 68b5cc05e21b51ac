// src/load/workbook.rs

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use std::path::Path;

use super::{clean_headers, is_na};
use crate::table::{Column, ColumnData, Table, Value};

/// Read the first worksheet of an `.xlsx` workbook; its first row is the header.
pub fn read_xlsx(path: &Path) -> Result<Table> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).with_context(|| format!("Failed to open workbook: {:?}", path))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook {:?} has no worksheets", path))?
        .with_context(|| format!("reading first worksheet of {:?}", path))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(row) => clean_headers(row.iter().map(|c| c.to_string()).collect()),
        None => Vec::new(),
    };

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (i, col) in values.iter_mut().enumerate() {
            col.push(row.get(i).map_or(Value::Null, cell_value));
        }
    }

    Table::new(
        headers
            .into_iter()
            .zip(values)
            .map(|(name, v)| Column::new(name, ColumnData::from_values(v)))
            .collect(),
    )
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::Float(*f),
        Data::String(s) if is_na(s) => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Value::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}
