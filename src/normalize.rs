// src/normalize.rs

use anyhow::Result;
use tracing::{debug, info, trace};

use crate::{
    config::{ColumnPolicy, ColumnType},
    error::EtlError,
    table::{Column, ColumnData, Table, Value},
};

/// Coerce every column to its policy type, filling nulls so nothing reaches
/// the insert path empty: numeric nulls become `0.0`, text nulls `""`.
/// Text cells are trimmed first. Normalizing twice is a no-op.
pub fn normalize(table: Table, policy: &ColumnPolicy) -> Result<Table> {
    let columns = table
        .into_columns()
        .into_iter()
        .map(|column| {
            let target = policy.type_of(&column.name);
            info!(column = %column.name, from = column.data.kind(), to = ?target, "prepare column conversion");
            normalize_column(column, target)
        })
        .collect::<Result<Vec<_>>>()?;
    Table::new(columns)
}

/// Normalize a single column to `target`.
pub fn normalize_column(column: Column, target: ColumnType) -> Result<Column> {
    let Column { name, data } = column;
    let data = trim_text(data);
    let data = match target {
        ColumnType::Float64 => ColumnData::Float64(to_float64(&name, data)?),
        ColumnType::Text => ColumnData::Text(to_text(data)),
    };
    debug!(column = %name, "per column {} data type saved", data.kind());
    Ok(Column { name, data })
}

fn trim_text(data: ColumnData) -> ColumnData {
    match data {
        ColumnData::Text(v) => ColumnData::Text(
            v.into_iter()
                .map(|c| c.map(trim_owned))
                .collect(),
        ),
        ColumnData::Mixed(v) => ColumnData::Mixed(
            v.into_iter()
                .map(|c| match c {
                    Value::Text(s) => Value::Text(trim_owned(s)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn trim_owned(s: String) -> String {
    let trimmed = s.trim();
    if trimmed.len() == s.len() {
        s
    } else {
        trimmed.to_string()
    }
}

fn to_float64(name: &str, data: ColumnData) -> Result<Vec<Option<f64>>> {
    let filled = data.null_count();
    let out = match data {
        ColumnData::Float64(v) => v
            .into_iter()
            .map(|c| Some(c.filter(|f| !f.is_nan()).unwrap_or(0.0)))
            .collect(),
        ColumnData::Int64(v) => v
            .into_iter()
            .map(|c| Some(c.map_or(0.0, |i| i as f64)))
            .collect(),
        ColumnData::Text(v) => v
            .into_iter()
            .enumerate()
            .map(|(row, c)| parse_float(name, row, c.as_deref().unwrap_or("")).map(Some))
            .collect::<Result<Vec<_>>>()?,
        ColumnData::Mixed(v) => v
            .into_iter()
            .enumerate()
            .map(|(row, c)| {
                Ok(Some(match c {
                    Value::Null => 0.0,
                    Value::Int(i) => i as f64,
                    Value::Float(f) if f.is_nan() => 0.0,
                    Value::Float(f) => f,
                    Value::Bool(b) => f64::from(u8::from(b)),
                    Value::Text(s) => parse_float(name, row, &s)?,
                }))
            })
            .collect::<Result<Vec<_>>>()?,
    };
    if filled > 0 {
        trace!(column = %name, filled, "filled nulls with 0");
    }
    Ok(out)
}

/// Empty strings count as missing.
fn parse_float(column: &str, row: usize, s: &str) -> Result<f64> {
    if s.is_empty() {
        return Ok(0.0);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_nan() => Ok(0.0),
        Ok(f) => Ok(f),
        Err(_) => Err(EtlError::Coercion {
            column: column.to_string(),
            row,
            value: s.to_string(),
        }
        .into()),
    }
}

/// An integer column with gaps is widened to float before it is rendered,
/// so `[42, null]` becomes `["42.0", ""]`.
fn to_text(data: ColumnData) -> Vec<Option<String>> {
    let text = |v: Value| -> String {
        if v.is_null() {
            String::new()
        } else {
            v.to_string()
        }
    };
    match data {
        ColumnData::Text(v) => v.into_iter().map(|c| Some(c.unwrap_or_default())).collect(),
        ColumnData::Int64(v) if v.iter().any(Option::is_none) => v
            .into_iter()
            .map(|c| Some(c.map_or_else(String::new, |i| format!("{:?}", i as f64))))
            .collect(),
        other => other.into_values().into_iter().map(|v| Some(text(v))).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ColumnPolicy {
        ColumnPolicy::new(["col_A", "col_B", "col_C"])
    }

    fn sample() -> Table {
        Table::new(vec![
            Column::new(
                "col_A",
                ColumnData::Mixed(vec![
                    Value::Float(1.5),
                    Value::Null,
                    Value::Text("3".into()),
                ]),
            ),
            Column::new("col_B", ColumnData::Int64(vec![Some(7), None, Some(-2)])),
            Column::new(
                "Name",
                ColumnData::Text(vec![Some("  ann ".into()), None, Some("bo\t".into())]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn mixed_numeric_column_becomes_float64() -> Result<()> {
        let t = normalize(sample(), &policy())?;
        assert_eq!(
            t.column("col_A").unwrap().data,
            ColumnData::Float64(vec![Some(1.5), Some(0.0), Some(3.0)])
        );
        assert_eq!(
            t.column("col_B").unwrap().data,
            ColumnData::Float64(vec![Some(7.0), Some(0.0), Some(-2.0)])
        );
        Ok(())
    }

    #[test]
    fn text_columns_are_trimmed_and_filled() -> Result<()> {
        let t = normalize(sample(), &policy())?;
        assert_eq!(
            t.column("Name").unwrap().data,
            ColumnData::Text(vec![Some("ann".into()), Some(String::new()), Some("bo".into())])
        );
        Ok(())
    }

    #[test]
    fn no_nulls_remain() -> Result<()> {
        let t = normalize(sample(), &policy())?;
        for c in t.columns() {
            assert_eq!(c.data.null_count(), 0, "column {}", c.name);
            assert!(matches!(c.data, ColumnData::Float64(_) | ColumnData::Text(_)));
        }
        Ok(())
    }

    #[test]
    fn normalizing_twice_is_identity() -> Result<()> {
        let once = normalize(sample(), &policy())?;
        let twice = normalize(once.clone(), &policy())?;
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn blank_and_nan_become_zero() -> Result<()> {
        let t = Table::new(vec![
            Column::new(
                "col_C",
                ColumnData::Text(vec![Some("   ".into()), Some(" 2.5 ".into()), None]),
            ),
            Column::new(
                "col_A",
                ColumnData::Float64(vec![Some(f64::NAN), None, Some(1.0)]),
            ),
        ])?;
        let t = normalize(t, &policy())?;
        assert_eq!(
            t.column("col_C").unwrap().data,
            ColumnData::Float64(vec![Some(0.0), Some(2.5), Some(0.0)])
        );
        assert_eq!(
            t.column("col_A").unwrap().data,
            ColumnData::Float64(vec![Some(0.0), Some(0.0), Some(1.0)])
        );
        Ok(())
    }

    #[test]
    fn numbers_in_text_columns_are_stringified() -> Result<()> {
        let t = Table::new(vec![
            Column::new("code", ColumnData::Int64(vec![Some(42), None])),
            Column::new("ratio", ColumnData::Float64(vec![Some(1.0), Some(0.25)])),
        ])?;
        let t = normalize(t, &policy())?;
        assert_eq!(
            t.column("code").unwrap().data,
            ColumnData::Text(vec![Some("42.0".into()), Some(String::new())])
        );
        assert_eq!(
            t.column("ratio").unwrap().data,
            ColumnData::Text(vec![Some("1.0".into()), Some("0.25".into())])
        );
        Ok(())
    }

    #[test]
    fn complete_integer_columns_keep_integer_text() -> Result<()> {
        let t = Table::new(vec![Column::new(
            "code",
            ColumnData::Int64(vec![Some(42), Some(-7)]),
        )])?;
        let t = normalize(t, &policy())?;
        assert_eq!(
            t.column("code").unwrap().data,
            ColumnData::Text(vec![Some("42".into()), Some("-7".into())])
        );
        Ok(())
    }

    #[test]
    fn booleans_cast_to_numbers_or_words() -> Result<()> {
        let t = Table::new(vec![
            Column::new(
                "col_A",
                ColumnData::Mixed(vec![Value::Bool(true), Value::Float(2.0), Value::Bool(false)]),
            ),
            Column::new(
                "flag",
                ColumnData::Mixed(vec![Value::Bool(true), Value::Null, Value::Bool(false)]),
            ),
        ])?;
        let t = normalize(t, &policy())?;
        assert_eq!(
            t.column("col_A").unwrap().data,
            ColumnData::Float64(vec![Some(1.0), Some(2.0), Some(0.0)])
        );
        assert_eq!(
            t.column("flag").unwrap().data,
            ColumnData::Text(vec![Some("True".into()), Some(String::new()), Some("False".into())])
        );
        Ok(())
    }

    #[test]
    fn non_numeric_text_fails_coercion() {
        let t = Table::new(vec![Column::new(
            "col_A",
            ColumnData::Text(vec![Some("1".into()), Some("abc".into())]),
        )])
        .unwrap();
        let err = normalize(t, &policy()).unwrap_err();
        match err.downcast_ref::<EtlError>() {
            Some(EtlError::Coercion { column, row, value }) => {
                assert_eq!(column, "col_A");
                assert_eq!(*row, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn empty_table_normalizes_to_empty() -> Result<()> {
        let t = Table::new(vec![
            Column::new("col_A", ColumnData::Float64(vec![])),
            Column::new("Name", ColumnData::Text(vec![])),
        ])?;
        let t = normalize(t, &policy())?;
        assert_eq!(t.num_rows(), 0);
        assert_eq!(t.column("col_A").unwrap().data, ColumnData::Float64(vec![]));
        Ok(())
    }
}
