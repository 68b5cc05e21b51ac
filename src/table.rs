// src/table.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Float64Type, Int64Type, Schema},
    record_batch::RecordBatch,
};
use std::{fmt, sync::Arc};

use crate::error::EtlError;

/// A single loosely-typed cell, as read from a spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    /// NaN floats count as missing, the same as an explicit null.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
        }
    }
}

/// Column storage. `Mixed` holds columns whose cells disagree on type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Mixed(Vec<Value>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Mixed(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Int64(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Float64(v) => v
                .iter()
                .filter(|c| c.map_or(true, |f| f.is_nan()))
                .count(),
            ColumnData::Mixed(v) => v.iter().filter(|c| c.is_null()).count(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Text(_) => "text",
            ColumnData::Int64(_) => "int64",
            ColumnData::Float64(_) => "float64",
            ColumnData::Mixed(_) => "mixed",
        }
    }

    /// Infer the narrowest representation that holds every value.
    /// An all-null column becomes float64; booleans always stay mixed so
    /// the normalizer decides what they become.
    pub fn from_values(values: Vec<Value>) -> Self {
        if values.iter().any(|v| matches!(v, Value::Bool(_))) {
            return ColumnData::Mixed(values);
        }
        let (mut ints, mut floats, mut texts) = (0usize, 0usize, 0usize);
        for v in &values {
            match v {
                Value::Null | Value::Bool(_) => {}
                Value::Int(_) => ints += 1,
                Value::Float(_) => floats += 1,
                Value::Text(_) => texts += 1,
            }
        }

        if texts == 0 && floats == 0 && ints > 0 {
            ColumnData::Int64(
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::Int(i) => Some(i),
                        _ => None,
                    })
                    .collect(),
            )
        } else if texts == 0 {
            ColumnData::Float64(
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::Int(i) => Some(i as f64),
                        Value::Float(f) => Some(f),
                        _ => None,
                    })
                    .collect(),
            )
        } else if ints == 0 && floats == 0 {
            ColumnData::Text(
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::Text(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            )
        } else {
            ColumnData::Mixed(values)
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            ColumnData::Text(v) => v
                .into_iter()
                .map(|c| c.map_or(Value::Null, Value::Text))
                .collect(),
            ColumnData::Int64(v) => v
                .into_iter()
                .map(|c| c.map_or(Value::Null, Value::Int))
                .collect(),
            ColumnData::Float64(v) => v
                .into_iter()
                .map(|c| c.map_or(Value::Null, Value::Float))
                .collect(),
            ColumnData::Mixed(v) => v,
        }
    }

    /// Append `other` below `self`, promoting int64 + float64 to float64 and
    /// any other disagreement to mixed.
    pub fn append(self, other: ColumnData) -> ColumnData {
        match (self, other) {
            (ColumnData::Text(mut a), ColumnData::Text(b)) => {
                a.extend(b);
                ColumnData::Text(a)
            }
            (ColumnData::Int64(mut a), ColumnData::Int64(b)) => {
                a.extend(b);
                ColumnData::Int64(a)
            }
            (ColumnData::Float64(mut a), ColumnData::Float64(b)) => {
                a.extend(b);
                ColumnData::Float64(a)
            }
            (ColumnData::Int64(a), ColumnData::Float64(b)) => {
                let mut out: Vec<Option<f64>> =
                    a.into_iter().map(|c| c.map(|i| i as f64)).collect();
                out.extend(b);
                ColumnData::Float64(out)
            }
            (ColumnData::Float64(mut a), ColumnData::Int64(b)) => {
                a.extend(b.into_iter().map(|c| c.map(|i| i as f64)));
                ColumnData::Float64(a)
            }
            (a, b) => {
                let mut out = a.into_values();
                out.extend(b.into_values());
                ColumnData::Mixed(out)
            }
        }
    }

    /// Flat Arrow buffer for this column. Mixed columns have no Arrow type.
    pub fn to_array(&self) -> Result<ArrayRef> {
        Ok(match self {
            ColumnData::Text(v) => Arc::new(StringArray::from_iter(v.iter().map(|s| s.as_deref()))),
            ColumnData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
            ColumnData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
            ColumnData::Mixed(_) => bail!("mixed column has no columnar representation"),
        })
    }

    pub fn arrow_type(&self) -> Option<DataType> {
        match self {
            ColumnData::Text(_) => Some(DataType::Utf8),
            ColumnData::Int64(_) => Some(DataType::Int64),
            ColumnData::Float64(_) => Some(DataType::Float64),
            ColumnData::Mixed(_) => None,
        }
    }

    fn from_array(array: &ArrayRef) -> Result<Self> {
        Ok(match array.data_type() {
            DataType::Utf8 => ColumnData::Text(
                array
                    .as_string::<i32>()
                    .iter()
                    .map(|s| s.map(str::to_string))
                    .collect(),
            ),
            DataType::LargeUtf8 => ColumnData::Text(
                array
                    .as_string::<i64>()
                    .iter()
                    .map(|s| s.map(str::to_string))
                    .collect(),
            ),
            DataType::Int64 => {
                ColumnData::Int64(array.as_primitive::<Int64Type>().iter().collect())
            }
            DataType::Float64 => {
                ColumnData::Float64(array.as_primitive::<Float64Type>().iter().collect())
            }
            other => bail!("unsupported arrow type {}", other),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Named columns with a uniform row count.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, |c| c.data.len());
        for c in &columns {
            if c.data.len() != num_rows {
                return Err(EtlError::RaggedTable {
                    column: c.name.clone(),
                    expected: num_rows,
                    found: c.data.len(),
                }
                .into());
            }
        }
        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Insert `column` at position `idx`. The name must be new and the length
    /// must match, unless the table has no columns yet.
    pub fn insert_column(&mut self, idx: usize, column: Column) -> Result<()> {
        if self.column(&column.name).is_some() {
            return Err(EtlError::DuplicateColumn(column.name).into());
        }
        if !self.columns.is_empty() && column.data.len() != self.num_rows {
            return Err(EtlError::RaggedTable {
                column: column.name,
                expected: self.num_rows,
                found: column.data.len(),
            }
            .into());
        }
        if self.columns.is_empty() {
            self.num_rows = column.data.len();
        }
        self.columns.insert(idx.min(self.columns.len()), column);
        Ok(())
    }

    /// Arrow view of the table, one flat buffer per column. Fields are
    /// declared nullable only when the column actually contains nulls.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays = Vec::with_capacity(self.columns.len());
        for c in &self.columns {
            let array = c
                .data
                .to_array()
                .with_context(|| format!("converting column {}", c.name))?;
            fields.push(Field::new(
                &c.name,
                array.data_type().clone(),
                array.null_count() > 0,
            ));
            arrays.push(array);
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .context("building record batch")
    }

    /// Rebuild a table from record batches sharing one schema.
    pub fn from_record_batches(batches: &[RecordBatch]) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Table::new(Vec::new());
        };
        let schema = first.schema();
        let mut columns: Vec<Column> = Vec::with_capacity(schema.fields().len());
        for (i, field) in schema.fields().iter().enumerate() {
            let mut data: Option<ColumnData> = None;
            for batch in batches {
                let part = ColumnData::from_array(batch.column(i))
                    .with_context(|| format!("reading column {}", field.name()))?;
                data = Some(match data {
                    Some(acc) => acc.append(part),
                    None => part,
                });
            }
            if let Some(data) = data {
                columns.push(Column::new(field.name().clone(), data));
            }
        }
        Table::new(columns)
    }
}
