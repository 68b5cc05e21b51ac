// src/aggregate.rs

use anyhow::Result;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::{
    config::Config,
    error::EtlError,
    normalize::normalize,
    snapshot,
    table::{Column, ColumnData, Table},
};

/// Prepend a text column named `tag` holding `file` on every row.
pub fn tag_source(table: &mut Table, tag: &str, file: &str) -> Result<()> {
    let rows = table.num_rows();
    table.insert_column(
        0,
        Column::new(tag, ColumnData::Text(vec![Some(file.to_string()); rows])),
    )
}

/// Stack tables by column name. The first table fixes the column order and
/// every other table must carry exactly the same set of names.
pub fn concat(tables: Vec<(String, Table)>) -> Result<Table> {
    let mut iter = tables.into_iter();
    let Some((_, first)) = iter.next() else {
        return Err(EtlError::NoInputs.into());
    };

    let names: Vec<String> = first.column_names().iter().map(|s| s.to_string()).collect();
    let mut acc: Vec<Option<ColumnData>> =
        first.into_columns().into_iter().map(|c| Some(c.data)).collect();

    for (file, table) in iter {
        let mut parts: HashMap<String, ColumnData> = table
            .into_columns()
            .into_iter()
            .map(|c| (c.name, c.data))
            .collect();

        let missing: Vec<String> = names
            .iter()
            .filter(|n| !parts.contains_key(n.as_str()))
            .cloned()
            .collect();
        let mut unexpected: Vec<String> = parts
            .keys()
            .filter(|k| !names.contains(*k))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            unexpected.sort();
            return Err(EtlError::SchemaMismatch {
                file,
                missing,
                unexpected,
            }
            .into());
        }

        for (slot, name) in acc.iter_mut().zip(&names) {
            if let (Some(have), Some(part)) = (slot.take(), parts.remove(name)) {
                *slot = Some(have.append(part));
            }
        }
    }

    Table::new(
        names
            .into_iter()
            .zip(acc)
            .filter_map(|(name, data)| data.map(|d| Column::new(name, d)))
            .collect(),
    )
}

/// Tag, normalize and concatenate per-file tables, then snapshot the result.
#[instrument(level = "info", skip(inputs, cfg), fields(files = inputs.len()))]
pub fn aggregate(inputs: Vec<(String, Table)>, cfg: &Config) -> Result<Table> {
    let policy = cfg.policy();

    let prepared = inputs
        .into_par_iter()
        .map(|(file, mut table)| {
            tag_source(&mut table, &cfg.source_tag, &file)?;
            debug!(file = %file, columns = table.num_columns(), "column length check");
            let table = normalize(table, &policy)?;
            Ok((file, table))
        })
        .collect::<Result<Vec<_>>>()?;

    info!(tables = prepared.len(), "concat all tables");
    let total = concat(prepared)?;
    info!(
        rows = total.num_rows(),
        columns = total.num_columns(),
        "unified table"
    );

    if cfg.snapshot.enabled {
        snapshot::write(&total, &cfg.snapshot.dir, cfg.snapshot.shard_rows)?;
    }

    Ok(total)
}
