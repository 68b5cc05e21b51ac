// src/load/mod.rs

pub mod delimited;
pub mod workbook;

use anyhow::Result;
use std::{collections::HashMap, path::Path};
use tracing::debug;

use crate::{
    discover::{extension_of, CSV_EXT, XLSX_EXT},
    error::EtlError,
    table::Table,
};

/// Tokens read as missing, in both CSV cells and spreadsheet text cells.
pub const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_na(cell: &str) -> bool {
    NA_TOKENS.contains(&cell)
}

/// Load one input file, choosing the parser from its extension.
#[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let table = match extension_of(&name) {
        XLSX_EXT => workbook::read_xlsx(path)?,
        CSV_EXT => delimited::read_csv(path)?,
        other => {
            return Err(EtlError::UnsupportedType {
                path: path.to_path_buf(),
                extension: other.to_string(),
            }
            .into())
        }
    };
    debug!(
        rows = table.num_rows(),
        columns = table.num_columns(),
        "loaded table"
    );
    Ok(table)
}

/// Give blank headers a positional name and suffix repeated ones with
/// `.1`, `.2`, ... so every column name is unique.
pub(crate) fn clean_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, h) in raw.into_iter().enumerate() {
        let base = if h.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            h
        };
        let mut name = base.clone();
        while out.contains(&name) {
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            name = format!("{}.{}", base, n);
        }
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unknown_extension_is_unsupported() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("report.pdf");
        fs::write(&path, b"%PDF-1.4")?;

        let err = load_file(&path).unwrap_err();
        match err.downcast_ref::<EtlError>() {
            Some(EtlError::UnsupportedType { extension, .. }) => assert_eq!(extension, "pdf"),
            other => panic!("unexpected error {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn extension_match_is_case_sensitive() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("upper.CSV");
        fs::write(&path, "a\n1\n")?;
        assert!(matches!(
            load_file(&path).unwrap_err().downcast_ref::<EtlError>(),
            Some(EtlError::UnsupportedType { .. })
        ));
        Ok(())
    }

    #[test]
    fn dispatches_csv_by_extension() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("in.csv");
        fs::write(&path, "id,name\n1,x\n2,y\n")?;
        let t = load_file(&path)?;
        assert_eq!(t.num_rows(), 2);
        assert_eq!(
            t.column("id").map(|c| &c.data),
            Some(&ColumnData::Int64(vec![Some(1), Some(2)]))
        );
        Ok(())
    }

    #[test]
    fn headers_are_deduplicated() {
        let got = clean_headers(vec![
            "a".into(),
            "".into(),
            "a".into(),
            "a".into(),
            "a.1".into(),
        ]);
        assert_eq!(got, vec!["a", "Unnamed: 1", "a.1", "a.2", "a.1.1"]);
    }
}
