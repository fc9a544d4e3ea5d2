use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use crate::error::EnrichError;
use crate::tsv::{self, Table, TsvOptions, TsvReader};

pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Reads a curated metadata TSV with normalized (trimmed, lowercase) column names.
pub fn load_curated(path: &Path, infer_schema_length: usize) -> Result<Table, EnrichError> {
    let file = File::open(path)
        .map_err(|err| EnrichError::Filesystem(format!("open {}: {err}", path.display())))?;
    let reader = TsvReader::new(BufReader::new(file), path.display().to_string())?;
    let table = tsv::read_table(reader, &TsvOptions { infer_schema_length })?;
    let table = normalize_columns(table, &path.display().to_string())?;
    debug!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "loaded curated table"
    );
    Ok(table)
}

pub fn normalize_columns(mut table: Table, source_name: &str) -> Result<Table, EnrichError> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(table.columns().len());
    for column in table.columns() {
        let normalized = normalize_column_name(column);
        if !seen.insert(normalized.clone()) {
            return Err(EnrichError::DuplicateColumn {
                source_name: source_name.to_string(),
                column: normalized,
            });
        }
        columns.push(normalized);
    }
    table.set_columns(columns);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        for name in ["  Sample_ID ", "NCBI_Accession", "study name", "x"] {
            let once = normalize_column_name(name);
            assert_eq!(normalize_column_name(&once), once);
        }
        assert_eq!(normalize_column_name("  Sample_ID "), "sample_id");
    }

    #[test]
    fn load_normalizes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.tsv");
        std::fs::write(&path, " Sample_ID\tNCBI_Accession \tAge\ns1\tSRR1;SRR2\t-\n").unwrap();

        let table = load_curated(&path, 10).unwrap();
        assert_eq!(table.columns(), ["sample_id", "ncbi_accession", "age"]);
        assert!(table.rows()[0][2].is_null());
    }

    #[test]
    fn colliding_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.tsv");
        std::fs::write(&path, "Sample_ID\tsample_id \ns1\ts2\n").unwrap();

        let err = load_curated(&path, 10).unwrap_err();
        assert_matches!(err, EnrichError::DuplicateColumn { column, .. } if column == "sample_id");
    }
}
