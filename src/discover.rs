use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::EnrichError;

pub const DEFAULT_CURATED_ROOT: &str = "inst/curated";
pub const DEFAULT_INPUT_EXTENSION: &str = "tsv";
pub const DEFAULT_OUTPUT_EXTENSION: &str = "ndjson";

/// Curated files under `root` (recursive) with the given extension, sorted.
pub fn curated_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>, EnrichError> {
    if !root.is_dir() {
        return Err(EnrichError::Filesystem(format!(
            "curated root {} is not a directory",
            root.display()
        )));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|err| EnrichError::Filesystem(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn finds_nested_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::write(root.join("b/nested/two.tsv"), "").unwrap();
        fs::write(root.join("a.TSV"), "").unwrap();
        fs::write(root.join("a.ndjson"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let files = curated_files(root, "tsv").unwrap();
        assert_eq!(
            files,
            vec![root.join("a.TSV"), root.join("b/nested/two.tsv")]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = curated_files(&dir.path().join("absent"), "tsv").unwrap_err();
        assert_matches!(err, EnrichError::Filesystem(_));
    }
}
