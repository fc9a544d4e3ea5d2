use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EnrichError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid identifier scheme: {0}")]
    InvalidScheme(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("{source_name}: missing required column `{column}`")]
    MissingColumn { source_name: String, column: String },

    #[error("{source_name}: duplicate column `{column}` after name normalization")]
    DuplicateColumn { source_name: String, column: String },

    #[error("{source_name}: line {line} has {found} fields, header has {expected}")]
    RaggedRow {
        source_name: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{source_name}: cannot read `{value}` in column `{column}` (line {line}) as {expected}")]
    TypeCoercion {
        source_name: String,
        column: String,
        line: usize,
        value: String,
        expected: &'static str,
    },

    #[error("{0}: no identifier scheme applies (no `ncbi_accession` column and `sample_id` values are not biosample ids)")]
    #[diagnostic(help(
        "declare the scheme for this file under `files` in sra-enrich.json"
    ))]
    UnrecognizedScheme(PathBuf),

    #[error("{path}: enriched table has {actual} rows, curated table has {expected}")]
    RowCountMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("{failed} curated file(s) failed to enrich")]
    BatchFailed { failed: usize },
}
