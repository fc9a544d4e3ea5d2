use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EnrichError;

pub const SAMPLE_ID_COLUMN: &str = "sample_id";
pub const ACCESSION_COLUMN: &str = "ncbi_accession";
pub const ACCESSION_DELIMITER: char = ';';
pub const BIOSAMPLE_PREFIX: &str = "SAM";

static RUN_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[SED]RR\d+$").expect("run accession pattern"));

/// How a curated file identifies its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// `ncbi_accession` holds `;`-delimited run accessions per sample.
    Accessions,
    /// `sample_id` holds BioSample identifiers (`SAMN…`, `SAMEA…`, `SAMD…`).
    Biosample,
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdScheme::Accessions => write!(f, "accessions"),
            IdScheme::Biosample => write!(f, "biosample"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeSelection {
    #[default]
    Auto,
    Accessions,
    Biosample,
}

impl SchemeSelection {
    pub fn declared(self) -> Option<IdScheme> {
        match self {
            SchemeSelection::Auto => None,
            SchemeSelection::Accessions => Some(IdScheme::Accessions),
            SchemeSelection::Biosample => Some(IdScheme::Biosample),
        }
    }
}

impl fmt::Display for SchemeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.declared() {
            Some(scheme) => write!(f, "{scheme}"),
            None => write!(f, "auto"),
        }
    }
}

impl FromStr for SchemeSelection {
    type Err = EnrichError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SchemeSelection::Auto),
            "accessions" | "accession" => Ok(SchemeSelection::Accessions),
            "biosample" => Ok(SchemeSelection::Biosample),
            _ => Err(EnrichError::InvalidScheme(value.to_string())),
        }
    }
}

/// Splits a `;`-delimited accession list, dropping blank segments.
pub fn split_accessions(value: &str) -> Vec<String> {
    value
        .split(ACCESSION_DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_run_accession(value: &str) -> bool {
    RUN_ACCESSION.is_match(value)
}

pub fn is_biosample_id(value: &str) -> bool {
    value.starts_with(BIOSAMPLE_PREFIX)
}
