use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_CACHE_PATH, FreshnessPolicy};
use crate::discover::{DEFAULT_CURATED_ROOT, DEFAULT_INPUT_EXTENSION, DEFAULT_OUTPUT_EXTENSION};
use crate::domain::SchemeSelection;
use crate::error::EnrichError;
use crate::ncbi::SRA_RUN_MEMBERS_URL;
use crate::tsv::DEFAULT_INFER_SCHEMA_LENGTH;

pub const DEFAULT_CONFIG_FILE: &str = "sra-enrich.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub reference_url: Option<String>,
    #[serde(default)]
    pub cache_path: Option<String>,
    #[serde(default)]
    pub max_age_hours: Option<u64>,
    #[serde(default)]
    pub curated_root: Option<String>,
    #[serde(default)]
    pub input_extension: Option<String>,
    #[serde(default)]
    pub output_extension: Option<String>,
    #[serde(default)]
    pub infer_schema_length: Option<usize>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FileEntry {
    Shorthand(String),
    Detailed(FileEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FileEntryObject {
    pub path: String,
    #[serde(default)]
    pub scheme: Option<SchemeSelection>,
}

/// Scheme declared for one curated file, path relative to the curated root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRule {
    pub path: PathBuf,
    pub scheme: SchemeSelection,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub reference_url: String,
    pub cache_path: Utf8PathBuf,
    pub freshness: FreshnessPolicy,
    pub curated_root: Utf8PathBuf,
    pub input_extension: String,
    pub output_extension: String,
    pub infer_schema_length: usize,
    pub files: Vec<FileRule>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub reference_url: Option<String>,
    pub cache_path: Option<Utf8PathBuf>,
    pub curated_root: Option<Utf8PathBuf>,
    pub max_age_hours: Option<u64>,
}

impl ResolvedConfig {
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, EnrichError> {
        if let Some(url) = overrides.reference_url {
            self.reference_url = url;
        }
        if let Some(path) = overrides.cache_path {
            self.cache_path = path;
        }
        if let Some(root) = overrides.curated_root {
            self.curated_root = root;
        }
        if let Some(hours) = overrides.max_age_hours {
            self.freshness = freshness_from_hours(Some(hours))?;
        }
        Ok(self)
    }

    /// Declared scheme for a discovered file, `Auto` when none is declared.
    pub fn scheme_for(&self, file: &Path) -> SchemeSelection {
        let relative = file
            .strip_prefix(self.curated_root.as_std_path())
            .unwrap_or(file);
        self.files
            .iter()
            .find(|rule| rule.path == relative || rule.path == file)
            .map(|rule| rule.scheme)
            .unwrap_or_default()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `sra-enrich.json` when present; defaults otherwise.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, EnrichError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| EnrichError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| EnrichError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, EnrichError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(EnrichError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let files = config
            .files
            .into_iter()
            .map(|entry| match entry {
                FileEntry::Shorthand(path) => FileRule {
                    path: PathBuf::from(path),
                    scheme: SchemeSelection::Auto,
                },
                FileEntry::Detailed(obj) => FileRule {
                    path: PathBuf::from(obj.path),
                    scheme: obj.scheme.unwrap_or_default(),
                },
            })
            .collect();

        Ok(ResolvedConfig {
            schema_version,
            reference_url: config
                .reference_url
                .unwrap_or_else(|| SRA_RUN_MEMBERS_URL.to_string()),
            cache_path: Utf8PathBuf::from(
                config
                    .cache_path
                    .unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string()),
            ),
            freshness: freshness_from_hours(config.max_age_hours)?,
            curated_root: Utf8PathBuf::from(
                config
                    .curated_root
                    .unwrap_or_else(|| DEFAULT_CURATED_ROOT.to_string()),
            ),
            input_extension: config
                .input_extension
                .unwrap_or_else(|| DEFAULT_INPUT_EXTENSION.to_string()),
            output_extension: config
                .output_extension
                .unwrap_or_else(|| DEFAULT_OUTPUT_EXTENSION.to_string()),
            infer_schema_length: config
                .infer_schema_length
                .unwrap_or(DEFAULT_INFER_SCHEMA_LENGTH),
            files,
        })
    }
}

fn freshness_from_hours(hours: Option<u64>) -> Result<FreshnessPolicy, EnrichError> {
    let Some(hours) = hours else {
        return Ok(FreshnessPolicy::default());
    };
    let seconds = hours
        .checked_mul(3600)
        .ok_or_else(|| EnrichError::ConfigParse(format!("max_age_hours {hours} is too large")))?;
    Ok(FreshnessPolicy::max_age(Duration::from_secs(seconds)))
}
