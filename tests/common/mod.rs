#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use camino::Utf8PathBuf;
use serde_json::Value;

use sra_enrich::config::{Config, ConfigLoader, Overrides, ResolvedConfig};
use sra_enrich::error::EnrichError;
use sra_enrich::ncbi::ReferenceSource;

pub const MEMBERS_HEADER: &str =
    "Run\tMember_Name\tExperiment\tSample\tStudy\tSpots\tBases\tStatus\tBioSample\n";

/// Reference source serving fixed text and counting downloads.
pub struct FixtureSource {
    text: String,
    calls: Mutex<usize>,
}

impl FixtureSource {
    pub fn new(rows: &str) -> Self {
        Self {
            text: format!("{MEMBERS_HEADER}{rows}"),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ReferenceSource for FixtureSource {
    fn url(&self) -> &str {
        "fixture://SRA_Run_Members.tab"
    }

    fn download(&self, destination: &mut dyn Write) -> Result<u64, EnrichError> {
        *self.calls.lock().unwrap() += 1;
        destination
            .write_all(self.text.as_bytes())
            .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
        Ok(self.text.len() as u64)
    }
}

pub struct FailingSource;

impl ReferenceSource for FailingSource {
    fn url(&self) -> &str {
        "fixture://unavailable"
    }

    fn download(&self, _destination: &mut dyn Write) -> Result<u64, EnrichError> {
        Err(EnrichError::NcbiStatus {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

pub fn utf8(path: PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap()
}

pub fn config_in(root: &Path, config: Config) -> ResolvedConfig {
    ConfigLoader::resolve_config(config)
        .unwrap()
        .with_overrides(Overrides {
            cache_path: Some(utf8(root.join("cache").join("SRA_Run_Members.tsv.gz"))),
            curated_root: Some(utf8(root.join("curated"))),
            ..Overrides::default()
        })
        .unwrap()
}

pub fn write_curated(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join("curated").join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

pub fn read_ndjson(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
