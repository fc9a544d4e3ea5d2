use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EnrichError;
use crate::ncbi::ReferenceSource;
use crate::reference::ReferenceTable;

pub const DEFAULT_CACHE_PATH: &str = "SRA_Run_Members.tsv.gz";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How long a cached reference may be reused. `max_age: None` never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub max_age: Option<Duration>,
}

impl FreshnessPolicy {
    pub fn max_age(max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
        }
    }

    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Some(max_age) = self.max_age else {
            return true;
        };
        match (now - fetched_at).to_std() {
            Ok(age) => age <= max_age,
            // fetched_at in the future: clock skew, treat as fresh
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub source_url: String,
    pub fetched_at: String,
    pub bytes: u64,
    pub tool: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Reused,
    Downloaded,
}

/// Local copy of the run reference, plus a `.meta.json` sidecar recording
/// where and when it was fetched.
#[derive(Debug, Clone)]
pub struct ReferenceCache {
    path: Utf8PathBuf,
    policy: FreshnessPolicy,
}

impl ReferenceCache {
    pub fn new(path: Utf8PathBuf, policy: FreshnessPolicy) -> Self {
        Self { path, policy }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.meta.json", self.path))
    }

    pub fn exists(&self) -> bool {
        self.path.as_std_path().is_file()
    }

    pub fn read_metadata(&self) -> Option<CacheMetadata> {
        let content = fs::read_to_string(self.metadata_path().as_std_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Fetch time from the sidecar, else the file's modification time.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        if let Some(fetched_at) = self
            .read_metadata()
            .and_then(|meta| DateTime::parse_from_rfc3339(&meta.fetched_at).ok())
        {
            return Some(fetched_at.with_timezone(&Utc));
        }
        let modified = fs::metadata(self.path.as_std_path())
            .and_then(|meta| meta.modified())
            .ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        if !self.exists() {
            return false;
        }
        match self.fetched_at() {
            Some(fetched_at) => self.policy.is_fresh(fetched_at, now),
            None => self.policy.max_age.is_none(),
        }
    }

    /// Downloads the reference when it is missing, stale or `refresh` is set.
    pub fn ensure<S: ReferenceSource + ?Sized>(
        &self,
        source: &S,
        refresh: bool,
    ) -> Result<CacheStatus, EnrichError> {
        if !refresh && self.is_fresh(Utc::now()) {
            info!(path = %self.path, "using cached SRA run members");
            return Ok(CacheStatus::Reused);
        }
        if refresh {
            debug!(path = %self.path, "refresh requested");
        } else if self.exists() {
            info!(path = %self.path, "cached SRA run members are stale");
        }
        self.download(source)?;
        Ok(CacheStatus::Downloaded)
    }

    fn download<S: ReferenceSource + ?Sized>(&self, source: &S) -> Result<(), EnrichError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| EnrichError::Filesystem(err.to_string()))?;

        let temp = tempfile::Builder::new()
            .prefix(".sra-enrich-cache")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
        let bytes = {
            let mut encoder =
                GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
            let bytes = source.download(&mut encoder)?;
            let mut writer = encoder
                .finish()
                .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
            writer
                .flush()
                .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
            bytes
        };
        temp.persist(self.path.as_std_path())
            .map_err(|err| EnrichError::Filesystem(format!("write {}: {err}", self.path)))?;

        let metadata = CacheMetadata {
            source_url: source.url().to_string(),
            fetched_at: Utc::now().to_rfc3339(),
            bytes,
            tool: format!("sra-enrich/{}", env!("CARGO_PKG_VERSION")),
        };
        write_metadata(&self.metadata_path(), &metadata)?;
        info!(path = %self.path, bytes, "cached SRA run members");
        Ok(())
    }

    /// Opens the cached text, decompressing when the file is gzip.
    ///
    /// Older caches hold the raw report under the `.gz` name; those are read
    /// as plain text.
    pub fn open(&self) -> Result<Box<dyn BufRead>, EnrichError> {
        let file = File::open(self.path.as_std_path())
            .map_err(|err| EnrichError::Filesystem(format!("open {}: {err}", self.path)))?;
        let mut reader = BufReader::new(file);
        let head = reader
            .fill_buf()
            .map_err(|err| EnrichError::Filesystem(format!("read {}: {err}", self.path)))?;
        if head.starts_with(&GZIP_MAGIC) {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
        } else {
            warn!(path = %self.path, "cache file is not gzip-compressed, reading as plain text");
            Ok(Box::new(reader))
        }
    }

    pub fn load(&self) -> Result<ReferenceTable, EnrichError> {
        ReferenceTable::from_reader(self.open()?, self.path.as_str())
    }
}

fn write_metadata(path: &Utf8Path, metadata: &CacheMetadata) -> Result<(), EnrichError> {
    let tmp_path = path.with_extension("json.tmp");
    let content = serde_json::to_vec_pretty(metadata)
        .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
    fs::write(tmp_path.as_std_path(), &content)
        .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
    Ok(())
}
