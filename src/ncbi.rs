use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

use crate::error::EnrichError;

pub const SRA_RUN_MEMBERS_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/sra/reports/Metadata/SRA_Run_Members.tab";

/// Where the run reference comes from. The download is attempted once;
/// failures go straight back to the caller.
pub trait ReferenceSource: Send + Sync {
    fn url(&self) -> &str;

    /// Streams the reference table text into `destination`.
    fn download(&self, destination: &mut dyn Write) -> Result<u64, EnrichError>;
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    url: String,
}

impl NcbiHttpClient {
    pub fn new() -> Result<Self, EnrichError> {
        Self::with_url(SRA_RUN_MEMBERS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self, EnrichError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sra-enrich/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EnrichError::NcbiHttp(err.to_string()))?,
        );

        // only connecting is bounded; the report is large and the body read has no deadline
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(60))
            .timeout(None)
            .build()
            .map_err(|err| EnrichError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ReferenceSource for NcbiHttpClient {
    fn url(&self) -> &str {
        &self.url
    }

    fn download(&self, destination: &mut dyn Write) -> Result<u64, EnrichError> {
        info!(url = %self.url, "downloading SRA run members");
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| EnrichError::NcbiHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(EnrichError::NcbiStatus { status, message });
        }
        let bytes = io::copy(&mut response, destination)
            .map_err(|err| EnrichError::NcbiHttp(err.to_string()))?;
        info!(bytes, "download finished");
        Ok(bytes)
    }
}

/// Serves a local file as the reference, for offline runs and tests.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: String,
}

impl FileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.display().to_string(),
        }
    }
}

impl ReferenceSource for FileSource {
    fn url(&self) -> &str {
        &self.path
    }

    fn download(&self, destination: &mut dyn Write) -> Result<u64, EnrichError> {
        let file = File::open(&self.path)
            .map_err(|err| EnrichError::Filesystem(format!("open {}: {err}", self.path)))?;
        let mut reader = io::BufReader::new(file);
        let mut writer = BufWriter::new(destination);
        let bytes = io::copy(&mut reader, &mut writer)
            .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
        writer
            .flush()
            .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
        Ok(bytes)
    }
}
