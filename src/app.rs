use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::cache::{CacheStatus, ReferenceCache};
use crate::config::ResolvedConfig;
use crate::curated::load_curated;
use crate::discover::curated_files;
use crate::domain::IdScheme;
use crate::enrich::{self, output_path, resolve_scheme, write_ndjson};
use crate::error::EnrichError;
use crate::ncbi::ReferenceSource;
use crate::reference::ReferenceTable;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Re-download the reference even when the cache is fresh.
    pub refresh: bool,
    /// Record per-file failures and continue instead of stopping at the first.
    pub keep_going: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub cache: CacheStatus,
    pub cache_path: String,
    pub reference_runs: usize,
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
}

impl RunSummary {
    pub fn ensure_complete(&self) -> Result<(), EnrichError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(EnrichError::BatchFailed {
                failed: self.failures.len(),
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub output: String,
    pub scheme: IdScheme,
    pub rows: usize,
    pub matched_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub file: Option<PathBuf>,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn phase(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<S: ReferenceSource> {
    config: ResolvedConfig,
    source: S,
}

impl<S: ReferenceSource> App<S> {
    pub fn new(config: ResolvedConfig, source: S) -> Self {
        Self { config, source }
    }

    pub fn cache(&self) -> ReferenceCache {
        ReferenceCache::new(self.config.cache_path.clone(), self.config.freshness)
    }

    /// Refreshes the reference if needed, loads it once and enriches every
    /// curated file under the configured root.
    pub fn run(
        &self,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, EnrichError> {
        let cache = self.cache();
        sink.event(ProgressEvent::phase(format!(
            "phase=Reference; checking {}",
            cache.path()
        )));
        let cache_status = cache.ensure(&self.source, options.refresh)?;

        let start = Instant::now();
        let reference = cache.load()?;
        sink.event(ProgressEvent {
            message: format!("phase=Reference; {} live runs", reference.len()),
            file: None,
            elapsed: Some(start.elapsed()),
        });

        let files = curated_files(
            self.config.curated_root.as_std_path(),
            &self.config.input_extension,
        )?;
        info!(
            root = %self.config.curated_root,
            files = files.len(),
            "discovered curated files"
        );

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for path in files {
            sink.event(ProgressEvent {
                message: "phase=Enrich".to_string(),
                file: Some(path.clone()),
                elapsed: None,
            });
            let start = Instant::now();
            match self.enrich_file(&path, &reference) {
                Ok(report) => {
                    sink.event(ProgressEvent {
                        message: format!(
                            "phase=Enrich; {} rows, {} matched",
                            report.rows, report.matched_rows
                        ),
                        file: Some(path.clone()),
                        elapsed: Some(start.elapsed()),
                    });
                    reports.push(report);
                }
                Err(err) if options.keep_going => {
                    error!(path = %path.display(), error = %err, "enrichment failed");
                    failures.push(FileFailure {
                        path: path.display().to_string(),
                        error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(RunSummary {
            cache: cache_status,
            cache_path: cache.path().to_string(),
            reference_runs: reference.len(),
            files: reports,
            failures,
        })
    }

    /// Load, enrich, check, write: one curated file end to end.
    ///
    /// Nothing is written when the row-count check fails.
    pub fn enrich_file(
        &self,
        path: &Path,
        reference: &ReferenceTable,
    ) -> Result<FileReport, EnrichError> {
        let curated = load_curated(path, self.config.infer_schema_length)?;
        let scheme = resolve_scheme(&curated, self.config.scheme_for(path), path)?;
        let enriched = enrich::enrich(&curated, reference, scheme, path)?;
        enriched.check_row_count(path, curated.len())?;

        let output = output_path(path, &self.config.output_extension);
        if output == path {
            return Err(EnrichError::Filesystem(format!(
                "output would overwrite input {}",
                path.display()
            )));
        }
        write_ndjson(&output, &enriched)?;
        info!(
            path = %path.display(),
            scheme = %enriched.scheme(),
            rows = enriched.len(),
            matched = enriched.matched_rows(),
            "enriched curated file"
        );

        Ok(FileReport {
            path: path.display().to_string(),
            output: output.display().to_string(),
            scheme: enriched.scheme(),
            rows: enriched.len(),
            matched_rows: enriched.matched_rows(),
        })
    }
}
