use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::cache::CacheStatus;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints each curated file path as it is picked up; everything else goes
/// to the log.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match (&event.file, event.elapsed) {
            (Some(path), None) => println!("{}", path.display()),
            (_, Some(elapsed)) => info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            (None, None) => info!("{}", event.message),
        }
    }
}

pub fn print_console_summary(summary: &RunSummary) {
    let rows: usize = summary.files.iter().map(|file| file.rows).sum();
    println!(
        "enriched {} file(s), {} row(s) against {} live runs ({} reference cache)",
        summary.files.len(),
        rows,
        summary.reference_runs,
        match summary.cache {
            CacheStatus::Reused => "reused",
            CacheStatus::Downloaded => "downloaded",
        }
    );
    for failure in &summary.failures {
        eprintln!("failed: {}: {}", failure.path, failure.error);
    }
}
