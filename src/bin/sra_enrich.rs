use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use sra_enrich::app::{App, ProgressSink, RunOptions};
use sra_enrich::config::{ConfigLoader, Overrides};
use sra_enrich::error::EnrichError;
use sra_enrich::ncbi::{FileSource, NcbiHttpClient, ReferenceSource};
use sra_enrich::output::{ConsoleProgress, JsonOutput, OutputMode, print_console_summary};

#[derive(Parser)]
#[command(name = "sra-enrich")]
#[command(about = "Add SRA run statistics and accessions to curated sample metadata tables")]
#[command(version, author)]
struct Cli {
    /// Config file (default: sra-enrich.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Directory searched recursively for curated files
    #[arg(long)]
    root: Option<Utf8PathBuf>,

    /// Local cache of the SRA run members table
    #[arg(long)]
    cache: Option<Utf8PathBuf>,

    /// Source URL of the SRA run members table
    #[arg(long)]
    url: Option<String>,

    /// Populate the cache from a local copy of the table instead of downloading
    #[arg(long, conflicts_with = "url")]
    reference_file: Option<PathBuf>,

    /// Re-download when the cache is older than this many hours
    #[arg(long)]
    max_age_hours: Option<u64>,

    /// Re-download the reference even if the cache is fresh
    #[arg(long)]
    refresh: bool,

    /// Continue with the remaining files after a file fails
    #[arg(long)]
    keep_going: bool,

    /// Print a JSON run summary on stdout instead of progress lines
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<EnrichError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EnrichError) -> u8 {
    match error {
        EnrichError::ConfigRead(_) | EnrichError::ConfigParse(_) | EnrichError::InvalidScheme(_) => 2,
        EnrichError::NcbiHttp(_) | EnrichError::NcbiStatus { .. } => 3,
        EnrichError::RowCountMismatch { .. }
        | EnrichError::UnrecognizedScheme(_)
        | EnrichError::BatchFailed { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };
    let options = RunOptions {
        refresh: cli.refresh,
        keep_going: cli.keep_going,
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?.with_overrides(Overrides {
        reference_url: cli.url,
        cache_path: cli.cache,
        curated_root: cli.root,
        max_age_hours: cli.max_age_hours,
    })?;

    match cli.reference_file {
        Some(path) => run_app(App::new(config, FileSource::new(&path)), options, output_mode),
        None => {
            let client = NcbiHttpClient::with_url(config.reference_url.clone())?;
            run_app(App::new(config, client), options, output_mode)
        }
    }
}

fn run_app<S: ReferenceSource>(
    app: App<S>,
    options: RunOptions,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Console => &ConsoleProgress,
        OutputMode::Json => &JsonOutput,
    };
    let summary = app.run(options, sink)?;
    match output_mode {
        OutputMode::Console => print_console_summary(&summary),
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
    }
    summary.ensure_complete()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_error_kind() {
        let cases = [
            (EnrichError::ConfigRead(PathBuf::from("sra-enrich.json")), 2),
            (EnrichError::ConfigParse("bad".to_string()), 2),
            (EnrichError::InvalidScheme("runs".to_string()), 2),
            (EnrichError::NcbiHttp("reset".to_string()), 3),
            (
                EnrichError::NcbiStatus {
                    status: 503,
                    message: "unavailable".to_string(),
                },
                3,
            ),
            (
                EnrichError::RowCountMismatch {
                    path: PathBuf::from("a.tsv"),
                    expected: 2,
                    actual: 1,
                },
                4,
            ),
            (EnrichError::UnrecognizedScheme(PathBuf::from("a.tsv")), 4),
            (EnrichError::BatchFailed { failed: 1 }, 4),
            (EnrichError::Filesystem("denied".to_string()), 1),
            (
                EnrichError::MissingColumn {
                    source_name: "a.tsv".to_string(),
                    column: "sample_id".to_string(),
                },
                1,
            ),
        ];
        for (error, code) in cases {
            assert_eq!(map_exit_code(&error), code, "{error}");
        }
    }
}
