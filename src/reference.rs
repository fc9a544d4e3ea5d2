use std::collections::HashMap;
use std::io::BufRead;

use tracing::{debug, info};

use crate::error::EnrichError;
use crate::tsv::{RawRecord, TsvReader};

pub const RUN_COLUMN: &str = "Run";
pub const BIOSAMPLE_COLUMN: &str = "BioSample";
pub const EXPERIMENT_COLUMN: &str = "Experiment";
pub const SAMPLE_COLUMN: &str = "Sample";
pub const STUDY_COLUMN: &str = "Study";
pub const SPOTS_COLUMN: &str = "Spots";
pub const BASES_COLUMN: &str = "Bases";
pub const STATUS_COLUMN: &str = "Status";
pub const LIVE_STATUS: &str = "live";

/// One live run from `SRA_Run_Members`. `Status` and `Member_Name` are not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub run: String,
    pub biosample: Option<String>,
    pub experiment: Option<String>,
    pub sample: Option<String>,
    pub study: Option<String>,
    pub spots: Option<i64>,
    pub bases: Option<i64>,
}

#[derive(Debug, Default)]
pub struct ReferenceTable {
    runs: Vec<RunRecord>,
    by_run: HashMap<String, usize>,
    by_biosample: HashMap<String, Vec<usize>>,
}

struct ColumnLayout {
    run: usize,
    biosample: usize,
    experiment: usize,
    sample: usize,
    study: usize,
    spots: usize,
    bases: usize,
    status: usize,
}

impl ColumnLayout {
    fn resolve<R: BufRead>(reader: &TsvReader<R>) -> Result<Self, EnrichError> {
        Ok(Self {
            run: reader.require_column(RUN_COLUMN)?,
            biosample: reader.require_column(BIOSAMPLE_COLUMN)?,
            experiment: reader.require_column(EXPERIMENT_COLUMN)?,
            sample: reader.require_column(SAMPLE_COLUMN)?,
            study: reader.require_column(STUDY_COLUMN)?,
            spots: reader.require_column(SPOTS_COLUMN)?,
            bases: reader.require_column(BASES_COLUMN)?,
            status: reader.require_column(STATUS_COLUMN)?,
        })
    }
}

impl ReferenceTable {
    /// Loads the run table, keeping live runs only.
    ///
    /// `Spots` and `Bases` are coerced for every row, live or not: one value
    /// that is not a 64-bit integer fails the whole load.
    pub fn from_reader<R: BufRead>(
        reader: R,
        source_name: impl Into<String>,
    ) -> Result<Self, EnrichError> {
        let reader = TsvReader::new(reader, source_name)?;
        let layout = ColumnLayout::resolve(&reader)?;
        let source_name = reader.source_name().to_string();

        let mut table = ReferenceTable::default();
        let mut total = 0usize;
        for record in reader {
            let RawRecord { line, mut fields } = record?;
            total += 1;
            let spots = coerce_i64(&source_name, SPOTS_COLUMN, line, &fields[layout.spots])?;
            let bases = coerce_i64(&source_name, BASES_COLUMN, line, &fields[layout.bases])?;
            if fields[layout.status].as_deref() != Some(LIVE_STATUS) {
                continue;
            }
            let Some(run) = fields[layout.run].take() else {
                debug!(line, "skipping live row without run accession");
                continue;
            };
            table.push(RunRecord {
                run,
                biosample: fields[layout.biosample].take(),
                experiment: fields[layout.experiment].take(),
                sample: fields[layout.sample].take(),
                study: fields[layout.study].take(),
                spots,
                bases,
            });
        }

        info!(
            source = %source_name,
            rows = total,
            live = table.len(),
            "loaded SRA run members"
        );
        Ok(table)
    }

    pub fn from_runs(runs: impl IntoIterator<Item = RunRecord>) -> Self {
        let mut table = ReferenceTable::default();
        for run in runs {
            table.push(run);
        }
        table
    }

    fn push(&mut self, record: RunRecord) {
        let index = self.runs.len();
        self.by_run.entry(record.run.clone()).or_insert(index);
        if let Some(biosample) = &record.biosample {
            self.by_biosample
                .entry(biosample.clone())
                .or_default()
                .push(index);
        }
        self.runs.push(record);
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn run(&self, accession: &str) -> Option<&RunRecord> {
        self.by_run.get(accession).map(|&index| &self.runs[index])
    }

    /// Runs under a biosample, in reference-file order.
    pub fn runs_for_biosample<'a>(
        &'a self,
        biosample: &str,
    ) -> impl Iterator<Item = &'a RunRecord> + use<'a> {
        self.by_biosample
            .get(biosample)
            .into_iter()
            .flatten()
            .map(|&index| &self.runs[index])
    }
}

fn coerce_i64(
    source_name: &str,
    column: &str,
    line: usize,
    value: &Option<String>,
) -> Result<Option<i64>, EnrichError> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .parse::<i64>()
        .map(Some)
        .map_err(|_| EnrichError::TypeCoercion {
            source_name: source_name.to_string(),
            column: column.to_string(),
            line,
            value: value.clone(),
            expected: "integer",
        })
}
