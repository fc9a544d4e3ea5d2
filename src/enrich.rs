//! Joins curated sample tables against the SRA run reference.
//!
//! Both identifier schemes follow the same shape: derive one join key per
//! curated row, fold matching reference runs into a per-sample [`Aggregate`],
//! then attach the aggregate back to every curated row so the output keeps the
//! input's rows, order and columns.

use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use crate::domain::{
    ACCESSION_COLUMN, IdScheme, SAMPLE_ID_COLUMN, SchemeSelection, is_biosample_id,
    is_run_accession, split_accessions,
};
use crate::error::EnrichError;
use crate::reference::{ReferenceTable, RunRecord};
use crate::tsv::{Cell, Table};

pub const SPOTS_FIELD: &str = "spots";
pub const BASES_FIELD: &str = "bases";
pub const BIOSAMPLE_FIELD: &str = "biosample";
pub const EXPERIMENT_FIELD: &str = "sra_experiment";
pub const SAMPLE_FIELD: &str = "sra_sample";
pub const STUDY_FIELD: &str = "sra_study";

pub const AGGREGATE_FIELDS: [&str; 6] = [
    SPOTS_FIELD,
    BASES_FIELD,
    BIOSAMPLE_FIELD,
    EXPERIMENT_FIELD,
    SAMPLE_FIELD,
    STUDY_FIELD,
];

/// Suffix for curated columns that share a name with an aggregate field.
pub const CURATED_SUFFIX: &str = "_curated";

/// Picks the identifier scheme for a curated table.
///
/// A declared scheme wins. Otherwise an `ncbi_accession` column selects
/// [`IdScheme::Accessions`]; failing that, a `sample_id` column whose
/// non-null values all carry the `SAM` prefix selects [`IdScheme::Biosample`].
pub fn resolve_scheme(
    table: &Table,
    selection: SchemeSelection,
    path: &Path,
) -> Result<IdScheme, EnrichError> {
    if let Some(scheme) = selection.declared() {
        return Ok(scheme);
    }
    if table.has_column(ACCESSION_COLUMN) {
        return Ok(IdScheme::Accessions);
    }
    if let Some(index) = table.column_index(SAMPLE_ID_COLUMN) {
        let mut ids = table.column_values(index).filter_map(Cell::key).peekable();
        if ids.peek().is_some() && ids.all(|id| is_biosample_id(&id)) {
            return Ok(IdScheme::Biosample);
        }
    }
    Err(EnrichError::UnrecognizedScheme(path.to_path_buf()))
}

/// Sample-level rollup of the reference runs matched by one join key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub accessions: Vec<String>,
    pub spots: i64,
    pub bases: i64,
    pub biosample: Option<String>,
    pub experiment: Option<String>,
    pub sample: Option<String>,
    pub study: Option<String>,
    pub matched_runs: usize,
}

impl Aggregate {
    fn absorb(&mut self, run: &RunRecord) {
        self.matched_runs += 1;
        self.spots += run.spots.unwrap_or(0);
        self.bases += run.bases.unwrap_or(0);
        first_non_null(&mut self.biosample, &run.biosample);
        first_non_null(&mut self.experiment, &run.experiment);
        first_non_null(&mut self.sample, &run.sample);
        first_non_null(&mut self.study, &run.study);
    }
}

fn first_non_null(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

/// A curated table with one [`Aggregate`] attached per row.
#[derive(Debug)]
pub struct EnrichedTable<'a> {
    curated: &'a Table,
    scheme: IdScheme,
    aggregates: Vec<Aggregate>,
    row_groups: Vec<Option<usize>>,
}

impl EnrichedTable<'_> {
    pub fn scheme(&self) -> IdScheme {
        self.scheme
    }

    pub fn len(&self) -> usize {
        self.row_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_groups.is_empty()
    }

    /// Rows whose sample matched at least one live run.
    pub fn matched_rows(&self) -> usize {
        self.row_groups
            .iter()
            .flatten()
            .filter(|&&group| self.aggregates[group].matched_runs > 0)
            .count()
    }

    pub fn aggregate(&self, row: usize) -> Option<&Aggregate> {
        self.row_groups
            .get(row)
            .copied()
            .flatten()
            .map(|group| &self.aggregates[group])
    }

    pub fn records(&self) -> impl Iterator<Item = EnrichedRecord<'_>> {
        let accession_index = match self.scheme {
            IdScheme::Accessions => self.curated.column_index(ACCESSION_COLUMN),
            IdScheme::Biosample => None,
        };
        self.curated
            .rows()
            .iter()
            .enumerate()
            .map(move |(row, cells)| EnrichedRecord {
                columns: self.curated.columns(),
                cells,
                accession_index,
                aggregate: self.aggregate(row),
            })
    }

    /// Fails unless the enriched table has exactly `expected` rows.
    pub fn check_row_count(&self, path: &Path, expected: usize) -> Result<(), EnrichError> {
        if self.len() != expected {
            return Err(EnrichError::RowCountMismatch {
                path: path.to_path_buf(),
                expected,
                actual: self.len(),
            });
        }
        Ok(())
    }
}

/// One output row: curated cells in their original order, then the aggregate.
pub struct EnrichedRecord<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
    accession_index: Option<usize>,
    aggregate: Option<&'a Aggregate>,
}

impl Serialize for EnrichedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (index, (column, cell)) in self.columns.iter().zip(self.cells).enumerate() {
            if Some(index) == self.accession_index {
                map.serialize_entry(column, &self.aggregate.map(|agg| &agg.accessions))?;
            } else if AGGREGATE_FIELDS.contains(&column.as_str()) {
                map.serialize_entry(&format!("{column}{CURATED_SUFFIX}"), cell)?;
            } else {
                map.serialize_entry(column, cell)?;
            }
        }
        let agg = self.aggregate;
        map.serialize_entry(SPOTS_FIELD, &agg.map(|agg| agg.spots))?;
        map.serialize_entry(BASES_FIELD, &agg.map(|agg| agg.bases))?;
        map.serialize_entry(BIOSAMPLE_FIELD, &agg.and_then(|agg| agg.biosample.as_ref()))?;
        map.serialize_entry(EXPERIMENT_FIELD, &agg.and_then(|agg| agg.experiment.as_ref()))?;
        map.serialize_entry(SAMPLE_FIELD, &agg.and_then(|agg| agg.sample.as_ref()))?;
        map.serialize_entry(STUDY_FIELD, &agg.and_then(|agg| agg.study.as_ref()))?;
        map.end()
    }
}

pub fn enrich<'a>(
    curated: &'a Table,
    reference: &ReferenceTable,
    scheme: IdScheme,
    path: &Path,
) -> Result<EnrichedTable<'a>, EnrichError> {
    let sample_index = require_column(curated, SAMPLE_ID_COLUMN, path)?;
    let mut groups = Grouping::default();

    match scheme {
        IdScheme::Accessions => {
            let accession_index = require_column(curated, ACCESSION_COLUMN, path)?;
            let mut unmatched = 0usize;
            for row in curated.rows() {
                let Some(group) = groups.assign(row[sample_index].key()) else {
                    continue;
                };
                let accessions = row[accession_index]
                    .key()
                    .map(|value| split_accessions(&value))
                    .unwrap_or_default();
                let aggregate = &mut groups.aggregates[group];
                for accession in accessions {
                    match reference.run(&accession) {
                        Some(run) => aggregate.absorb(run),
                        None => {
                            unmatched += 1;
                            if !is_run_accession(&accession) {
                                debug!(path = %path.display(), %accession, "not a run accession");
                            }
                        }
                    }
                    aggregate.accessions.push(accession);
                }
            }
            if unmatched > 0 {
                warn!(
                    path = %path.display(),
                    unmatched,
                    "accessions not found among live runs"
                );
            }
        }
        IdScheme::Biosample => {
            for row in curated.rows() {
                let Some(biosample) = row[sample_index].key() else {
                    groups.assign(None);
                    continue;
                };
                let Some(group) = groups.assign(Some(biosample.clone())) else {
                    continue;
                };
                let aggregate = &mut groups.aggregates[group];
                // already rolled up for an earlier row with the same id
                if aggregate.biosample.is_some() {
                    continue;
                }
                for run in reference.runs_for_biosample(&biosample) {
                    aggregate.absorb(run);
                }
                aggregate.biosample = Some(biosample);
            }
        }
    }

    Ok(EnrichedTable {
        curated,
        scheme,
        aggregates: groups.aggregates,
        row_groups: groups.row_groups,
    })
}

/// Group-by on the join key, remembering which group each row belongs to.
/// Rows with a null key belong to no group.
#[derive(Default)]
struct Grouping {
    index: HashMap<String, usize>,
    aggregates: Vec<Aggregate>,
    row_groups: Vec<Option<usize>>,
}

impl Grouping {
    fn assign(&mut self, key: Option<String>) -> Option<usize> {
        let group = match key {
            Some(key) => Some(match self.index.get(&key) {
                Some(&group) => group,
                None => {
                    let group = self.aggregates.len();
                    self.aggregates.push(Aggregate::default());
                    self.index.insert(key, group);
                    group
                }
            }),
            None => None,
        };
        self.row_groups.push(group);
        group
    }
}

fn require_column(table: &Table, column: &str, path: &Path) -> Result<usize, EnrichError> {
    table
        .column_index(column)
        .ok_or_else(|| EnrichError::MissingColumn {
            source_name: path.display().to_string(),
            column: column.to_string(),
        })
}

/// Sibling path with the same stem and a new extension.
pub fn output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

/// Writes one JSON object per line, replacing `destination` atomically.
pub fn write_ndjson(destination: &Path, table: &EnrichedTable<'_>) -> Result<(), EnrichError> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".sra-enrich")
        .tempfile_in(parent)
        .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        for record in table.records() {
            serde_json::to_writer(&mut writer, &record)
                .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
            writer
                .write_all(b"\n")
                .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| EnrichError::Filesystem(err.to_string()))?;
    }
    temp.persist(destination).map_err(|err| {
        EnrichError::Filesystem(format!("write {}: {err}", destination.display()))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::tsv::{TsvOptions, TsvReader, read_table};

    fn curated(text: &str) -> Table {
        let reader = TsvReader::new(text.as_bytes(), "curated.tsv").unwrap();
        read_table(reader, &TsvOptions::default()).unwrap()
    }

    fn run(run: &str, biosample: &str, spots: i64, bases: i64) -> RunRecord {
        RunRecord {
            run: run.to_string(),
            biosample: Some(biosample.to_string()),
            experiment: Some(format!("X{run}")),
            sample: Some(format!("S{biosample}")),
            study: Some("SRP1".to_string()),
            spots: Some(spots),
            bases: Some(bases),
        }
    }

    #[test]
    fn declared_scheme_overrides_detection() {
        let table = curated("sample_id\tncbi_accession\nSAMN1\tSRR1\n");
        let scheme =
            resolve_scheme(&table, SchemeSelection::Biosample, Path::new("a.tsv")).unwrap();
        assert_eq!(scheme, IdScheme::Biosample);
        let scheme = resolve_scheme(&table, SchemeSelection::Auto, Path::new("a.tsv")).unwrap();
        assert_eq!(scheme, IdScheme::Accessions);
    }

    #[test]
    fn biosample_detection_needs_every_id_prefixed() {
        let mixed = curated("sample_id\nSAMN1\nsubject_2\n");
        let err = resolve_scheme(&mixed, SchemeSelection::Auto, Path::new("m.tsv")).unwrap_err();
        assert_matches!(err, EnrichError::UnrecognizedScheme(_));

        let single = curated("sample_id\nSAMEA7\n");
        let scheme = resolve_scheme(&single, SchemeSelection::Auto, Path::new("s.tsv")).unwrap();
        assert_eq!(scheme, IdScheme::Biosample);

        let empty = curated("sample_id\n");
        let err = resolve_scheme(&empty, SchemeSelection::Auto, Path::new("e.tsv")).unwrap_err();
        assert_matches!(err, EnrichError::UnrecognizedScheme(_));
    }

    #[test]
    fn accession_groups_span_rows_sharing_a_sample() {
        let reference =
            ReferenceTable::from_runs([run("R1", "SAMN1", 10, 100), run("R2", "SAMN1", 5, 50)]);
        let table = curated("sample_id\tncbi_accession\ns1\tR1\ns1\tR2\ns2\t-\n");
        let enriched =
            enrich(&table, &reference, IdScheme::Accessions, Path::new("c.tsv")).unwrap();

        assert_eq!(enriched.len(), 3);
        let first = enriched.aggregate(0).unwrap();
        assert_eq!(first.accessions, vec!["R1", "R2"]);
        assert_eq!(first.spots, 15);
        assert_eq!(enriched.aggregate(1), Some(first));
        let none = enriched.aggregate(2).unwrap();
        assert_eq!(none.spots, 0);
        assert!(none.accessions.is_empty());
        assert_eq!(enriched.matched_rows(), 2);

        let json = serde_json::to_value(enriched.records().nth(2).unwrap()).unwrap();
        assert_eq!(json["ncbi_accession"], serde_json::json!([]));
        assert_eq!(json["spots"], 0);
    }

    #[test]
    fn null_sample_id_rows_stay_unjoined() {
        let reference = ReferenceTable::from_runs([run("R1", "SAMN1", 10, 100)]);
        let table = curated("sample_id\tncbi_accession\n-\tR1\n");
        let enriched =
            enrich(&table, &reference, IdScheme::Accessions, Path::new("c.tsv")).unwrap();
        assert_eq!(enriched.len(), 1);
        assert!(enriched.aggregate(0).is_none());

        let json = serde_json::to_value(enriched.records().next().unwrap()).unwrap();
        assert!(json["spots"].is_null());
        assert!(json["ncbi_accession"].is_null());
    }

    #[test]
    fn accession_scheme_requires_its_column() {
        let reference = ReferenceTable::default();
        let table = curated("sample_id\nSAMN1\n");
        let err = enrich(&table, &reference, IdScheme::Accessions, Path::new("c.tsv"))
            .unwrap_err();
        assert_matches!(
            err,
            EnrichError::MissingColumn { column, .. } if column == ACCESSION_COLUMN
        );
    }

    #[test]
    fn record_keeps_column_order_and_renames_collisions() {
        let reference = ReferenceTable::from_runs([run("R1", "SAMN1", 10, 100)]);
        let table = curated("sample_id\tncbi_accession\tspots\tage\ns1\tR1\t7\t42\n");
        let enriched =
            enrich(&table, &reference, IdScheme::Accessions, Path::new("c.tsv")).unwrap();
        let line = serde_json::to_string(&enriched.records().next().unwrap()).unwrap();
        assert_eq!(
            line,
            concat!(
                r#"{"sample_id":"s1","ncbi_accession":["R1"],"spots_curated":7,"age":42,"#,
                r#""spots":10,"bases":100,"biosample":"SAMN1","sra_experiment":"XR1","#,
                r#""sra_sample":"SSAMN1","sra_study":"SRP1"}"#
            )
        );
    }

    #[test]
    fn row_count_check_reports_both_sides() {
        let reference = ReferenceTable::default();
        let table = curated("sample_id\nSAMN1\nSAMN2\n");
        let enriched = enrich(&table, &reference, IdScheme::Biosample, Path::new("b.tsv")).unwrap();
        enriched.check_row_count(Path::new("b.tsv"), 2).unwrap();
        let err = enriched
            .check_row_count(Path::new("b.tsv"), 3)
            .unwrap_err();
        assert_matches!(err, EnrichError::RowCountMismatch { expected: 3, actual: 2, .. });
    }
}
