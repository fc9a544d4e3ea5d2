//! Tab-separated table reading shared by the reference and curated loaders.
//!
//! Both inputs use the same dialect: one header row, `\t` separators, `-` or
//! an empty field for a missing value, optional double quotes around a field.
//! A quoted field may contain tabs and `""` escapes; it may not span lines.

use std::io::{BufRead, Lines};

use serde::{Serialize, Serializer};

use crate::error::EnrichError;

pub const NULL_TOKEN: &str = "-";
pub const DEFAULT_INFER_SCHEMA_LENGTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Textual form used as a join key, whatever type was inferred.
    pub fn key(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(value) => Some(value.to_string()),
            Cell::Float(value) => Some(value.to_string()),
            Cell::Bool(value) => Some(value.to_string()),
            Cell::Str(value) => Some(value.clone()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Int(value) => serializer.serialize_i64(*value),
            Cell::Float(value) => serializer.serialize_f64(*value),
            Cell::Bool(value) => serializer.serialize_bool(*value),
            Cell::Str(value) => serializer.serialize_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Str,
}

impl ColumnType {
    fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "integer",
            ColumnType::Float => "float",
            ColumnType::Bool => "boolean",
            ColumnType::Str => "string",
        }
    }

    fn parse(self, value: &str) -> Option<Cell> {
        match self {
            ColumnType::Int => value.parse::<i64>().ok().map(Cell::Int),
            ColumnType::Float => {
                if !value.bytes().any(|b| b.is_ascii_digit()) {
                    return None;
                }
                value
                    .parse::<f64>()
                    .ok()
                    .filter(|parsed| parsed.is_finite())
                    .map(Cell::Float)
            }
            ColumnType::Bool => {
                if value.eq_ignore_ascii_case("true") {
                    Some(Cell::Bool(true))
                } else if value.eq_ignore_ascii_case("false") {
                    Some(Cell::Bool(false))
                } else {
                    None
                }
            }
            ColumnType::Str => Some(Cell::Str(value.to_string())),
        }
    }

    fn infer<'a>(values: impl Iterator<Item = &'a str> + Clone) -> ColumnType {
        const CANDIDATES: [ColumnType; 3] = [ColumnType::Int, ColumnType::Float, ColumnType::Bool];
        let mut any = values.clone().peekable();
        if any.peek().is_none() {
            return ColumnType::Str;
        }
        CANDIDATES
            .into_iter()
            .find(|ty| values.clone().all(|value| ty.parse(value).is_some()))
            .unwrap_or(ColumnType::Str)
    }
}

/// `-` and empty fields are null.
fn null_field(value: String) -> Option<String> {
    if value.is_empty() || value == NULL_TOKEN {
        None
    } else {
        Some(value)
    }
}

/// Splits a line on tabs. A field opening with `"` runs to its closing quote,
/// so separators inside it do not split and `""` decodes to `"`.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        let mut field = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                if c != '"' {
                    field.push(c);
                } else if chars.next_if_eq(&'"').is_some() {
                    field.push('"');
                } else {
                    break;
                }
            }
        }
        let mut last = true;
        for c in chars.by_ref() {
            if c == '\t' {
                last = false;
                break;
            }
            field.push(c);
        }
        fields.push(field);
        if last {
            return fields;
        }
    }
}

fn strip_line_end(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Streaming record reader: header first, then raw (untyped) rows.
pub struct TsvReader<R> {
    lines: Lines<R>,
    header: Vec<String>,
    line: usize,
    source_name: String,
}

impl<R: BufRead> TsvReader<R> {
    pub fn new(reader: R, source_name: impl Into<String>) -> Result<Self, EnrichError> {
        let source_name = source_name.into();
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => {
                let line = line.map_err(|err| {
                    EnrichError::Filesystem(format!("read {source_name}: {err}"))
                })?;
                let line = strip_line_end(&line);
                let line = line.strip_prefix('\u{feff}').unwrap_or(line);
                split_fields(line)
            }
            None => Vec::new(),
        };
        Ok(Self {
            lines,
            header,
            line: 1,
            source_name,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn require_column(&self, name: &str) -> Result<usize, EnrichError> {
        self.header
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| EnrichError::MissingColumn {
                source_name: self.source_name.clone(),
                column: name.to_string(),
            })
    }
}

/// One data row with its 1-based line number in the source.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub line: usize,
    pub fields: Vec<Option<String>>,
}

impl<R: BufRead> Iterator for TsvReader<R> {
    type Item = Result<RawRecord, EnrichError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(EnrichError::Filesystem(format!(
                        "read {}: {err}",
                        self.source_name
                    ))));
                }
            };
            self.line += 1;
            let line = strip_line_end(&line);
            if line.is_empty() {
                continue;
            }
            let mut fields: Vec<Option<String>> =
                split_fields(line).into_iter().map(null_field).collect();
            if fields.len() > self.header.len() {
                return Some(Err(EnrichError::RaggedRow {
                    source_name: self.source_name.clone(),
                    line: self.line,
                    expected: self.header.len(),
                    found: fields.len(),
                }));
            }
            fields.resize(self.header.len(), None);
            return Some(Ok(RawRecord {
                line: self.line,
                fields,
            }));
        }
    }
}

#[derive(Debug, Clone)]
pub struct TsvOptions {
    pub infer_schema_length: usize,
}

impl Default for TsvOptions {
    fn default() -> Self {
        Self {
            infer_schema_length: DEFAULT_INFER_SCHEMA_LENGTH,
        }
    }
}

/// A fully loaded table with one inferred type per column.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().map(move |row| &row[index])
    }

    pub(crate) fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }
}

pub fn read_table<R: BufRead>(
    reader: TsvReader<R>,
    options: &TsvOptions,
) -> Result<Table, EnrichError> {
    let columns = reader.header().to_vec();
    let source_name = reader.source_name().to_string();
    let records = reader.collect::<Result<Vec<_>, _>>()?;

    let window = &records[..records.len().min(options.infer_schema_length)];
    let types = (0..columns.len())
        .map(|index| {
            ColumnType::infer(
                window
                    .iter()
                    .filter_map(move |record| record.fields[index].as_deref()),
            )
        })
        .collect::<Vec<_>>();

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let mut row = Vec::with_capacity(columns.len());
        for (index, field) in record.fields.into_iter().enumerate() {
            let cell = match field {
                None => Cell::Null,
                Some(value) => types[index].parse(&value).ok_or_else(|| {
                    EnrichError::TypeCoercion {
                        source_name: source_name.clone(),
                        column: columns[index].clone(),
                        line: record.line,
                        value: value.clone(),
                        expected: types[index].name(),
                    }
                })?,
            };
            row.push(cell);
        }
        rows.push(row);
    }

    Ok(Table {
        columns,
        types,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn table(text: &str, infer_schema_length: usize) -> Result<Table, EnrichError> {
        let reader = TsvReader::new(text.as_bytes(), "test.tsv")?;
        read_table(reader, &TsvOptions { infer_schema_length })
    }

    #[test]
    fn null_token_becomes_null() {
        let table = table("a\tb\nx\t-\n-\t\n", 100).unwrap();
        assert_eq!(table.rows()[0][1], Cell::Null);
        assert_eq!(table.rows()[1][0], Cell::Null);
        assert_eq!(table.rows()[1][1], Cell::Null);
        assert_eq!(table.rows()[0][0], Cell::Str("x".to_string()));
    }

    #[test]
    fn infers_column_types() {
        let table = table("n\tf\tb\ts\n1\t1.5\tTRUE\tx\n2\t2\tfalse\t3\n", 100).unwrap();
        assert_eq!(
            table.types,
            [ColumnType::Int, ColumnType::Float, ColumnType::Bool, ColumnType::Str]
        );
        assert_eq!(table.rows()[1][1], Cell::Float(2.0));
    }

    #[test]
    fn value_outside_inference_window_must_fit() {
        let err = table("n\n1\n2\nthree\n", 2).unwrap_err();
        assert_matches!(err, EnrichError::TypeCoercion { line: 4, .. });
    }

    #[test]
    fn short_rows_are_padded_long_rows_fail() {
        let table_ok = table("a\tb\tc\nx\n", 10).unwrap();
        assert_eq!(table_ok.rows()[0], vec![Cell::Str("x".into()), Cell::Null, Cell::Null]);

        let err = table("a\nx\ty\n", 10).unwrap_err();
        assert_matches!(err, EnrichError::RaggedRow { expected: 1, found: 2, .. });
    }

    #[test]
    fn handles_quotes_crlf_and_bom() {
        let table = table("\u{feff}\"a\"\tb\r\n\"say \"\"hi\"\"\"\t2\r\n", 10).unwrap();
        assert_eq!(table.columns(), ["a", "b"]);
        assert_eq!(table.rows()[0][0], Cell::Str("say \"hi\"".to_string()));
        assert_eq!(table.rows()[0][1], Cell::Int(2));
    }

    #[test]
    fn quoted_tabs_stay_in_one_field() {
        let text = "sample_id\tnote\tage\textra\ns1\t\"a\tb\"\t42\n";
        let table1 = table(text, 10).unwrap();
        assert_eq!(
            table1.rows()[0],
            vec![
                Cell::Str("s1".into()),
                Cell::Str("a\tb".into()),
                Cell::Int(42),
                Cell::Null,
            ]
        );

        let table2 = table("sample_id\tnote\tage\ns1\t\"a\tb\"\t42\n", 10).unwrap();
        assert_eq!(table2.rows()[0][1], Cell::Str("a\tb".into()));
        assert_eq!(table2.rows()[0][2], Cell::Int(42));
    }

    #[test]
    fn split_fields_decodes_quotes() {
        assert_eq!(split_fields("a\t\"x\"\"y\"\t"), ["a", "x\"y", ""]);
        assert_eq!(split_fields("\"\"\t-"), ["", "-"]);
        assert_eq!(split_fields("\"open\tended"), ["open\tended"]);
    }

    #[test]
    fn overflowing_floats_stay_text() {
        let table = table("x\n1e999\n2.5\n", 10).unwrap();
        assert_eq!(table.types, [ColumnType::Str]);
        assert_eq!(table.rows()[0][0], Cell::Str("1e999".into()));
        assert_eq!(ColumnType::Float.parse("1e999"), None);
    }

    #[test]
    fn empty_input_has_no_columns() {
        let table = table("", 10).unwrap();
        assert!(table.columns().is_empty());
        assert!(table.is_empty());
    }
}
