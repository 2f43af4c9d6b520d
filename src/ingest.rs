//! Mapping of tabular sources onto country records.
//!
//! Both entry points share one explicit column mapping: source headers are
//! matched against the country column names (case-insensitive, trimmed) and
//! every numeric column is declared as an integer. Cells that cannot be
//! coerced are stored as they are and reported back to the caller.

use log::{info, warn};
use std::fmt;
use std::path::Path;

use crate::country::{Attribute, NAME_COLUMN, NewCountry, Value};
use crate::error::{Error, Result};
use crate::store::RecordStore;
use crate::tabular::{RawCell, RawTable, parse_csv, read_source};

/// How strictly the header row is checked against the country columns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderMode {
    /// Every column must be present (full load)
    RequireAll,
    /// Only `name` is required; absent numeric columns become null (upload)
    RequireName,
}

/// A cell that was stored without being coerced to its declared type
#[derive(Clone, Debug, PartialEq)]
pub struct CoercionIssue {
    /// 1-based data row, not counting the header
    pub row: usize,
    pub column: &'static str,
    pub value: Value,
}

impl fmt::Display for CoercionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}: column {} expects an integer, kept {:?}",
            self.row, self.column, self.value
        )
    }
}

/// Outcome of an ingestion, returned by both entry points
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    /// Rows written to the record store
    pub inserted: usize,
    /// Rows dropped because their name was empty
    pub skipped: usize,
    pub issues: Vec<CoercionIssue>,
}

/// Rows mapped from a table, ready to be written
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Coerced {
    pub rows: Vec<NewCountry>,
    pub skipped: usize,
    pub issues: Vec<CoercionIssue>,
}

/// Header positions of the country columns inside a source table
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMapping {
    name: usize,
    attributes: Vec<(Attribute, usize)>,
}

impl ColumnMapping {
    pub fn resolve(headers: &[String], mode: HeaderMode) -> Result<ColumnMapping> {
        let position = |column: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(column))
        };

        let mut missing = Vec::new();
        let name = position(NAME_COLUMN);
        if name.is_none() {
            missing.push(NAME_COLUMN.to_string());
        }

        let mut attributes = Vec::new();
        for attribute in Attribute::ALL {
            match position(attribute.column()) {
                Some(index) => attributes.push((attribute, index)),
                None if mode == HeaderMode::RequireAll => {
                    missing.push(attribute.column().to_string())
                }
                None => {}
            }
        }

        // Report issues in the order the source columns appear
        attributes.sort_by_key(|&(_, index)| index);

        match name {
            Some(name) if missing.is_empty() => Ok(ColumnMapping { name, attributes }),
            _ => Err(Error::SchemaMismatch { missing }),
        }
    }
}

/// Map every row of `table` onto a [`NewCountry`]
///
/// Entirely empty rows are ignored, rows without a name are skipped and
/// counted, and uncoercible numeric cells are kept and reported.
pub fn coerce_table(table: &RawTable, mode: HeaderMode) -> Result<Coerced> {
    let mapping = ColumnMapping::resolve(&table.headers, mode)?;
    let mut coerced = Coerced::default();

    for (index, row) in table.rows.iter().enumerate() {
        if row.iter().all(RawCell::is_empty) {
            continue;
        }
        let row_number = index + 1;

        let Some(name) = row.get(mapping.name).and_then(coerce_name) else {
            coerced.skipped += 1;
            continue;
        };

        let mut country = NewCountry::named(name);
        for &(attribute, column) in &mapping.attributes {
            let (value, ok) = row.get(column).map_or((Value::Null, true), coerce_integer);
            if !ok {
                coerced.issues.push(CoercionIssue {
                    row: row_number,
                    column: attribute.column(),
                    value: value.clone(),
                });
            }
            country.set(attribute, value);
        }
        coerced.rows.push(country);
    }

    Ok(coerced)
}

/// Replace the record store contents with the spreadsheet at `path`
///
/// # Errors
/// * [`Error::SourceNotFound`] when the spreadsheet is absent
/// * [`Error::SchemaMismatch`] when any country column is missing
/// * [`Error::StorageUnavailable`] when the store cannot be written
pub fn load_spreadsheet(store: &dyn RecordStore, path: impl AsRef<Path>) -> Result<IngestReport> {
    let path = path.as_ref();
    let table = read_source(path)?;
    let coerced = coerce_table(&table, HeaderMode::RequireAll)?;
    let inserted = store.replace_all(&coerced.rows)?;
    info!("full load of {} replaced the table with {} rows", path.display(), inserted);
    Ok(report(inserted, coerced))
}

/// Append the rows of an uploaded CSV payload to the record store
///
/// # Errors
/// * [`Error::EmptyPayload`] when no bytes were supplied
/// * [`Error::ParseError`] when the payload is not a rectangular CSV table
/// * [`Error::SchemaMismatch`] when there is no `name` column
pub fn append_csv(store: &dyn RecordStore, payload: &[u8]) -> Result<IngestReport> {
    if payload.is_empty() {
        return Err(Error::EmptyPayload);
    }
    let table = parse_csv(payload)?;
    let coerced = coerce_table(&table, HeaderMode::RequireName)?;
    let inserted = store.append(&coerced.rows)?;
    info!("upload appended {} rows", inserted);
    Ok(report(inserted, coerced))
}

fn report(inserted: usize, coerced: Coerced) -> IngestReport {
    if coerced.skipped > 0 {
        warn!("skipped {} rows without a name", coerced.skipped);
    }
    for issue in &coerced.issues {
        warn!("{}", issue);
    }
    IngestReport {
        inserted,
        skipped: coerced.skipped,
        issues: coerced.issues,
    }
}

fn coerce_name(cell: &RawCell) -> Option<String> {
    match cell {
        RawCell::Empty => None,
        RawCell::Int(i) => Some(i.to_string()),
        RawCell::Float(f) => Some(f.to_string()),
        RawCell::Bool(b) => Some(b.to_string()),
        RawCell::Text(s) => Some(s.clone()),
    }
}

// Returns the stored value and whether it matched the declared integer type
fn coerce_integer(cell: &RawCell) -> (Value, bool) {
    match cell {
        RawCell::Empty => (Value::Null, true),
        RawCell::Int(i) => (Value::Integer(*i), true),
        RawCell::Bool(b) => (Value::Integer(i64::from(*b)), true),
        RawCell::Float(f) => float_to_value(*f),
        RawCell::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return (Value::Integer(i), true);
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => float_to_value(f),
                _ => (Value::Text(s.to_string()), false),
            }
        }
    }
}

fn float_to_value(f: f64) -> (Value, bool) {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        (Value::Integer(f as i64), true)
    } else {
        (Value::Real(f), false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::SqliteStore;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    #[test]
    fn full_load_requires_every_column() {
        let err = ColumnMapping::resolve(&headers(&["name", "gdp"]), HeaderMode::RequireAll)
            .unwrap_err();
        match err {
            Error::SchemaMismatch { missing } => {
                assert_eq!(
                    missing,
                    vec!["population", "area", "join_year", "avg_income", "border_length"]
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn upload_only_requires_name() {
        assert!(ColumnMapping::resolve(&headers(&[" NAME "]), HeaderMode::RequireName).is_ok());
        assert!(matches!(
            ColumnMapping::resolve(&headers(&["gdp"]), HeaderMode::RequireName),
            Err(Error::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn coercion_keeps_and_reports_bad_cells() {
        let table = RawTable {
            headers: headers(&["id", "name", "gdp", "area"]),
            rows: vec![
                vec![RawCell::Int(9), text("Latvia"), RawCell::Float(40.0), text("64589")],
                vec![RawCell::Empty, text("Estonia"), text("n/a"), RawCell::Float(45.5)],
                vec![RawCell::Empty, RawCell::Empty, text("1"), RawCell::Empty],
                vec![RawCell::Empty, RawCell::Empty, RawCell::Empty, RawCell::Empty],
            ],
        };
        let coerced = coerce_table(&table, HeaderMode::RequireName).unwrap();

        assert_eq!(coerced.rows.len(), 2);
        assert_eq!(coerced.skipped, 1);
        assert_eq!(coerced.rows[0].gdp, Value::Integer(40));
        assert_eq!(coerced.rows[0].area, Value::Integer(64589));
        assert_eq!(coerced.rows[1].gdp, Value::Text("n/a".into()));
        assert_eq!(coerced.rows[1].area, Value::Real(45.5));
        assert_eq!(coerced.rows[1].population, Value::Null);
        assert_eq!(
            coerced.issues,
            vec![
                CoercionIssue {
                    row: 2,
                    column: "gdp",
                    value: Value::Text("n/a".into())
                },
                CoercionIssue {
                    row: 2,
                    column: "area",
                    value: Value::Real(45.5)
                },
            ]
        );
    }

    #[test]
    fn empty_upload_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(append_csv(&store, b""), Err(Error::EmptyPayload)));
    }

    #[test]
    fn upload_appends_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = append_csv(&store, b"name,avg_income\nLatvia,1200\nEstonia,1300\n").unwrap();
        assert_eq!(report.inserted, 2);
        assert!(report.issues.is_empty());

        let report = append_csv(&store, b"name\nFinland\n").unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn unnamed_upload_rows_are_reported_as_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = append_csv(&store, b"name,gdp\nLatvia,40\n,38\nMalta,17\n").unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.count().unwrap(), report.inserted);
    }

    #[test]
    fn attributes_follow_source_column_order() {
        let mapping = ColumnMapping::resolve(
            &headers(&["gdp", "name", "border_length", "population"]),
            HeaderMode::RequireName,
        )
        .unwrap();
        let columns: Vec<usize> = mapping.attributes.iter().map(|&(_, index)| index).collect();
        assert_eq!(columns, vec![0, 2, 3]);
    }
}
