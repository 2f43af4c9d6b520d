use std::path::Path;

use crate::error::{Error, Result};

/// One cell of a source table before it is mapped onto a country field
#[derive(Clone, Debug, PartialEq)]
pub enum RawCell {
    Empty,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl RawCell {
    /// Text from a CSV field; blank fields are empty cells
    pub fn from_text(text: &str) -> RawCell {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RawCell::Empty)
    }
}

/// A rectangular table: one header row and data rows of the same width
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

/// Read a tabular source file, picking the reader from the file extension
///
/// # Arguments
/// * `filepath` - Workbook (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`) or `.csv` file
///
/// # Errors
/// * [`Error::SourceNotFound`] when the file does not exist
/// * [`Error::ParseError`] for unsupported extensions or undecodable content
pub fn read_source(filepath: impl AsRef<Path>) -> Result<RawTable> {
    let path = filepath.as_ref();
    if !path.exists() {
        return Err(Error::SourceNotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => parse_csv(&std::fs::read(path)?),
        Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => {
            read_workbook(path)
        }
        Some(ext) => Err(Error::ParseError(format!(
            "unsupported file extension: {}",
            ext
        ))),
        None => Err(Error::ParseError("file has no extension".to_string())),
    }
}

/// Read the first worksheet of a workbook
///
/// The first row of the used range is the header; every following row is
/// padded to the header width.
pub fn read_workbook(filepath: impl AsRef<Path>) -> Result<RawTable> {
    use calamine::{Data, Reader, open_workbook_auto};

    let path = filepath.as_ref();
    if !path.exists() {
        return Err(Error::SourceNotFound(path.to_path_buf()));
    }

    let mut workbook =
        open_workbook_auto(path).map_err(|e| Error::ParseError(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::ParseError("no sheets found in workbook".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::ParseError(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|cell| cell.to_string().trim().to_string()).collect(),
        None => return Ok(RawTable::default()),
    };
    let width = headers.len();

    let rows: Vec<Vec<RawCell>> = rows
        .map(|row| {
            let mut cells: Vec<RawCell> = row
                .iter()
                .map(|cell| match cell {
                    Data::Empty => RawCell::Empty,
                    Data::Int(i) => RawCell::Int(*i),
                    Data::Float(f) => RawCell::Float(*f),
                    Data::Bool(b) => RawCell::Bool(*b),
                    Data::String(s) => RawCell::from_text(s),
                    other => RawCell::from_text(&other.to_string()),
                })
                .collect();
            cells.resize(width, RawCell::Empty);
            cells
        })
        .collect();

    Ok(RawTable { headers, rows })
}

/// Parse a comma-separated payload into a rectangular table
///
/// Quoted fields may contain commas, doubled quotes and line breaks. Blank
/// lines are skipped. Rows shorter than the header are padded with empty
/// cells; a row with more fields than the header is a parse error.
pub fn parse_csv(bytes: &[u8]) -> Result<RawTable> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::ParseError(format!("payload is not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = split_records(text)?.into_iter();
    let (_, header) = records
        .next()
        .ok_or_else(|| Error::ParseError("payload has no header row".to_string()))?;
    let headers: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let width = headers.len();

    let mut rows = Vec::new();
    for (line, fields) in records {
        if fields.len() > width {
            return Err(Error::ParseError(format!(
                "line {}: expected {} fields, found {}",
                line,
                width,
                fields.len()
            )));
        }
        let mut row: Vec<RawCell> = fields.iter().map(|f| RawCell::from_text(f)).collect();
        row.resize(width, RawCell::Empty);
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

// Split CSV text into records, each tagged with the line it starts on
fn split_records(text: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                push_record(&mut records, record_line, std::mem::take(&mut fields));
                line += 1;
                record_line = line;
            }
            '\n' => {
                field.push(c);
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(Error::ParseError(format!(
            "unterminated quoted field starting on line {}",
            record_line
        )));
    }

    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_record(&mut records, record_line, fields);
    }

    Ok(records)
}

fn push_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    if fields.len() == 1 && fields[0].trim().is_empty() {
        return;
    }
    records.push((line, fields));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quoted_fields_and_crlf() {
        let table =
            parse_csv(b"name,gdp\r\n\"Bosnia, and more\",12\r\n\"Say \"\"hi\"\"\",\r\n").unwrap();
        assert_eq!(table.headers, vec!["name", "gdp"]);
        assert_eq!(
            table.rows,
            vec![
                vec![RawCell::Text("Bosnia, and more".into()), RawCell::Text("12".into())],
                vec![RawCell::Text("Say \"hi\"".into()), RawCell::Empty],
            ]
        );
    }

    #[test]
    fn newline_inside_quotes_and_blank_lines() {
        let table = parse_csv(b"name,area\n\n\"Two\nLines\",5\n\nLast,6").unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], RawCell::Text("Two\nLines".into()));
        assert_eq!(table.rows[1][1], RawCell::Text("6".into()));
    }

    #[test]
    fn short_rows_are_padded() {
        let table = parse_csv(b"name,gdp,area\nMalta\n").unwrap();
        assert_eq!(
            table.rows[0],
            vec![RawCell::Text("Malta".into()), RawCell::Empty, RawCell::Empty]
        );
    }

    #[test]
    fn long_row_is_not_rectangular() {
        let err = parse_csv(b"name,gdp\nMalta,1,2\n").unwrap_err();
        match err {
            Error::ParseError(msg) => assert!(msg.contains("line 2")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn unterminated_quote_fails() {
        assert!(matches!(
            parse_csv(b"name\n\"Malta\n"),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn invalid_utf8_fails() {
        assert!(matches!(parse_csv(&[0xff, 0xfe, b'a']), Err(Error::ParseError(_))));
    }

    #[test]
    fn whitespace_only_has_no_header() {
        assert!(matches!(parse_csv(b" \n\n"), Err(Error::ParseError(_))));
    }

    #[test]
    fn bom_is_stripped() {
        let table = parse_csv("\u{feff}name\nMalta\n".as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["name"]);
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("programmesana.xlsx");
        assert!(matches!(read_source(&path), Err(Error::SourceNotFound(p)) if p == path));
    }

    #[test]
    fn unknown_extension_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "name\n").unwrap();
        assert!(matches!(read_source(&path), Err(Error::ParseError(_))));
    }
}
