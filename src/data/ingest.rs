//! Spreadsheet and CSV ingestion for batch predictions
//!
//! Turns an uploaded file into row objects holding exactly the required feature columns.

use crate::{PriceError, Result, FEATURE_NAMES};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::io::Cursor;

/// Upload formats we know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    /// Classify by extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_lowercase().as_str() {
            "csv" => Some(FileKind::Csv),
            "xlsx" => Some(FileKind::Xlsx),
            "xls" => Some(FileKind::Xls),
            _ => None,
        }
    }
}

/// Parsed upload, restricted to the feature columns
#[derive(Debug, Clone, Serialize)]
pub struct IngestedTable {
    pub data: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

/// Raw sheet contents: a header row plus data rows
struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Check an upload's filename and classify it by extension.
///
/// Runs before any bytes are read or parsed.
pub fn check_filename(filename: Option<&str>) -> Result<FileKind> {
    match filename {
        Some(name) if !name.is_empty() => {
            FileKind::from_filename(name).ok_or(PriceError::InvalidFileType)
        }
        _ => Err(PriceError::NoFileSelected),
    }
}

/// Validate and parse an uploaded file
pub fn parse_upload(filename: Option<&str>, bytes: &[u8]) -> Result<IngestedTable> {
    let kind = check_filename(filename)?;
    parse_file(kind, bytes)
}

/// Parse file contents of a known kind and select the feature columns
pub fn parse_file(kind: FileKind, bytes: &[u8]) -> Result<IngestedTable> {
    let sheet = match kind {
        FileKind::Csv => read_csv(bytes)?,
        FileKind::Xlsx => read_workbook::<Xlsx<_>>(bytes)?,
        FileKind::Xls => read_workbook::<Xls<_>>(bytes)?,
    };
    log::debug!(
        "Parsed {:?} upload: {} columns, {} rows",
        kind,
        sheet.headers.len(),
        sheet.rows.len()
    );

    select_features(sheet)
}

/// Keep only the feature columns, in feature order
fn select_features(sheet: Sheet) -> Result<IngestedTable> {
    let mut indices = Vec::with_capacity(FEATURE_NAMES.len());
    let mut missing = Vec::new();
    for name in FEATURE_NAMES {
        match sheet.headers.iter().position(|h| h == name) {
            Some(idx) => indices.push(idx),
            None => missing.push(name.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(PriceError::MissingColumns(missing));
    }

    let data: Vec<Map<String, Value>> = sheet
        .rows
        .into_iter()
        .map(|row| {
            FEATURE_NAMES
                .iter()
                .zip(&indices)
                .map(|(name, &idx)| {
                    let value = row.get(idx).cloned().unwrap_or(Value::Null);
                    (name.to_string(), value)
                })
                .collect()
        })
        .collect();

    Ok(IngestedTable {
        row_count: data.len(),
        columns: FEATURE_NAMES.iter().map(|c| c.to_string()).collect(),
        data,
    })
}

fn read_csv(bytes: &[u8]) -> Result<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(text_to_value).collect());
    }

    Ok(Sheet { headers, rows })
}

fn read_workbook<R>(bytes: &[u8]) -> Result<Sheet>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let mut workbook = R::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| PriceError::Spreadsheet(e.to_string()))?;
    let range: Range<Data> = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PriceError::Spreadsheet("workbook has no sheets".to_string()))?
        .map_err(|e| PriceError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header) => header.iter().map(|cell| cell.to_string()).collect(),
        None => Vec::new(),
    };
    let rows = rows
        .map(|row| row.iter().map(cell_to_value).collect())
        .collect();

    Ok(Sheet { headers, rows })
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// CSV cells are text; numbers become JSON numbers, blanks become null
fn text_to_value(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => float_value(f),
        _ => Value::String(text.to_string()),
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_value(*f),
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Empty => Value::Null,
        other => Value::String(other.to_string()),
    }
}
