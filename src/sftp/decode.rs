//! Decoding of fetched file contents.
//!
//! Delimited text is parsed with the `csv` crate and each column gets a single
//! inferred type: integer, then float, then boolean, falling back to text.
//! Empty cells become `Null` and do not take part in inference. Integers that
//! overflow `i64` stay text, as do spellings like `NaN` or `inf`.

use crate::table::{ColumnInfo, Row, Table, Value};
use csv::{ReaderBuilder, StringRecord};

/// Decodes raw bytes as UTF-8.
pub fn decode_utf8(bytes: Vec<u8>) -> Result<String, String> {
    String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))
}

/// Parses comma-delimited text into a table.
///
/// Without `column_names` the first record is the header. With them, every
/// record is data and the names are assigned left to right; each record must
/// then have exactly one field per name.
pub fn parse_delimited(content: &str, column_names: Option<&[String]>) -> Result<Table, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(column_names.is_none())
        .delimiter(b',')
        .from_reader(content.as_bytes());

    let names: Vec<String> = match column_names {
        Some(names) => names.to_vec(),
        None => {
            let header = reader.headers().map_err(|e| e.to_string())?;
            if header.is_empty() {
                return Err("no header line".to_string());
            }
            header.iter().map(String::from).collect()
        }
    };

    let mut records: Vec<StringRecord> = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        if record.len() != names.len() {
            return Err(format!(
                "record {} has {} fields, expected {}",
                index + 1,
                record.len(),
                names.len()
            ));
        }
        records.push(record);
    }

    let kinds: Vec<Kind> = (0..names.len())
        .map(|col| infer_kind(records.iter().map(|r| &r[col])))
        .collect();

    let columns = names
        .into_iter()
        .zip(&kinds)
        .map(|(name, kind)| ColumnInfo::new(name, kind.as_str()))
        .collect();

    let rows: Vec<Row> = records
        .iter()
        .map(|record| {
            record
                .iter()
                .zip(&kinds)
                .map(|(cell, kind)| kind.convert(cell))
                .collect()
        })
        .collect();

    Ok(Table::with_data(columns, rows))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Float,
    Bool,
    Text,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Int => "integer",
            Kind::Float => "float",
            Kind::Bool => "boolean",
            Kind::Text => "text",
        }
    }

    fn accepts(&self, cell: &str) -> bool {
        match self {
            Kind::Int => cell.parse::<i64>().is_ok(),
            Kind::Float if is_integral(cell) => cell.parse::<i64>().is_ok(),
            Kind::Float => is_decimal(cell) && cell.parse::<f64>().is_ok(),
            Kind::Bool => parse_bool(cell).is_some(),
            Kind::Text => true,
        }
    }

    fn convert(&self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            Kind::Int => cell.parse().map(Value::Int).unwrap_or(Value::Null),
            Kind::Float => cell.parse().map(Value::Float).unwrap_or(Value::Null),
            Kind::Bool => parse_bool(cell).map(Value::Bool).unwrap_or(Value::Null),
            Kind::Text => Value::String(cell.to_string()),
        }
    }
}

/// Optional sign followed by digits only.
fn is_integral(cell: &str) -> bool {
    let digits = cell.strip_prefix(['+', '-']).unwrap_or(cell);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Plain decimal or exponent notation, with at least one digit.
fn is_decimal(cell: &str) -> bool {
    cell.bytes().any(|b| b.is_ascii_digit())
        && cell
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Narrowest kind accepting every non-empty cell. All-empty columns are text.
fn infer_kind<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> Kind {
    let mut present = cells.filter(|c| !c.is_empty()).peekable();
    if present.peek().is_none() {
        return Kind::Text;
    }
    [Kind::Int, Kind::Float, Kind::Bool]
        .into_iter()
        .find(|kind| present.clone().all(|c| kind.accepts(c)))
        .unwrap_or(Kind::Text)
}
