//! Row payload encoding for embedding JSON into SQL string literals.
//!
//! Rows are serialized to compact JSON, then `'` becomes `''` and `\` becomes
//! `\\`. Both replacements are made in a single pass over the serialized
//! characters, so neither can see the other's output.

use crate::error::{IngestError, Result};
use crate::table::{ColumnInfo, Table, Value};
use serde::Serialize;

/// Name of the single column produced by [`encode_table`].
pub const PAYLOAD_COLUMN: &str = "payload";

/// Escapes quotes and backslashes for a single-quoted SQL literal.
pub fn escape_sql_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\\' => escaped.push_str("\\\\"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Serializes one row to compact JSON and escapes it.
pub fn encode<T: Serialize + ?Sized>(row: &T) -> Result<String> {
    let json = serde_json::to_string(row)
        .map_err(|e| IngestError::internal(format!("Failed to serialize row: {e}")))?;
    Ok(escape_sql_string(&json))
}

/// Encodes every row of `table` into a one-column `payload` table.
///
/// Each row becomes a JSON object keyed by column name, in column order.
pub fn encode_table(table: &Table) -> Result<Table> {
    let rows = table
        .records()
        .map(|record| {
            let object: serde_json::Map<String, serde_json::Value> = record
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect();
            encode(&object).map(|payload| vec![Value::String(payload)])
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Table::with_data(
        vec![ColumnInfo::new(PAYLOAD_COLUMN, "text")],
        rows,
    ))
}
