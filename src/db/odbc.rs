//! ODBC connector implementation.
//!
//! Provides `OdbcConnector`, which implements the `Connector` trait on top of
//! the system ODBC driver manager using odbc-api. Rows are fetched one at a
//! time and every cell is read as text in full, so unbounded columns such as
//! `NVARCHAR(MAX)` are never truncated. Cells are then converted into
//! [`Table`] values using the column types the driver reports.

use super::{Connection, Connector};
use crate::error::{IngestError, Result};
use crate::table::{ColumnInfo, Row, Table, Value};
use odbc_api::{ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};
use tracing::debug;

/// Connector backed by an ODBC environment.
pub struct OdbcConnector {
    env: Environment,
}

impl OdbcConnector {
    /// Creates the ODBC environment.
    pub fn new() -> Result<Self> {
        let env = Environment::new()
            .map_err(|e| IngestError::internal(format!("Failed to create ODBC environment: {e}")))?;
        Ok(Self { env })
    }
}

impl Connector for OdbcConnector {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection + '_>> {
        let connection = self
            .env
            .connect_with_connection_string(connection_string, ConnectionOptions::default())
            .map_err(map_connection_error)?;
        debug!("Successfully connected to database");
        Ok(Box::new(OdbcConnection {
            inner: Some(connection),
        }))
    }
}

struct OdbcConnection<'env> {
    inner: Option<odbc_api::Connection<'env>>,
}

impl Connection for OdbcConnection<'_> {
    fn execute_query(&mut self, sql: &str) -> Result<Table> {
        let connection = self
            .inner
            .as_ref()
            .ok_or_else(|| IngestError::internal("connection already closed"))?;

        let Some(mut cursor) = connection
            .execute(sql, ())
            .map_err(|e| IngestError::query(format_query_error(e)))?
        else {
            // Statements without a result set (DDL, DML) produce no rows.
            return Ok(Table::new());
        };

        let names: Vec<String> = cursor
            .column_names()
            .map_err(|e| IngestError::query(format_query_error(e)))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| IngestError::query(format_query_error(e)))?;

        let mut types = Vec::with_capacity(names.len());
        for index in 1..=names.len() {
            let data_type = cursor
                .col_data_type(index as u16)
                .map_err(|e| IngestError::query(format_query_error(e)))?;
            types.push(data_type);
        }

        let columns = names
            .iter()
            .zip(&types)
            .map(|(name, data_type)| ColumnInfo::new(name.as_str(), type_name(data_type)))
            .collect();

        let mut rows: Vec<Row> = Vec::new();
        let mut buf = Vec::new();
        while let Some(mut cursor_row) = cursor
            .next_row()
            .map_err(|e| IngestError::query(format_query_error(e)))?
        {
            let mut row = Vec::with_capacity(types.len());
            for (index, data_type) in types.iter().enumerate() {
                // get_text grows `buf` until the whole value fits.
                let not_null = cursor_row
                    .get_text((index + 1) as u16, &mut buf)
                    .map_err(|e| IngestError::query(format_query_error(e)))?;
                let cell = not_null.then_some(buf.as_slice());
                row.push(convert_value(cell, data_type));
            }
            rows.push(row);
        }

        Ok(Table::with_data(columns, rows))
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle disconnects.
        if self.inner.take().is_some() {
            debug!("ODBC connection released");
        }
        Ok(())
    }
}

/// Converts one text cell to a `Value` using the driver-reported column type.
fn convert_value(cell: Option<&[u8]>, data_type: &DataType) -> Value {
    let Some(bytes) = cell else {
        return Value::Null;
    };
    let text = String::from_utf8_lossy(bytes);

    match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::String(text.into_owned())),
        DataType::Real | DataType::Float { .. } | DataType::Double => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::String(text.into_owned())),
        DataType::Bit => match text.trim() {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => Value::String(other.to_string()),
        },
        _ => Value::String(text.into_owned()),
    }
}

fn type_name(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => "integer",
        DataType::Real | DataType::Float { .. } | DataType::Double => "float",
        DataType::Bit => "bit",
        DataType::Decimal { .. } | DataType::Numeric { .. } => "decimal",
        DataType::Date => "date",
        DataType::Time { .. } => "time",
        DataType::Timestamp { .. } => "timestamp",
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            "binary"
        }
        _ => "text",
    }
}

/// Maps driver connect errors to user-friendly query errors.
fn map_connection_error(error: odbc_api::Error) -> IngestError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("login failed") {
        IngestError::query("Login failed. Check the credentials behind the logical name.")
    } else if error_str.contains("can't open lib")
        || error_str.contains("data source name not found")
    {
        IngestError::query(format!(
            "ODBC driver not found. Check that the configured driver is installed: {error}"
        ))
    } else if error_str.contains("timeout") || error_str.contains("timed out") {
        IngestError::query(format!("Connection timed out: {error}"))
    } else {
        IngestError::query(format!("Failed to connect: {error}"))
    }
}

fn format_query_error(error: odbc_api::Error) -> String {
    error.to_string()
}
