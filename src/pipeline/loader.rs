//! Dataset ingestion and persistence.
//!
//! CSV and JSON files, JSON HTTP APIs, and a SQLite store for round-trips.
//! Schema inference is left to the reader; cleaning happens downstream.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use polars::prelude::*;
use rusqlite::Connection;
use serde_json::Value;
use tracing::debug;

use crate::crud::{
    anyvalue_to_sql, query_to_frame, quote_ident, sql_type_for, table_exists_conn,
    valid_table_name,
};
use crate::error::{Result, VitalsError};

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do when the target table already exists.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WriteMode {
    /// Drop and recreate the table.
    Replace,
    /// Append rows to the existing table.
    Append,
    /// Fail with a `Validation` error.
    Fail,
}

/// Load a CSV file, inferring the schema from up to 10k rows.
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(VitalsError::NotFound(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| VitalsError::Parse(format!("failed to read CSV: {e}")))?;

    debug!(path = %path.display(), rows = df.height(), cols = df.width(), "loaded CSV");
    Ok(df)
}

fn frame_from_records(records: Vec<Value>) -> Result<DataFrame> {
    let bytes = serde_json::to_vec(&Value::Array(records))?;
    let df = JsonReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|e| VitalsError::Parse(format!("failed to read JSON records: {e}")))?;
    Ok(df)
}

/// Load a JSON file holding an array of objects. A single top-level object
/// is promoted to a one-row dataset.
pub fn load_json(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(VitalsError::NotFound(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let raw = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    let records = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => {
            return Err(VitalsError::Parse(
                "JSON file must hold an array of objects or a single object".to_owned(),
            ))
        }
    };

    let df = frame_from_records(records)?;
    debug!(path = %path.display(), rows = df.height(), "loaded JSON");
    Ok(df)
}

pub(crate) fn tabular_payload(value: Value, nested_key: Option<&str>) -> Result<Vec<Value>> {
    let value = match nested_key {
        Some(key) => value.get(key).cloned().ok_or_else(|| {
            VitalsError::Format(format!("response has no '{key}' key"))
        })?,
        None => value,
    };

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            // Some APIs nest the record list one level down; take the first
            // list-valued entry, else treat the object as a single record.
            for entry in map.values() {
                if let Value::Array(items) = entry {
                    return Ok(items.clone());
                }
            }
            Ok(vec![Value::Object(map)])
        }
        _ => Err(VitalsError::Format(
            "response has no usable tabular data".to_owned(),
        )),
    }
}

/// Fetch JSON from an HTTP API and shape it into a frame.
///
/// One GET with a 10 second timeout, no retries. `nested_key` selects the
/// record list inside a wrapper object.
pub fn load_from_api(
    url: &str,
    query: &[(&str, &str)],
    nested_key: Option<&str>,
) -> Result<DataFrame> {
    let agent = ureq::AgentBuilder::new().timeout(API_TIMEOUT).build();
    let mut request = agent.get(url);
    for (key, value) in query {
        request = request.query(key, value);
    }

    debug!(url, "fetching dataset from API");
    let response = request.call()?;
    let body: Value = response
        .into_json()
        .map_err(|e| VitalsError::Parse(format!("response body is not valid JSON: {e}")))?;

    let records = tabular_payload(body, nested_key)?;
    let df = frame_from_records(records)?;
    debug!(url, rows = df.height(), "loaded API dataset");
    Ok(df)
}

/// Write a frame to a table in the SQLite store.
///
/// Fails on an empty frame or an invalid table name before the store is
/// opened. Integer and boolean columns map to INTEGER, floats to REAL,
/// everything else (temporals included) to TEXT.
pub fn persist(df: &DataFrame, store_path: &Path, table: &str, mode: WriteMode) -> Result<()> {
    if df.height() == 0 {
        return Err(VitalsError::Validation(
            "refusing to persist an empty dataset".to_owned(),
        ));
    }
    if !valid_table_name(table) {
        return Err(VitalsError::Validation(format!(
            "invalid table name: '{table}'"
        )));
    }

    if let Some(parent) = store_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut conn = Connection::open(store_path)?;
    let exists = table_exists_conn(&conn, table)?;
    match mode {
        WriteMode::Fail if exists => {
            return Err(VitalsError::Validation(format!(
                "table '{table}' already exists"
            )));
        }
        WriteMode::Replace if exists => {
            conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;
        }
        _ => {}
    }

    let column_defs = df
        .get_columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name()), sql_type_for(c.dtype())))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} ({column_defs})",
            quote_ident(table)
        ),
        [],
    )?;

    let column_list = df
        .get_columns()
        .iter()
        .map(|c| quote_ident(c.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=df.width())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        quote_ident(table)
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        let columns = df.get_columns();
        for row in 0..df.height() {
            let mut params = Vec::with_capacity(columns.len());
            for column in columns {
                let av = column.as_materialized_series().get(row)?;
                params.push(anyvalue_to_sql(&av));
            }
            stmt.execute(rusqlite::params_from_iter(params))?;
        }
    }
    tx.commit()?;

    debug!(store = %store_path.display(), table, rows = df.height(), "persisted dataset");
    Ok(())
}

/// Read a table (or a custom SELECT) from the store back into a frame.
pub fn read_table(store_path: &Path, table: &str, query: Option<&str>) -> Result<DataFrame> {
    if !store_path.exists() {
        return Err(VitalsError::NotFound(format!(
            "store not found: {}",
            store_path.display()
        )));
    }

    let conn = Connection::open(store_path)?;
    if !table_exists_conn(&conn, table)? {
        return Err(VitalsError::Validation(format!(
            "table '{table}' does not exist"
        )));
    }

    let default_sql = format!("SELECT * FROM {}", quote_ident(table));
    let sql = query.unwrap_or(&default_sql);
    let df = query_to_frame(&conn, sql)?;
    debug!(store = %store_path.display(), table, rows = df.height(), "read table");
    Ok(df)
}

/// Export a frame to CSV with a header row.
pub fn export_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| VitalsError::Io(std::io::Error::other(e.to_string())))?;
    debug!(path = %path.display(), rows = df.height(), "exported CSV");
    Ok(())
}
