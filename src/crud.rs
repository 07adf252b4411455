//! Record-level CRUD against the SQLite store.
//!
//! [`CrudManager`] holds only a store path; every call opens a fresh
//! connection, so managers are cheap to create and safe to keep around
//! while other code writes to the same store. WHERE and ORDER BY fragments
//! are passed through verbatim, which keeps arbitrary SQL expressions
//! available to callers; values always travel as bound parameters.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, VitalsError};

/// A typed cell value crossing the store boundary.
#[derive(Clone, PartialEq, Debug)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
}

impl SqlValue {
    fn to_sqlite(&self) -> SqliteValue {
        match self {
            Self::Null => SqliteValue::Null,
            Self::Integer(v) => SqliteValue::Integer(*v),
            Self::Real(v) => SqliteValue::Real(*v),
            Self::Text(s) => SqliteValue::Text(s.clone()),
            Self::Boolean(b) => SqliteValue::Integer(i64::from(*b)),
        }
    }

    /// Render as a SQL literal for the `*_by_id` convenience paths.
    fn as_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_owned(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => v.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Boolean(b) => i64::from(*b).to_string(),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// One row as ordered column/value pairs.
pub type Record = Vec<(String, SqlValue)>;

/// One column of a table schema.
#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
}

/// Schema and row count for one table.
#[derive(Clone, Debug)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
}

/// Options for [`CrudManager::read`]. Defaults select every column with no
/// filter, ordering or limit.
#[derive(Clone, Default, Debug)]
pub struct ReadOptions<'a> {
    /// Raw SQL filter, without the `WHERE` keyword.
    pub where_clause: Option<&'a str>,
    /// Column subset; `None` selects `*`.
    pub columns: Option<&'a [&'a str]>,
    /// Raw SQL ordering, without the `ORDER BY` keywords.
    pub order_by: Option<&'a str>,
    pub limit: Option<usize>,
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn table_exists_conn(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// SQLite column affinity for a frame dtype.
pub(crate) fn sql_type_for(dtype: &DataType) -> &'static str {
    if dtype.is_integer() || matches!(dtype, DataType::Boolean) {
        "INTEGER"
    } else if dtype.is_float() {
        "REAL"
    } else {
        // Temporals are stored as ISO-8601 text.
        "TEXT"
    }
}

pub(crate) fn anyvalue_to_sql(av: &AnyValue<'_>) -> SqliteValue {
    match av {
        AnyValue::Null => SqliteValue::Null,
        AnyValue::Boolean(b) => SqliteValue::Integer(i64::from(*b)),
        AnyValue::Int8(v) => SqliteValue::Integer(i64::from(*v)),
        AnyValue::Int16(v) => SqliteValue::Integer(i64::from(*v)),
        AnyValue::Int32(v) => SqliteValue::Integer(i64::from(*v)),
        AnyValue::Int64(v) => SqliteValue::Integer(*v),
        AnyValue::UInt8(v) => SqliteValue::Integer(i64::from(*v)),
        AnyValue::UInt16(v) => SqliteValue::Integer(i64::from(*v)),
        AnyValue::UInt32(v) => SqliteValue::Integer(i64::from(*v)),
        AnyValue::UInt64(v) => SqliteValue::Integer(*v as i64),
        AnyValue::Float32(v) => SqliteValue::Real(f64::from(*v)),
        AnyValue::Float64(v) => SqliteValue::Real(*v),
        AnyValue::String(s) => SqliteValue::Text((*s).to_owned()),
        AnyValue::StringOwned(s) => SqliteValue::Text(s.to_string()),
        other => SqliteValue::Text(other.to_string()),
    }
}

fn sqlvalue_from_ref(value: ValueRef<'_>) -> Result<SqlValue> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(v) => Ok(SqlValue::Integer(v)),
        ValueRef::Real(v) => Ok(SqlValue::Real(v)),
        ValueRef::Text(bytes) => Ok(SqlValue::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        ValueRef::Blob(_) => Err(VitalsError::Store(
            "BLOB columns are not supported".to_owned(),
        )),
    }
}

/// Run an arbitrary SELECT and materialise the rows as a frame.
///
/// Column dtypes follow the values actually seen: any text makes the column
/// text, otherwise any real makes it float, otherwise integer. An empty
/// result set comes back as zero-length string columns.
pub(crate) fn query_to_frame(conn: &Connection, sql: &str) -> Result<DataFrame> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let width = names.len();

    let mut cells: Vec<Vec<SqlValue>> = vec![Vec::new(); width];
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for (i, column) in cells.iter_mut().enumerate() {
            column.push(sqlvalue_from_ref(row.get_ref(i)?)?);
        }
    }

    let mut columns = Vec::with_capacity(width);
    for (name, values) in names.into_iter().zip(cells) {
        let has_text = values.iter().any(|v| matches!(v, SqlValue::Text(_)));
        let has_real = values.iter().any(|v| matches!(v, SqlValue::Real(_)));
        let series = if has_text {
            let vals: Vec<Option<String>> = values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Null => None,
                    SqlValue::Text(s) => Some(s),
                    SqlValue::Integer(i) => Some(i.to_string()),
                    SqlValue::Real(r) => Some(r.to_string()),
                    SqlValue::Boolean(b) => Some(i64::from(b).to_string()),
                })
                .collect();
            Series::new(name.into(), vals)
        } else if has_real {
            let vals: Vec<Option<f64>> = values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Null => None,
                    SqlValue::Real(r) => Some(r),
                    SqlValue::Integer(i) => Some(i as f64),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), vals)
        } else {
            let vals: Vec<Option<i64>> = values
                .into_iter()
                .map(|v| match v {
                    SqlValue::Integer(i) => Some(i),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), vals)
        };
        columns.push(Column::from(series));
    }

    Ok(DataFrame::new(columns)?)
}

/// CRUD interface over one SQLite store file.
pub struct CrudManager {
    store_path: PathBuf,
}

impl CrudManager {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    fn open(&self) -> Result<Connection> {
        Ok(Connection::open(&self.store_path)?)
    }

    fn require_table(&self, conn: &Connection, table: &str) -> Result<()> {
        if !table_exists_conn(conn, table)? {
            return Err(VitalsError::NotFound(format!(
                "table '{table}' does not exist"
            )));
        }
        Ok(())
    }

    fn table_columns(&self, conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(ColumnInfo {
                name: row.get(1)?,
                sql_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
            });
        }
        Ok(columns)
    }

    /// Whether the table exists. Never errors on a missing table.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.open()?;
        table_exists_conn(&conn, table)
    }

    /// Names of all user tables, sorted.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Schema and row count. `NotFound` when the table is absent.
    pub fn table_info(&self, table: &str) -> Result<TableInfo> {
        let conn = self.open()?;
        self.require_table(&conn, table)?;
        let columns = self.table_columns(&conn, table)?;
        let count_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row_count: i64 = conn.query_row(&count_sql, [], |row| row.get(0))?;
        Ok(TableInfo {
            name: table.to_owned(),
            columns,
            row_count: row_count as usize,
        })
    }

    /// Insert one record. The record must supply a value for every table
    /// column; missing columns are a `Validation` error naming them.
    pub fn create(&self, table: &str, record: &Record) -> Result<()> {
        self.create_many(table, std::slice::from_ref(record))
    }

    /// Insert several records in one transaction. All records must cover
    /// the full column set.
    pub fn create_many(&self, table: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Err(VitalsError::Validation(
                "no records to insert".to_owned(),
            ));
        }

        let mut conn = self.open()?;
        self.require_table(&conn, table)?;
        let columns = self.table_columns(&conn, table)?;

        for record in records {
            let provided: HashSet<&str> =
                record.iter().map(|(name, _)| name.as_str()).collect();
            let mut missing: Vec<&str> = columns
                .iter()
                .map(|c| c.name.as_str())
                .filter(|name| !provided.contains(name))
                .collect();
            if !missing.is_empty() {
                missing.sort_unstable();
                return Err(VitalsError::Validation(format!(
                    "record is missing required columns: {}",
                    missing.join(", ")
                )));
            }
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_ident(table)
        );

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in records {
                // Bind in table column order regardless of record order.
                let mut params = Vec::with_capacity(columns.len());
                for column in &columns {
                    let value = record
                        .iter()
                        .find(|(name, _)| name == &column.name)
                        .map(|(_, v)| v.to_sqlite())
                        .unwrap_or(SqliteValue::Null);
                    params.push(value);
                }
                stmt.execute(rusqlite::params_from_iter(params))?;
            }
        }
        tx.commit()?;
        debug!(table, rows = records.len(), "inserted records");
        Ok(())
    }

    /// Read rows as a frame. The where/order fragments in `options` are
    /// spliced into the query verbatim.
    pub fn read(&self, table: &str, options: &ReadOptions<'_>) -> Result<DataFrame> {
        let conn = self.open()?;
        self.require_table(&conn, table)?;

        let projection = match options.columns {
            Some(cols) => cols
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            None => "*".to_owned(),
        };
        let mut sql = format!("SELECT {projection} FROM {}", quote_ident(table));
        if let Some(filter) = options.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some(order) = options.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        query_to_frame(&conn, &sql)
    }

    /// Fetch one record by id, or `None` when no row matches.
    pub fn read_by_id(
        &self,
        table: &str,
        id_column: &str,
        id: &SqlValue,
    ) -> Result<Option<Record>> {
        let conn = self.open()?;
        self.require_table(&conn, table)?;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT 1",
            quote_ident(table),
            quote_ident(id_column)
        );
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();

        let mut rows = stmt.query([id.to_sqlite()])?;
        match rows.next()? {
            None => Ok(None),
            Some(row) => {
                let mut record = Record::with_capacity(names.len());
                for (i, name) in names.into_iter().enumerate() {
                    record.push((name, sqlvalue_from_ref(row.get_ref(i)?)?));
                }
                Ok(Some(record))
            }
        }
    }

    /// Update matching rows, returning the affected row count. A blank
    /// WHERE clause fails before the store is touched.
    pub fn update(&self, table: &str, updates: &Record, where_clause: &str) -> Result<usize> {
        if where_clause.trim().is_empty() {
            return Err(VitalsError::Validation(
                "a WHERE clause is required for UPDATE".to_owned(),
            ));
        }
        if updates.is_empty() {
            return Err(VitalsError::Validation("no columns to update".to_owned()));
        }

        let conn = self.open()?;
        self.require_table(&conn, table)?;

        let assignments = updates
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", quote_ident(name), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {where_clause}",
            quote_ident(table)
        );
        let params: Vec<SqliteValue> = updates.iter().map(|(_, v)| v.to_sqlite()).collect();
        let affected = conn.execute(&sql, rusqlite::params_from_iter(params))?;
        debug!(table, affected, "updated records");
        Ok(affected)
    }

    pub fn update_by_id(
        &self,
        table: &str,
        id_column: &str,
        id: &SqlValue,
        updates: &Record,
    ) -> Result<usize> {
        let filter = format!("{} = {}", quote_ident(id_column), id.as_sql_literal());
        self.update(table, updates, &filter)
    }

    /// Delete matching rows, returning the affected row count. A blank
    /// WHERE clause fails before the store is touched.
    pub fn delete(&self, table: &str, where_clause: &str) -> Result<usize> {
        if where_clause.trim().is_empty() {
            return Err(VitalsError::Validation(
                "a WHERE clause is required for DELETE".to_owned(),
            ));
        }

        let conn = self.open()?;
        self.require_table(&conn, table)?;

        let sql = format!("DELETE FROM {} WHERE {where_clause}", quote_ident(table));
        let affected = conn.execute(&sql, [])?;
        debug!(table, affected, "deleted records");
        Ok(affected)
    }

    pub fn delete_by_id(&self, table: &str, id_column: &str, id: &SqlValue) -> Result<usize> {
        let filter = format!("{} = {}", quote_ident(id_column), id.as_sql_literal());
        self.delete(table, &filter)
    }
}
