// SQLite backend: file-based sessions behind an async-friendly lock.
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{is_row_returning, Dialect};
use crate::error::DbError;
use crate::models::{QueryOutput, SchemaMap};

fn backend_err(err: rusqlite::Error) -> DbError {
    DbError::Backend {
        dialect: Dialect::Sqlite,
        message: err.to_string(),
    }
}

pub(crate) fn open(path: &Path) -> Result<Arc<Mutex<Connection>>, DbError> {
    let conn = Connection::open(path).map_err(|e| DbError::Connection(e.to_string()))?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Enumerate user tables and their columns in declaration order. Tables
/// prefixed `sqlite_` are internal to SQLite itself and skipped.
pub(crate) async fn schema(handle: &Arc<Mutex<Connection>>) -> Result<SchemaMap, DbError> {
    let conn = handle.lock().await;
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .map_err(backend_err)?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(backend_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend_err)?;

    let mut schema = SchemaMap::new();
    for table in tables {
        if table.starts_with("sqlite_") {
            continue;
        }
        let mut columns_stmt = conn
            .prepare("SELECT name FROM pragma_table_info(?1)")
            .map_err(backend_err)?;
        let columns = columns_stmt
            .query_map(rusqlite::params![table], |row| row.get::<_, String>(0))
            .map_err(backend_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend_err)?;
        schema.insert(table, columns);
    }
    Ok(schema)
}

pub(crate) async fn execute(
    handle: &Arc<Mutex<Connection>>,
    sql: &str,
) -> Result<QueryOutput, DbError> {
    let conn = handle.lock().await;
    if is_row_returning(sql) {
        fetch_rows(&conn, sql)
    } else {
        // Autocommit: the statement is its own implicitly committed
        // transaction.
        match conn.execute(sql, []) {
            Ok(affected) => Ok(QueryOutput::Affected {
                rows_affected: affected as u64,
            }),
            // Statements like WITH ... SELECT return rows without the
            // SELECT prefix; run them as queries instead.
            Err(rusqlite::Error::ExecuteReturnedResults) => fetch_rows(&conn, sql),
            Err(e) => Err(backend_err(e)),
        }
    }
}

fn fetch_rows(conn: &Connection, sql: &str) -> Result<QueryOutput, DbError> {
    let mut stmt = conn.prepare(sql).map_err(backend_err)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();
    let mut rows = stmt.query([]).map_err(backend_err)?;
    let mut data = Vec::new();
    while let Some(row) = rows.next().map_err(backend_err)? {
        let mut record = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            record.push(value_to_json(row.get_ref(idx).map_err(backend_err)?));
        }
        data.push(record);
    }
    Ok(QueryOutput::Rows {
        columns,
        rows: data,
    })
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => json!(String::from_utf8_lossy(b)),
    }
}

pub(crate) fn close(handle: Arc<Mutex<Connection>>) -> Result<(), DbError> {
    match Arc::try_unwrap(handle) {
        Ok(mutex) => mutex.into_inner().close().map_err(|(_, e)| backend_err(e)),
        // A caller still holds a handle clone; dropping our reference is the
        // most we can do here.
        Err(_) => Ok(()),
    }
}
