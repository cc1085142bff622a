// MySQL backend: one live session per registered entry.
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Row, Value as MySqlValue};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{is_row_returning, Dialect};
use crate::error::DbError;
use crate::models::{QueryOutput, SchemaMap};

fn backend_err(err: mysql_async::Error) -> DbError {
    DbError::Backend {
        dialect: Dialect::Mysql,
        message: err.to_string(),
    }
}

pub(crate) async fn open(
    host: &str,
    user: &str,
    password: &str,
    database: &str,
    port: u16,
) -> Result<Arc<Mutex<Conn>>, DbError> {
    let opts = OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .db_name(Some(database));
    let conn = Conn::new(opts)
        .await
        .map_err(|e| DbError::Connection(e.to_string()))?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Enumerate base tables and their columns from information_schema, scoped
/// to the connection's target database, in ordinal position order.
pub(crate) async fn schema(
    handle: &Arc<Mutex<Conn>>,
    database: &str,
) -> Result<SchemaMap, DbError> {
    let mut conn = handle.lock().await;
    let tables: Vec<String> = conn
        .exec(
            "SELECT TABLE_NAME FROM information_schema.TABLES
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
             ORDER BY TABLE_NAME",
            (database,),
        )
        .await
        .map_err(backend_err)?;

    let mut schema = SchemaMap::new();
    for table in tables {
        let columns: Vec<String> = conn
            .exec(
                "SELECT COLUMN_NAME FROM information_schema.COLUMNS
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
                 ORDER BY ORDINAL_POSITION",
                (database, table.as_str()),
            )
            .await
            .map_err(backend_err)?;
        schema.insert(table, columns);
    }
    Ok(schema)
}

pub(crate) async fn execute(handle: &Arc<Mutex<Conn>>, sql: &str) -> Result<QueryOutput, DbError> {
    let mut conn = handle.lock().await;
    if is_row_returning(sql) {
        // Column names come from the result-set metadata, not the first
        // row, so a no-match SELECT still reports its columns.
        let mut result = conn.query_iter(sql).await.map_err(backend_err)?;
        let columns: Vec<String> = result
            .columns()
            .map(|cols| cols.iter().map(|c| c.name_str().into_owned()).collect())
            .unwrap_or_default();
        let rows: Vec<Row> = result.collect_and_drop().await.map_err(backend_err)?;
        let data = rows
            .into_iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| match row.get_opt::<MySqlValue, usize>(idx) {
                        Some(Ok(value)) => value_to_json(value),
                        _ => Value::Null,
                    })
                    .collect()
            })
            .collect();
        Ok(QueryOutput::Rows {
            columns,
            rows: data,
        })
    } else {
        conn.query_drop(sql).await.map_err(backend_err)?;
        Ok(QueryOutput::Affected {
            rows_affected: conn.affected_rows(),
        })
    }
}

fn value_to_json(value: MySqlValue) -> Value {
    match value {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => json!(s),
            Err(_) => Value::Null,
        },
        MySqlValue::Int(i) => json!(i),
        MySqlValue::UInt(u) => json!(u),
        MySqlValue::Float(f) => json!(f),
        MySqlValue::Double(d) => json!(d),
        MySqlValue::Date(y, m, d, h, min, s, _) => {
            json!(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                y, m, d, h, min, s
            ))
        }
        MySqlValue::Time(is_neg, d, h, m, s, _) => {
            let sign = if is_neg { "-" } else { "" };
            let total_hours = d * 24 + h as u32;
            json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
        }
    }
}

pub(crate) async fn close(handle: Arc<Mutex<Conn>>) -> Result<(), DbError> {
    match Arc::try_unwrap(handle) {
        Ok(mutex) => mutex.into_inner().disconnect().await.map_err(backend_err),
        // A caller still holds a handle clone; dropping our reference is the
        // most we can do here.
        Err(_) => Ok(()),
    }
}
