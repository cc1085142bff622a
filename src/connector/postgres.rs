// PostgreSQL backend: one client per entry, with a spawned task driving the
// socket until teardown.
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;

use super::{is_row_returning, Dialect};
use crate::error::DbError;
use crate::models::{QueryOutput, SchemaMap};

fn backend_err(err: tokio_postgres::Error) -> DbError {
    let message = match err.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => err.to_string(),
    };
    DbError::Backend {
        dialect: Dialect::Postgres,
        message,
    }
}

pub(crate) async fn open(
    host: &str,
    user: &str,
    password: &str,
    database: &str,
    port: u16,
) -> Result<(Arc<Client>, JoinHandle<()>), DbError> {
    let (client, connection) = tokio_postgres::Config::new()
        .host(host)
        .port(port)
        .user(user)
        .password(password)
        .dbname(database)
        .connect(NoTls)
        .await
        .map_err(|e| DbError::Connection(e.to_string()))?;

    // The connection future drives backend I/O until the client is dropped.
    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection task ended with error: {}", e);
        }
    });

    Ok((Arc::new(client), driver))
}

/// Enumerate tables in the public schema and their columns in ordinal
/// position order.
pub(crate) async fn schema(client: &Client) -> Result<SchemaMap, DbError> {
    let rows = client
        .query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = 'public'
             ORDER BY table_name",
            &[],
        )
        .await
        .map_err(backend_err)?;

    let mut schema = SchemaMap::new();
    for row in rows {
        let table: String = row.get(0);
        let column_rows = client
            .query(
                "SELECT column_name FROM information_schema.columns
                 WHERE table_schema = 'public' AND table_name = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(backend_err)?;
        let columns = column_rows
            .iter()
            .map(|r| r.get::<_, String>(0))
            .collect();
        schema.insert(table, columns);
    }
    Ok(schema)
}

pub(crate) async fn execute(client: &Client, sql: &str) -> Result<QueryOutput, DbError> {
    if is_row_returning(sql) {
        let stmt = client.prepare(sql).await.map_err(backend_err)?;
        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = client.query(&stmt, &[]).await.map_err(backend_err)?;
        let data = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| value_to_json(row, idx, col.type_()))
                    .collect()
            })
            .collect();
        Ok(QueryOutput::Rows {
            columns,
            rows: data,
        })
    } else {
        let affected = client.execute(sql, &[]).await.map_err(backend_err)?;
        Ok(QueryOutput::Affected {
            rows_affected: affected,
        })
    }
}

fn value_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::INT2 => opt_json(row.try_get::<_, Option<i16>>(idx)),
        Type::INT4 => opt_json(row.try_get::<_, Option<i32>>(idx)),
        Type::INT8 => opt_json(row.try_get::<_, Option<i64>>(idx)),
        Type::FLOAT4 => opt_json(row.try_get::<_, Option<f32>>(idx)),
        Type::FLOAT8 => opt_json(row.try_get::<_, Option<f64>>(idx)),
        Type::BOOL => opt_json(row.try_get::<_, Option<bool>>(idx)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => {
            opt_json(row.try_get::<_, Option<String>>(idx))
        }
        // Timestamps, UUIDs, JSON and friends: fall back to a string
        // rendering where the driver offers one.
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(v)) => json!(v),
            Ok(None) => Value::Null,
            Err(_) => json!(format!("<{}>", ty.name())),
        },
    }
}

fn opt_json<T: serde::Serialize>(value: Result<Option<T>, tokio_postgres::Error>) -> Value {
    match value {
        Ok(Some(v)) => json!(v),
        _ => Value::Null,
    }
}

pub(crate) fn close(client: Arc<Client>, driver: Option<JoinHandle<()>>) {
    // Dropping the client lets the connection task wind down; aborting the
    // task covers the case where another handle clone is still live.
    drop(client);
    if let Some(driver) = driver {
        driver.abort();
    }
}
