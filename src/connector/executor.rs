//! Adaptive query execution: dialect adaptation up front, one repair-and-retry
//! cycle when SQLite rejects a statement with a comparison-shaped syntax error.

use tracing::{error, info, warn};

use super::repair::RepairMode;
use super::{mysql, postgres, sqlite, BackendHandle, DatabaseConnector, Dialect};
use crate::error::DbError;
use crate::models::QueryOutput;

impl DatabaseConnector {
    /// Run `sql` against the named connection.
    ///
    /// SQLite targets get the statement adapted for their dialect first. If
    /// SQLite then reports a syntax error that mentions a comparison
    /// operator, the statement is repaired and retried exactly once; the
    /// retry's outcome is final.
    pub async fn execute_query(&self, name: &str, sql: &str) -> Result<QueryOutput, DbError> {
        let Some((dialect, handle, _params)) = self.lookup(name).await else {
            error!("Database connection {} not found", name);
            return Err(DbError::UnknownConnection);
        };

        let adapted = match dialect {
            Dialect::Sqlite => self.adapter.adapt_for_sqlite(sql),
            Dialect::Mysql | Dialect::Postgres => sql.to_string(),
        };

        let result = match run_statement(&handle, &adapted).await {
            Ok(output) => Ok(output),
            Err(err) if dialect == Dialect::Sqlite && is_repairable(&err) => {
                self.repair_and_retry(&handle, &adapted, err).await
            }
            Err(err) => Err(err),
        };

        if let Err(e) = &result {
            error!("Error executing query on {}: {}", name, e);
        }
        result
    }

    // The adapted statement is not re-adapted before the retry; the repairer
    // only reshapes comparisons and never reintroduces foreign syntax.
    async fn repair_and_retry(
        &self,
        handle: &BackendHandle,
        failed_sql: &str,
        original: DbError,
    ) -> Result<QueryOutput, DbError> {
        let repaired = match self.repairer.repair(failed_sql, RepairMode::Conservative) {
            Ok(repaired) => repaired,
            Err(e) => {
                warn!("SQL repair failed: {}", e);
                return Err(original);
            }
        };
        if repaired == failed_sql {
            // Nothing changed, so a retry would fail identically.
            return Err(original);
        }
        info!("Retrying with repaired SQL: {}", repaired);
        run_statement(handle, &repaired).await
    }
}

async fn run_statement(handle: &BackendHandle, sql: &str) -> Result<QueryOutput, DbError> {
    match handle {
        BackendHandle::Sqlite(conn) => sqlite::execute(conn, sql).await,
        BackendHandle::Mysql(conn) => mysql::execute(conn, sql).await,
        BackendHandle::Postgres(client) => postgres::execute(client, sql).await,
    }
}

/// A backend error qualifies for repair when it is a syntax error whose
/// message mentions a comparison operator character.
fn is_repairable(err: &DbError) -> bool {
    let DbError::Backend { message, .. } = err else {
        return false;
    };
    message.to_lowercase().contains("syntax error")
        && (message.contains('<') || message.contains('>'))
}
