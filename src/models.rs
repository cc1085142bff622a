use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Point-in-time table → columns mapping obtained by live introspection.
///
/// Computed fresh on every call; staleness is the caller's concern.
pub type SchemaMap = HashMap<String, Vec<String>>;

/// Outcome of a successfully executed statement.
///
/// Row-returning statements carry their column names and fetched rows; any
/// other statement is implicitly committed and reports the affected row
/// count. The variant is never partially filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Affected {
        rows_affected: u64,
    },
}

impl QueryOutput {
    /// Number of fetched rows, or `None` for a mutating statement.
    pub fn row_count(&self) -> Option<usize> {
        match self {
            QueryOutput::Rows { rows, .. } => Some(rows.len()),
            QueryOutput::Affected { .. } => None,
        }
    }
}
