use thiserror::Error;

use crate::connector::Dialect;

/// Errors surfaced by the connection and execution layer.
///
/// No raw driver error escapes a public operation; everything is folded into
/// one of these variants with a display string suitable for the caller.
#[derive(Debug, Error)]
pub enum DbError {
    /// The requested name is absent from the registry.
    #[error("Database connection not found")]
    UnknownConnection,

    /// Connection establishment failed; converted to a `false` return at the
    /// `add_*` boundary and never propagated further.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operational error reported by a backend during introspection or
    /// execution.
    #[error("{dialect} error: {message}")]
    Backend { dialect: Dialect, message: String },

    /// Failure inside the repair pass itself. The executor logs this and
    /// surfaces the original backend error instead.
    #[error("Repair error: {0}")]
    Repair(String),
}
