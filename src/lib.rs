//! Multi-database abstraction layer: a registry of named SQLite, MySQL and
//! PostgreSQL connections with uniform schema introspection and an adaptive
//! query executor that adapts foreign dialect constructs for SQLite and
//! repairs comparison-operator syntax errors with a single retry.

pub mod config;
pub mod connector;
pub mod error;
pub mod models;

pub use config::{Config, ConnectionDescriptor};
pub use connector::{
    BackendHandle, DatabaseConnector, Dialect, RegexRepairer, RepairMode, SqlRepairer,
};
pub use error::DbError;
pub use models::{QueryOutput, SchemaMap};
