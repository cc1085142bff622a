// Database abstraction layer: named heterogeneous connections behind one
// uniform interface.
mod dialect;
mod executor;
mod mysql;
mod postgres;
mod repair;
mod sqlite;

pub use repair::{RegexRepairer, RepairMode, SqlRepairer};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, ConnectionDescriptor};
use crate::models::SchemaMap;
use dialect::DialectAdapter;

/// The SQL syntax variant spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Mysql,
    Postgres,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "SQLite",
            Dialect::Mysql => "MySQL",
            Dialect::Postgres => "PostgreSQL",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live session for one registered backend.
#[derive(Clone)]
pub enum BackendHandle {
    Sqlite(Arc<Mutex<rusqlite::Connection>>),
    Mysql(Arc<Mutex<mysql_async::Conn>>),
    Postgres(Arc<tokio_postgres::Client>),
}

/// Constructor parameters, retained to allow reconnection policies later.
#[derive(Clone)]
pub enum ConnectParams {
    Sqlite {
        path: PathBuf,
    },
    Mysql {
        host: String,
        user: String,
        password: String,
        database: String,
        port: u16,
    },
    Postgres {
        host: String,
        user: String,
        password: String,
        database: String,
        port: u16,
    },
}

impl ConnectParams {
    /// Target database name, where the dialect has one.
    pub fn database(&self) -> Option<&str> {
        match self {
            ConnectParams::Sqlite { .. } => None,
            ConnectParams::Mysql { database, .. } => Some(database),
            ConnectParams::Postgres { database, .. } => Some(database),
        }
    }
}

struct ConnectionEntry {
    dialect: Dialect,
    handle: BackendHandle,
    params: ConnectParams,
    // Task driving the PostgreSQL socket; absent for other backends.
    driver: Option<JoinHandle<()>>,
}

/// Registry of named backend connections plus the adaptive execution layer.
///
/// Owned by the host application and shared by dependency injection; there
/// is no global instance.
pub struct DatabaseConnector {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
    adapter: DialectAdapter,
    repairer: Box<dyn SqlRepairer>,
}

impl DatabaseConnector {
    pub fn new() -> Self {
        Self::with_repairer(Box::new(RegexRepairer::new()))
    }

    /// Substitute a different repair strategy, e.g. a parser-based one.
    pub fn with_repairer(repairer: Box<dyn SqlRepairer>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            adapter: DialectAdapter::new(),
            repairer,
        }
    }

    /// Open a SQLite session eagerly and register it under `name`.
    pub async fn add_sqlite_connection(&self, name: &str, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let handle = match sqlite::open(path) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Error connecting to SQLite database {}: {}", name, e);
                return false;
            }
        };
        let entry = ConnectionEntry {
            dialect: Dialect::Sqlite,
            handle: BackendHandle::Sqlite(handle),
            params: ConnectParams::Sqlite {
                path: path.to_path_buf(),
            },
            driver: None,
        };
        self.insert(name, entry).await
    }

    /// Open a MySQL session eagerly and register it under `name`.
    pub async fn add_mysql_connection(
        &self,
        name: &str,
        host: &str,
        user: &str,
        password: &str,
        database: &str,
        port: u16,
    ) -> bool {
        let handle = match mysql::open(host, user, password, database, port).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Error connecting to MySQL database {}: {}", name, e);
                return false;
            }
        };
        let entry = ConnectionEntry {
            dialect: Dialect::Mysql,
            handle: BackendHandle::Mysql(handle),
            params: ConnectParams::Mysql {
                host: host.to_string(),
                user: user.to_string(),
                password: password.to_string(),
                database: database.to_string(),
                port,
            },
            driver: None,
        };
        self.insert(name, entry).await
    }

    /// Open a PostgreSQL session eagerly and register it under `name`.
    pub async fn add_postgres_connection(
        &self,
        name: &str,
        host: &str,
        user: &str,
        password: &str,
        database: &str,
        port: u16,
    ) -> bool {
        let (client, driver) = match postgres::open(host, user, password, database, port).await {
            Ok(opened) => opened,
            Err(e) => {
                error!("Error connecting to PostgreSQL database {}: {}", name, e);
                return false;
            }
        };
        let entry = ConnectionEntry {
            dialect: Dialect::Postgres,
            handle: BackendHandle::Postgres(client),
            params: ConnectParams::Postgres {
                host: host.to_string(),
                user: user.to_string(),
                password: password.to_string(),
                database: database.to_string(),
                port,
            },
            driver: Some(driver),
        };
        self.insert(name, entry).await
    }

    // Duplicate names are rejected rather than silently overwritten: an
    // overwrite would leak the previous handle without releasing it.
    async fn insert(&self, name: &str, entry: ConnectionEntry) -> bool {
        let label = entry.dialect;
        let mut connections = self.connections.write().await;
        if connections.contains_key(name) {
            warn!(
                "Connection name {} already registered; keeping the existing entry",
                name
            );
            drop(connections);
            Self::discard(entry).await;
            return false;
        }
        connections.insert(name.to_string(), entry);
        info!("Added {} connection: {}", label, name);
        true
    }

    async fn discard(entry: ConnectionEntry) {
        match entry.handle {
            BackendHandle::Sqlite(handle) => {
                let _ = sqlite::close(handle);
            }
            BackendHandle::Mysql(handle) => {
                let _ = mysql::close(handle).await;
            }
            BackendHandle::Postgres(client) => postgres::close(client, entry.driver),
        }
    }

    /// Clone of the live handle for `name`, or `None`. Performs no I/O.
    pub async fn get_connection(&self, name: &str) -> Option<BackendHandle> {
        self.connections
            .read()
            .await
            .get(name)
            .map(|entry| entry.handle.clone())
    }

    /// Names of every registered connection.
    pub async fn connection_names(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub(crate) async fn lookup(
        &self,
        name: &str,
    ) -> Option<(Dialect, BackendHandle, ConnectParams)> {
        self.connections
            .read()
            .await
            .get(name)
            .map(|entry| (entry.dialect, entry.handle.clone(), entry.params.clone()))
    }

    /// Extract a fresh table → columns mapping from the named backend.
    ///
    /// Unknown names, and any introspection failure, collapse to `None`;
    /// the log entry carries the distinguishing detail.
    pub async fn get_schema_information(&self, name: &str) -> Option<SchemaMap> {
        let Some((_dialect, handle, params)) = self.lookup(name).await else {
            error!("Database connection {} not found", name);
            return None;
        };

        let result = match &handle {
            BackendHandle::Sqlite(conn) => sqlite::schema(conn).await,
            BackendHandle::Mysql(conn) => {
                mysql::schema(conn, params.database().unwrap_or_default()).await
            }
            BackendHandle::Postgres(client) => postgres::schema(client).await,
        };

        match result {
            Ok(schema) => Some(schema),
            Err(e) => {
                error!("Error extracting schema from {}: {}", name, e);
                None
            }
        }
    }

    /// Register every descriptor in `config`; returns how many succeeded.
    pub async fn register_from_config(&self, config: &Config) -> usize {
        let mut registered = 0;
        for descriptor in &config.connections {
            let added = match descriptor {
                ConnectionDescriptor::Sqlite { name, path } => {
                    self.add_sqlite_connection(name, path).await
                }
                ConnectionDescriptor::Mysql {
                    name,
                    host,
                    user,
                    password,
                    database,
                    port,
                } => {
                    self.add_mysql_connection(name, host, user, password, database, *port)
                        .await
                }
                ConnectionDescriptor::Postgres {
                    name,
                    host,
                    user,
                    password,
                    database,
                    port,
                } => {
                    self.add_postgres_connection(name, host, user, password, database, *port)
                        .await
                }
            };
            if added {
                registered += 1;
            }
        }
        registered
    }

    /// Best-effort bulk teardown: every handle is closed independently and
    /// the registry is cleared even if some closes fail.
    pub async fn close_all_connections(&self) {
        let mut connections = self.connections.write().await;
        for (name, entry) in connections.drain() {
            let ConnectionEntry { handle, driver, .. } = entry;
            let result = match handle {
                BackendHandle::Sqlite(handle) => sqlite::close(handle),
                BackendHandle::Mysql(handle) => mysql::close(handle).await,
                BackendHandle::Postgres(client) => {
                    postgres::close(client, driver);
                    Ok(())
                }
            };
            match result {
                Ok(()) => info!("Closed connection to {}", name),
                Err(e) => error!("Error closing connection to {}: {}", name, e),
            }
        }
    }
}

impl Default for DatabaseConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Row-returning statements are fetched; everything else is executed and
/// implicitly committed.
pub(crate) fn is_row_returning(sql: &str) -> bool {
    sql.trim().to_lowercase().starts_with("select")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn row_returning_classification() {
        assert!(is_row_returning("SELECT 1"));
        assert!(is_row_returning("  select * from t"));
        assert!(!is_row_returning("INSERT INTO t VALUES (1)"));
        assert!(!is_row_returning("UPDATE t SET a = 1"));
    }

    #[tokio::test]
    async fn sqlite_registration_and_retrieval() {
        let dir = tempdir().unwrap();
        let connector = DatabaseConnector::new();

        assert!(
            connector
                .add_sqlite_connection("sales", dir.path().join("sales.db"))
                .await
        );
        assert!(connector.get_connection("sales").await.is_some());
        assert!(connector.get_connection("missing").await.is_none());
        assert_eq!(connector.connection_names().await, vec!["sales".to_string()]);
    }

    #[tokio::test]
    async fn failed_registration_leaves_no_entry() {
        let connector = DatabaseConnector::new();
        let added = connector
            .add_sqlite_connection("broken", "no-such-dir/broken.db")
            .await;
        assert!(!added);
        assert!(connector.get_connection("broken").await.is_none());
    }

    // Port 1 is reserved and nothing listens there; connection setup fails
    // immediately with a refused connection.
    #[tokio::test]
    async fn unreachable_mysql_registration_fails() {
        let connector = DatabaseConnector::new();
        let added = connector
            .add_mysql_connection("inventory", "127.0.0.1", "app", "secret", "inventory", 1)
            .await;
        assert!(!added);
        assert!(connector.get_connection("inventory").await.is_none());
        assert!(connector.connection_names().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_postgres_registration_fails() {
        let connector = DatabaseConnector::new();
        let added = connector
            .add_postgres_connection("analytics", "127.0.0.1", "app", "secret", "analytics", 1)
            .await;
        assert!(!added);
        assert!(connector.get_connection("analytics").await.is_none());
        assert!(connector.connection_names().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let dir = tempdir().unwrap();
        let connector = DatabaseConnector::new();

        assert!(
            connector
                .add_sqlite_connection("sales", dir.path().join("first.db"))
                .await
        );
        assert!(
            !connector
                .add_sqlite_connection("sales", dir.path().join("second.db"))
                .await
        );
        assert_eq!(connector.connection_names().await.len(), 1);
    }

    #[tokio::test]
    async fn schema_information_excludes_internal_tables() {
        let dir = tempdir().unwrap();
        let connector = DatabaseConnector::new();
        connector
            .add_sqlite_connection("sales", dir.path().join("sales.db"))
            .await;

        // AUTOINCREMENT forces SQLite to create its internal
        // sqlite_sequence table.
        connector
            .execute_query(
                "sales",
                "CREATE TABLE orders (id INTEGER PRIMARY KEY AUTOINCREMENT, item TEXT, total REAL)",
            )
            .await
            .unwrap();
        connector
            .execute_query("sales", "INSERT INTO orders (item, total) VALUES ('kite', 12.5)")
            .await
            .unwrap();

        let schema = connector.get_schema_information("sales").await.unwrap();
        assert_eq!(
            schema.get("orders").unwrap(),
            &vec!["id".to_string(), "item".to_string(), "total".to_string()]
        );
        assert!(!schema.contains_key("sqlite_sequence"));
    }

    #[tokio::test]
    async fn schema_information_is_idempotent() {
        let dir = tempdir().unwrap();
        let connector = DatabaseConnector::new();
        connector
            .add_sqlite_connection("sales", dir.path().join("sales.db"))
            .await;
        connector
            .execute_query("sales", "CREATE TABLE items (id INTEGER, name TEXT)")
            .await
            .unwrap();

        let first = connector.get_schema_information("sales").await.unwrap();
        let second = connector.get_schema_information("sales").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn schema_information_for_unknown_name_is_absent() {
        let connector = DatabaseConnector::new();
        assert!(connector.get_schema_information("nowhere").await.is_none());
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let dir = tempdir().unwrap();
        let connector = DatabaseConnector::new();
        connector
            .add_sqlite_connection("a", dir.path().join("a.db"))
            .await;
        connector
            .add_sqlite_connection("b", dir.path().join("b.db"))
            .await;

        connector.close_all_connections().await;
        assert!(connector.connection_names().await.is_empty());
        assert!(connector.get_connection("a").await.is_none());
    }

    #[tokio::test]
    async fn register_from_config_counts_successes() {
        let dir = tempdir().unwrap();
        let connector = DatabaseConnector::new();
        let config = Config {
            connections: vec![
                ConnectionDescriptor::Sqlite {
                    name: "good".to_string(),
                    path: dir.path().join("good.db").to_string_lossy().into_owned(),
                },
                ConnectionDescriptor::Sqlite {
                    name: "bad".to_string(),
                    path: "no-such-dir/bad.db".to_string(),
                },
            ],
            logging: Default::default(),
        };

        assert_eq!(connector.register_from_config(&config).await, 1);
        assert!(connector.get_connection("good").await.is_some());
        assert!(connector.get_connection("bad").await.is_none());
    }
}
