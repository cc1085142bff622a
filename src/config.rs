use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration: the connection fleet plus logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connections: Vec<ConnectionDescriptor>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One backend to register at startup, tagged by its dialect.
///
/// The shape mirrors the descriptor file: `name` and `type` plus the
/// dialect-specific fields. Each descriptor becomes direct arguments to the
/// matching `add_*` operation; no further validation happens here.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionDescriptor {
    Sqlite {
        name: String,
        path: String,
    },
    Mysql {
        name: String,
        host: String,
        user: String,
        password: String,
        database: String,
        #[serde(default = "default_mysql_port")]
        port: u16,
    },
    Postgres {
        name: String,
        host: String,
        user: String,
        password: String,
        database: String,
        #[serde(default = "default_postgres_port")]
        port: u16,
    },
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_postgres_port() -> u16 {
    5432
}

#[derive(Debug, Clone, Deserialize)]
struct Settings {
    config_path: String,
    log_level: String,
}

impl Config {
    /// Load settings from the environment, then the JSON descriptor file the
    /// settings point at.
    pub fn from_env() -> anyhow::Result<Self> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("config_path", "db_config.json")?
            .set_default("log_level", "info")?;

        if let Ok(path) = env::var("MULTIDB_CONFIG") {
            builder = builder.set_override("config_path", path)?;
        }
        if let Ok(level) = env::var("RUST_LOG") {
            builder = builder.set_override("log_level", level)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        let connections = Self::load_descriptors(&settings.config_path)?;

        Ok(Self {
            connections,
            logging: LoggingConfig {
                level: settings.log_level,
            },
        })
    }

    /// Read the connection descriptor file; a missing file is an empty fleet.
    pub fn load_descriptors(path: &str) -> anyhow::Result<Vec<ConnectionDescriptor>> {
        if !Path::new(path).exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        let descriptors =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;
        Ok(descriptors)
    }
}
