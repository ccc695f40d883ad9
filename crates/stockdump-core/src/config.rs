use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ExportError, Result};

pub const ENV_HOST: &str = "STOCKDUMP_DB_HOST";
pub const ENV_PORT: &str = "STOCKDUMP_DB_PORT";
pub const ENV_USER: &str = "STOCKDUMP_DB_USER";
pub const ENV_PASSWORD: &str = "STOCKDUMP_DB_PASSWORD";
pub const ENV_DATABASE: &str = "STOCKDUMP_DB_NAME";
pub const ENV_OUTPUT_DIR: &str = "STOCKDUMP_OUTPUT_DIR";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Top-level settings for one export run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub database: ConnectionConfig,
    pub catalog: CatalogConfig,
    pub output: OutputConfig,
}

impl ExportConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| ExportError::Config(err.to_string()))
    }

    /// Read the optional TOML file, then layer the process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|err| {
                    ExportError::Config(format!("cannot read {}: {err}", path.display()))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(host) = lookup(ENV_HOST) {
            db.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            db.port = port
                .trim()
                .parse()
                .map_err(|_| ExportError::Config(format!("{ENV_PORT} is not a port: '{port}'")))?;
        }
        if let Some(user) = lookup(ENV_USER) {
            db.user = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            db.password = Some(password);
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            db.database = database;
        }
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            db.url = Some(url);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output.root = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Credentials and limits for the MySQL connection.
///
/// When `url` is set it wins over the discrete fields.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub charset: String,
    pub url: Option<String>,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            database: "tesla_stock_analysis".to_string(),
            charset: "utf8mb4".to_string(),
            url: None,
            connect_timeout_secs: 10,
            query_timeout_secs: 300,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 || self.query_timeout_secs == 0 {
            return Err(ExportError::Config("timeouts must be at least one second".into()));
        }

        if let Some(url) = &self.url {
            if !url.starts_with("mysql://") {
                return Err(ExportError::Config(format!(
                    "{ENV_DATABASE_URL} must be a mysql:// URL"
                )));
            }
            return Ok(());
        }

        let required = [
            ("host", &self.host),
            ("user", &self.user),
            ("database", &self.database),
            ("charset", &self.charset),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ExportError::Config(format!("database {field} must not be empty")));
            }
        }
        if self.port == 0 {
            return Err(ExportError::Config("database port must not be 0".into()));
        }
        if self.password.is_none() {
            return Err(ExportError::Config(format!(
                "database password is missing (set {ENV_PASSWORD} or {ENV_DATABASE_URL})"
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableEntry {
    pub logical: String,
    pub physical: String,
    pub alias: String,
}

impl TableEntry {
    fn new(logical: &str, physical: &str, alias: &str) -> Self {
        Self {
            logical: logical.to_string(),
            physical: physical.to_string(),
            alias: alias.to_string(),
        }
    }
}

/// The logical → physical table mapping. The first table anchors the join.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub join_key: String,
    pub tables: Vec<TableEntry>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            join_key: "datetime".to_string(),
            tables: vec![
                TableEntry::new("datetime", "datetime_dimension", "d"),
                TableEntry::new("prices", "price_ohlc", "p"),
                TableEntry::new("volume", "volume_metrics", "v"),
                TableEntry::new("moving_avgs", "moving_averages", "m"),
                TableEntry::new("indicators", "oscillators", "o"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
        }
    }
}
