// crates/stockdump-core/src/db.rs

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use polars::prelude::DataFrame;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor, Statement};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{ExportError, Result};
use crate::frame::rows_to_frame;
use crate::source::{SourceError, TableSource};

const COLUMNS_SQL: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR) AS column_name
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// A single MySQL connection used sequentially for the whole run.
pub struct MySqlSource {
    conn: Option<MySqlConnection>,
    query_timeout: Duration,
}

impl MySqlSource {
    /// Open the connection described by `config`, bounded by its connect timeout.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let options = connect_options(config)?;

        let conn = timed(config.connect_timeout(), MySqlConnection::connect_with(&options))
            .await
            .map_err(|source| ExportError::Connection { source })?;

        info!(host = %config.host, database = %config.database, "Database connection established");
        Ok(Self {
            conn: Some(conn),
            query_timeout: config.query_timeout(),
        })
    }

    fn conn(&mut self) -> std::result::Result<&mut MySqlConnection, SourceError> {
        self.conn.as_mut().ok_or(SourceError::Closed)
    }
}

#[async_trait]
impl TableSource for MySqlSource {
    async fn probe(&mut self) -> std::result::Result<(), SourceError> {
        let limit = self.query_timeout;
        let conn = self.conn()?;
        timed(limit, sqlx::query("SELECT 1").execute(&mut *conn)).await?;
        Ok(())
    }

    async fn table_columns(&mut self, table: &str) -> std::result::Result<Vec<String>, SourceError> {
        let limit = self.query_timeout;
        let conn = self.conn()?;
        timed(
            limit,
            sqlx::query_scalar::<_, String>(COLUMNS_SQL)
                .bind(table)
                .fetch_all(&mut *conn),
        )
        .await
    }

    async fn fetch(&mut self, sql: &str) -> std::result::Result<DataFrame, SourceError> {
        let limit = self.query_timeout;
        let conn = self.conn()?;
        debug!(sql, "Executing statement");

        // Preparing first gives us column metadata even for empty results.
        let statement = timed(limit, (&mut *conn).prepare(sql)).await?;
        let rows = timed(limit, statement.query().fetch_all(&mut *conn)).await?;
        rows_to_frame(statement.columns(), &rows)
    }

    async fn close(&mut self) -> std::result::Result<(), SourceError> {
        match self.conn.take() {
            Some(conn) => {
                timed(self.query_timeout, conn.close()).await?;
                info!("Database connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn connect_options(config: &ConnectionConfig) -> Result<MySqlConnectOptions> {
    // A URL carries its own charset (sqlx defaults to utf8mb4); the configured
    // charset applies only to the discrete fields.
    let options = match &config.url {
        Some(url) => MySqlConnectOptions::from_str(url)
            .map_err(|err| ExportError::Config(format!("invalid database URL: {err}")))?,
        None => {
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user)
                .database(&config.database);
            if let Some(password) = &config.password {
                options = options.password(password);
            }
            options.charset(&config.charset)
        }
    };
    Ok(options)
}

async fn timed<T, F>(limit: Duration, operation: F) -> std::result::Result<T, SourceError>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(SourceError::from),
        Err(_) => Err(SourceError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stalled_operation_becomes_a_timeout() {
        let limit = Duration::from_millis(5);
        let result = timed(limit, std::future::pending::<std::result::Result<(), sqlx::Error>>()).await;
        assert!(matches!(result, Err(SourceError::Timeout(elapsed)) if elapsed == limit));
    }

    #[tokio::test]
    async fn finished_operation_passes_through() {
        let result = timed(Duration::from_secs(1), async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn url_charset_is_not_overridden() {
        let config = ConnectionConfig {
            url: Some("mysql://root:pw@localhost:3306/market?charset=latin1".into()),
            charset: "utf8mb4".into(),
            ..ConnectionConfig::default()
        };
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_charset(), "latin1");
    }

    #[test]
    fn discrete_fields_use_the_configured_charset() {
        let config = ConnectionConfig {
            password: Some("pw".into()),
            charset: "utf8".into(),
            ..ConnectionConfig::default()
        };
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_charset(), "utf8");
        assert_eq!(options.get_host(), "localhost");
    }
}
