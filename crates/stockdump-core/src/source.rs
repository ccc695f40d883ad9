//! The seam between the export components and the relational store.

use std::time::Duration;

use async_trait::async_trait;
use polars::prelude::{DataFrame, PolarsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("column '{column}' could not be decoded: {message}")]
    Decode { column: String, message: String },

    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection already closed")]
    Closed,
}

/// A sequentially used handle onto the store holding the market tables.
#[async_trait]
pub trait TableSource: Send {
    /// Cheap liveness check against the open connection.
    async fn probe(&mut self) -> Result<(), SourceError>;

    /// Every column of `table` in the store's native order. An empty list means
    /// the table does not exist.
    async fn table_columns(&mut self, table: &str) -> Result<Vec<String>, SourceError>;

    /// Run a read-only statement and materialise its result set.
    async fn fetch(&mut self, sql: &str) -> Result<DataFrame, SourceError>;

    /// Release the underlying connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), SourceError>;
}
