// crates/stockdump-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("database connection failed: {source}")]
    Connection {
        #[source]
        source: SourceError,
    },

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("schema introspection failed for table '{table}': {message}")]
    Schema { table: String, message: String },

    #[error("failed to load {target}: {source}")]
    Load {
        target: String,
        #[source]
        source: SourceError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
