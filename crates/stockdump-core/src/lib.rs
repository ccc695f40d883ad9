pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod frame;
pub mod manifest;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod source;

pub use error::{ExportError, Result};
pub use pipeline::{Pipeline, PipelineFailure, RunReport, Stage};
