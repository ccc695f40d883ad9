use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ExportError, Result};
use crate::export::{write_atomic, JoinCoverage, LoadStats, WrittenFile};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Summary of one export run, written next to the data it describes.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub generated_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
    pub join_coverage: Option<JoinCoverage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub dataset: String,
    /// Relative to the output root.
    pub path: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub load_ms: Option<u64>,
}

impl RunManifest {
    pub fn new(
        root: &Path,
        written: &[WrittenFile],
        stats: &[LoadStats],
        join_coverage: Option<JoinCoverage>,
    ) -> Self {
        let files = written
            .iter()
            .map(|file| {
                let relative = file.path.strip_prefix(root).unwrap_or(&file.path);
                ManifestEntry {
                    dataset: file.dataset.clone(),
                    path: relative.to_string_lossy().replace('\\', "/"),
                    rows: file.rows,
                    columns: file.columns.clone(),
                    load_ms: stats
                        .iter()
                        .find(|stat| stat.dataset == file.dataset)
                        .map(|stat| stat.elapsed.as_millis() as u64),
                }
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            files,
            join_coverage,
        }
    }

    pub fn write(&self, root: &Path) -> Result<PathBuf> {
        let path = root.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| ExportError::io(&path, std::io::Error::other(err)))?;
        write_atomic(&path, |file| file.write_all(&bytes))?;
        Ok(path)
    }
}
