use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{ExportError, Result};
use crate::query::{build_join_query, JoinQuery};
use crate::schema::describe_join;
use crate::source::TableSource;

pub const INDIVIDUAL_DIR: &str = "individual";
pub const JOINED_DIR: &str = "joined";
pub const JOINED_STEM: &str = "full_dataset";
pub const FILE_EXTENSION: &str = "csv";

/// Datasets keyed by logical name.
pub type DatasetMap = BTreeMap<String, DataFrame>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub dataset: String,
    pub rows: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct IndividualExport {
    pub datasets: DatasetMap,
    pub stats: Vec<LoadStats>,
}

#[derive(Debug, Clone)]
pub struct JoinedExport {
    pub dataset: DataFrame,
    pub query: JoinQuery,
    pub stats: LoadStats,
}

/// What `persist` writes: one file per entry, or the single joined file.
#[derive(Debug, Clone, Copy)]
pub enum Persistable<'a> {
    Individual(&'a DatasetMap),
    Joined(&'a DataFrame),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub dataset: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Load every catalog table in full. Any failing table fails the whole call.
pub async fn export_individual<S>(source: &mut S, catalog: &Catalog) -> Result<IndividualExport>
where
    S: TableSource + ?Sized,
{
    let mut datasets = DatasetMap::new();
    let mut stats = Vec::with_capacity(catalog.len());

    for entry in catalog.entries() {
        let sql = format!("SELECT * FROM {}", entry.physical);
        let started = Instant::now();
        let frame = source.fetch(&sql).await.map_err(|source| ExportError::Load {
            target: format!("table '{}'", entry.physical),
            source,
        })?;
        let elapsed = started.elapsed();

        info!(
            table = %entry.physical,
            dataset = %entry.logical,
            rows = frame.height(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Loaded table"
        );
        stats.push(LoadStats {
            dataset: entry.logical.clone(),
            rows: frame.height(),
            elapsed,
        });
        datasets.insert(entry.logical.clone(), frame);
    }

    Ok(IndividualExport { datasets, stats })
}

/// Introspect the joined tables, compose the join and load it.
pub async fn export_joined<S>(source: &mut S, catalog: &Catalog) -> Result<JoinedExport>
where
    S: TableSource + ?Sized,
{
    let described = describe_join(source, catalog).await?;
    let query = build_join_query(catalog.join_key(), catalog.anchor(), &described)?;

    let started = Instant::now();
    let dataset = source.fetch(query.sql()).await.map_err(|source| ExportError::Load {
        target: "joined dataset".to_string(),
        source,
    })?;
    let elapsed = started.elapsed();

    info!(
        rows = dataset.height(),
        columns = dataset.width(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Loaded joined dataset"
    );

    let stats = LoadStats {
        dataset: JOINED_STEM.to_string(),
        rows: dataset.height(),
        elapsed,
    };
    Ok(JoinedExport {
        dataset,
        query,
        stats,
    })
}

/// Row counts that show how much the inner join filtered away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JoinCoverage {
    pub anchor_rows: usize,
    pub min_source_rows: usize,
    pub joined_rows: usize,
}

impl JoinCoverage {
    /// Time-dimension rows with no match in at least one other table.
    pub fn dropped_rows(&self) -> usize {
        self.anchor_rows.saturating_sub(self.joined_rows)
    }

    pub fn is_complete(&self) -> bool {
        self.joined_rows == self.anchor_rows
    }
}

/// Compare the joined row count against the individual loads and warn when the
/// join silently dropped or multiplied rows.
pub fn check_join_coverage(
    catalog: &Catalog,
    individual: &IndividualExport,
    joined_rows: usize,
) -> Result<JoinCoverage> {
    let anchor = &catalog.anchor().logical;
    let anchor_rows = individual
        .datasets
        .get(anchor)
        .map(DataFrame::height)
        .ok_or_else(|| ExportError::UnknownDataset(anchor.clone()))?;
    let min_source_rows = individual
        .datasets
        .values()
        .map(DataFrame::height)
        .min()
        .unwrap_or(0);

    let coverage = JoinCoverage {
        anchor_rows,
        min_source_rows,
        joined_rows,
    };

    if coverage.dropped_rows() > 0 {
        warn!(
            anchor_rows,
            joined_rows,
            dropped = coverage.dropped_rows(),
            "Joined dataset dropped timestamps missing from at least one table"
        );
    }
    if joined_rows > min_source_rows {
        warn!(
            min_source_rows,
            joined_rows,
            "Joined dataset has more rows than the smallest table; join key values are not unique"
        );
    }
    Ok(coverage)
}

/// Write datasets under `root` as header-first CSV files.
///
/// Each file is written to a temporary sibling and renamed into place, so a
/// failed write never leaves a truncated file behind.
pub fn persist(payload: Persistable<'_>, root: &Path) -> Result<Vec<WrittenFile>> {
    let mut written = Vec::new();
    match payload {
        Persistable::Individual(datasets) => {
            let dir = root.join(INDIVIDUAL_DIR);
            for (name, frame) in datasets {
                check_file_stem(name)?;
                let path = dir.join(format!("{name}_data.{FILE_EXTENSION}"));
                write_csv(frame, &path)?;
                info!(dataset = %name, path = %path.display(), "Saved dataset");
                written.push(written_file(name, path, frame));
            }
        }
        Persistable::Joined(frame) => {
            let path = root
                .join(JOINED_DIR)
                .join(format!("{JOINED_STEM}.{FILE_EXTENSION}"));
            write_csv(frame, &path)?;
            info!(path = %path.display(), "Saved joined dataset");
            written.push(written_file(JOINED_STEM, path, frame));
        }
    }
    Ok(written)
}

fn written_file(dataset: &str, path: PathBuf, frame: &DataFrame) -> WrittenFile {
    WrittenFile {
        dataset: dataset.to_string(),
        path,
        rows: frame.height(),
        columns: frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect(),
    }
}

fn check_file_stem(name: &str) -> Result<()> {
    let usable = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0');
    if usable {
        Ok(())
    } else {
        Err(ExportError::Config(format!("dataset name '{name}' cannot be used as a file name")))
    }
}

fn write_csv(frame: &DataFrame, path: &Path) -> Result<()> {
    write_atomic(path, |file| {
        let mut frame = frame.clone();
        CsvWriter::new(file)
            .include_header(true)
            .finish(&mut frame)
            .map_err(io::Error::other)
    })
}

/// Create parent directories, write via `<path>.tmp`, then rename into place.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ExportError::io(parent, err))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let cleanup = |err: io::Error| {
        let _ = fs::remove_file(&tmp_path);
        ExportError::io(path, err)
    };

    let mut file = File::create(&tmp_path).map_err(|err| ExportError::io(&tmp_path, err))?;
    write(&mut file).map_err(cleanup)?;
    file.sync_all().map_err(cleanup)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(cleanup)
}
