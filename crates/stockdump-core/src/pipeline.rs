use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::ExportConfig;
use crate::db::MySqlSource;
use crate::error::ExportError;
use crate::export::{
    check_join_coverage, export_individual, export_joined, persist, JoinCoverage, Persistable,
    WrittenFile,
};
use crate::manifest::RunManifest;
use crate::source::TableSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Connected,
    Loading,
    Exporting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Connected => "connected",
            Stage::Loading => "loading",
            Stage::Exporting => "exporting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run, tagged with the stage it failed in.
#[derive(Debug, Error)]
#[error("export failed while {stage}: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub error: ExportError,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub files: Vec<WrittenFile>,
    pub coverage: JoinCoverage,
    pub manifest: PathBuf,
}

/// Drives connect → load → export and disposes of the connection on every
/// path once it has been opened.
pub struct Pipeline {
    catalog: Catalog,
    output_root: PathBuf,
    stage: Stage,
}

impl Pipeline {
    pub fn new(catalog: Catalog, output_root: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            output_root: output_root.into(),
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the full export against the MySQL database described by `config`.
    pub async fn run(config: &ExportConfig) -> Result<RunReport, PipelineFailure> {
        let mut stage = Stage::Init;
        let catalog = Catalog::new(config.catalog.clone()).map_err(|err| fail(&mut stage, err))?;
        let mut pipeline = Pipeline::new(catalog, config.output.root.clone());

        let source = match MySqlSource::connect(&config.database).await {
            Ok(source) => source,
            Err(err) => return Err(fail(&mut pipeline.stage, err)),
        };
        pipeline.run_with(source).await
    }

    /// Run the export over an already opened source, closing it exactly once.
    pub async fn run_with<S>(&mut self, mut source: S) -> Result<RunReport, PipelineFailure>
    where
        S: TableSource,
    {
        advance(&mut self.stage, Stage::Connected);
        let outcome = self.drive(&mut source).await;
        let closed = source.close().await;

        match (outcome, closed) {
            (Ok(report), Ok(())) => {
                advance(&mut self.stage, Stage::Done);
                Ok(report)
            }
            (Ok(_), Err(close_err)) => Err(fail(
                &mut self.stage,
                ExportError::Connection { source: close_err },
            )),
            (Err(failure), Ok(())) => Err(failure),
            (Err(failure), Err(close_err)) => {
                warn!(error = %close_err, "Closing the connection after a failed run also failed");
                Err(failure)
            }
        }
    }

    async fn drive<S>(&mut self, source: &mut S) -> Result<RunReport, PipelineFailure>
    where
        S: TableSource,
    {
        let Self {
            catalog,
            output_root,
            stage,
        } = self;

        source
            .probe()
            .await
            .map_err(|source| fail(stage, ExportError::Connection { source }))?;

        advance(stage, Stage::Loading);
        let individual = export_individual(source, catalog)
            .await
            .map_err(|err| fail(stage, err))?;
        let joined = export_joined(source, catalog)
            .await
            .map_err(|err| fail(stage, err))?;
        let coverage = check_join_coverage(catalog, &individual, joined.dataset.height())
            .map_err(|err| fail(stage, err))?;

        advance(stage, Stage::Exporting);
        let root: &Path = output_root;
        let mut files = persist(Persistable::Individual(&individual.datasets), root)
            .map_err(|err| fail(stage, err))?;
        files.extend(
            persist(Persistable::Joined(&joined.dataset), root).map_err(|err| fail(stage, err))?,
        );

        let mut stats = individual.stats;
        stats.push(joined.stats);
        let manifest = RunManifest::new(root, &files, &stats, Some(coverage))
            .write(root)
            .map_err(|err| fail(stage, err))?;

        Ok(RunReport {
            files,
            coverage,
            manifest,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    info!(from = %stage, to = %next, "Pipeline stage");
    *stage = next;
}

fn fail(stage: &mut Stage, error: ExportError) -> PipelineFailure {
    let failed_in = *stage;
    error!(stage = %failed_in, error = %error, "Pipeline failed");
    *stage = Stage::Failed;
    PipelineFailure {
        stage: failed_in,
        error,
    }
}
