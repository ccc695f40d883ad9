use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use stockdump_core::config::ExportConfig;
use stockdump_core::Pipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Export stock-market tables to CSV", long_about = None)]
struct Cli {
    /// Optional TOML file with database, catalog and output settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory for the exported files (defaults to ./data)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut config = ExportConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.output_dir {
        config.output.root = dir;
    }

    let report = Pipeline::run(&config).await?;
    info!(
        files = report.files.len(),
        joined_rows = report.coverage.joined_rows,
        manifest = %report.manifest.display(),
        "Pipeline completed successfully"
    );
    Ok(())
}
