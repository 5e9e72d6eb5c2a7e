#![doc = include_str!("../README.md")]

pub mod catalog;
mod error;
pub mod fsops;
pub mod pipeline;

pub use catalog::{Catalog, CatalogError, JsonCatalog, MemoryCatalog};
pub use error::{IngestError, IngestResult};
pub use pipeline::{FileReport, Outcome, Pipeline, PipelineConfig, RunSummary};

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::Args;
use colored::Colorize;
use tokio::sync::watch;
use torsnif_parsers::bencode::DecodeOptions;
use tracing::{info, warn};

const DEFAULT_CATALOG: &str = "torsnif-catalog.jsonl";

/// Ingest every torrent file under a directory into the catalog. Files with a new info hash are
/// moved to the done directory, files already in the catalog are deleted and files that cannot
/// be parsed are left in place.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Directory that is searched recursively for `.torrent` files.
    #[arg(short, long, env = "TORSNIF_DIR")]
    dir: PathBuf,

    /// Where ingested files are moved to. Defaults to `<dir>-done` next to the source directory.
    #[arg(long, env = "TORSNIF_DONE_DIR")]
    done_dir: Option<PathBuf>,

    /// JSON lines file holding the catalog. Created if missing.
    #[arg(long, env = "TORSNIF_CATALOG", default_value = DEFAULT_CATALOG)]
    catalog: PathBuf,

    /// Keep the catalog in memory for this run only.
    #[arg(long, conflicts_with = "catalog")]
    memory_catalog: bool,

    /// Number of files processed at the same time.
    #[arg(short = 'j', long, env = "TORSNIF_CONCURRENCY", default_value_t = NonZeroUsize::MIN)]
    concurrency: NonZeroUsize,

    /// Reject duplicate dictionary keys and trailing bytes.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogKind {
    Memory,
    JsonLines(PathBuf),
}

impl CatalogKind {
    /// Opens the catalog and verifies it can be used.
    pub async fn open(&self) -> IngestResult<Arc<dyn Catalog>> {
        let catalog: Arc<dyn Catalog> = match self {
            CatalogKind::Memory => Arc::new(MemoryCatalog::new()),
            CatalogKind::JsonLines(path) => Arc::new(
                JsonCatalog::open(path)
                    .await
                    .map_err(|e| IngestError::setup(format!("unable to open catalog: {e}")))?,
            ),
        };

        catalog
            .health_check()
            .await
            .map_err(|e| IngestError::setup(format!("catalog is not usable: {e}")))?;
        Ok(catalog)
    }
}

/// Validated settings of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub source_dir: PathBuf,
    pub done_dir: PathBuf,
    pub catalog: CatalogKind,
    pub concurrency: NonZeroUsize,
    pub strict: bool,
}

impl IngestConfig {
    /// Resolves directories to absolute paths and creates the done directory.
    pub fn prepare(
        source_dir: &Path,
        done_dir: Option<&Path>,
        catalog: CatalogKind,
        concurrency: NonZeroUsize,
        strict: bool,
    ) -> IngestResult<Self> {
        let source_dir = source_dir.canonicalize().map_err(|e| {
            IngestError::setup(format!("source directory {}: {e}", source_dir.display()))
        })?;
        if !source_dir.is_dir() {
            return Err(IngestError::setup(format!(
                "{} is not a directory",
                source_dir.display()
            )));
        }

        let done_dir = match done_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_done_dir(&source_dir)?,
        };
        std::fs::create_dir_all(&done_dir)
            .map_err(|e| IngestError::io("create_done_dir", &done_dir, e))?;
        let done_dir = done_dir
            .canonicalize()
            .map_err(|e| IngestError::io("create_done_dir", &done_dir, e))?;

        if done_dir == source_dir {
            return Err(IngestError::setup(
                "the done directory must differ from the source directory",
            ));
        }

        Ok(IngestConfig {
            source_dir,
            done_dir,
            catalog,
            concurrency,
            strict,
        })
    }

    /// The done directory, if it lies inside the source tree and must be skipped by discovery.
    pub fn excluded_dir(&self) -> Option<&Path> {
        self.done_dir
            .starts_with(&self.source_dir)
            .then_some(self.done_dir.as_path())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            done_dir: self.done_dir.clone(),
            concurrency: self.concurrency,
            decode: DecodeOptions {
                strict: self.strict,
            },
        }
    }
}

/// `<parent>/<name>-done` for a source directory `<parent>/<name>`.
fn default_done_dir(source_dir: &Path) -> IngestResult<PathBuf> {
    let name = source_dir.file_name().ok_or_else(|| {
        IngestError::setup(format!(
            "cannot derive a done directory for {}, pass --done-dir",
            source_dir.display()
        ))
    })?;

    let mut done = name.to_owned();
    done.push("-done");
    Ok(source_dir.with_file_name(done))
}

impl IngestArgs {
    fn into_config(self) -> IngestResult<IngestConfig> {
        let catalog = if self.memory_catalog {
            CatalogKind::Memory
        } else {
            CatalogKind::JsonLines(self.catalog)
        };

        IngestConfig::prepare(
            &self.dir,
            self.done_dir.as_deref(),
            catalog,
            self.concurrency,
            self.strict,
        )
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.into_config().context("invalid ingest configuration")?;
        let catalog = config.catalog.open().await?;

        let files = fsops::discover(&config.source_dir, config.excluded_dir())?;
        info!(
            source = %config.source_dir.display(),
            done = %config.done_dir.display(),
            files = files.len(),
            "discovered torrent files"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing files in flight");
                let _ = cancel_tx.send(true);
            }
        });

        let pipeline = Pipeline::new(Arc::clone(&catalog), config.pipeline_config());
        let summary = pipeline.run(files, cancel_rx).await;

        for report in &summary.reports {
            println!("{report}");
        }
        println!("{summary}");
        if let Ok(records) = catalog.len().await {
            println!("{} {records}", "Catalog records:".bold());
        }
        println!("{} {:.2?}", "Elapsed:".bold(), summary.elapsed);

        Ok(())
    }
}
