//! The per-file ingestion state machine and the bounded worker pool that drives it.
//!
//! Each discovered file is decoded, turned into a [`TorrentRecord`], checked against the
//! [`Catalog`] and then either archived (new hash) or discarded (known hash). Files that fail to
//! parse or hit a catalog failure are left where they are so a later run can retry them.

use std::{
    fmt,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use colored::Colorize;
use tokio::{
    fs,
    sync::{watch, Semaphore},
    task::JoinSet,
};
use torsnif_parsers::bencode::DecodeOptions;
use torsnif_torrent::{MetaInfo, TorrentRecord};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    catalog::Catalog,
    error::IngestError,
    fsops::{archive, discard},
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Where successfully inserted files are moved to.
    pub done_dir: PathBuf,

    /// Maximum number of files processed at the same time.
    pub concurrency: NonZeroUsize,

    pub decode: DecodeOptions,
}

/// What happened to a single file.
#[derive(Debug)]
pub enum Outcome {
    /// A new record was stored. `archived_to` is `None` if the file could not be moved, in which
    /// case the report carries the filesystem error.
    Inserted {
        hash: String,
        archived_to: Option<PathBuf>,
    },

    /// The hash was already catalogued, either before this file was looked up or by a concurrent
    /// worker between lookup and insert.
    DuplicateSkipped { hash: String },

    /// The file could not be read, decoded or interpreted as a torrent. It was left untouched.
    ParseFailed { error: IngestError },

    /// The catalog failed to serve the lookup or the insert. The file was left untouched.
    StoreError { hash: String, error: IngestError },
}

impl Outcome {
    pub fn hash(&self) -> Option<&str> {
        match self {
            Outcome::Inserted { hash, .. }
            | Outcome::DuplicateSkipped { hash }
            | Outcome::StoreError { hash, .. } => Some(hash),
            Outcome::ParseFailed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::ParseFailed { .. } | Outcome::StoreError { .. })
    }
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,

    /// A failed archive or discard. The outcome itself still stands.
    pub side_effect: Option<IngestError>,
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.display();
        match &self.outcome {
            Outcome::Inserted { hash, archived_to } => {
                write!(f, "✅ {} {hash} {path}", "inserted".green().bold())?;
                if let Some(destination) = archived_to {
                    write!(f, " -> {}", destination.display())?;
                }
            }
            Outcome::DuplicateSkipped { hash } => {
                write!(f, "♻️  {} {hash} {path}", "duplicate".yellow().bold())?;
            }
            Outcome::ParseFailed { error } => {
                write!(f, "❌ {} {path}: {error}", "unparsable".red().bold())?;
            }
            Outcome::StoreError { hash, error } => {
                write!(f, "❌ {} {hash} {path}: {error}", "store error".red().bold())?;
            }
        }

        if let Some(error) = &self.side_effect {
            write!(f, " ({} {error})", "warning:".yellow())?;
        }
        Ok(())
    }
}

/// Aggregate result of one run.
#[derive(Debug)]
pub struct RunSummary {
    /// One report per admitted file, sorted by path.
    pub reports: Vec<FileReport>,

    pub discovered: usize,

    /// Files never started because the run was cancelled.
    pub not_admitted: usize,

    /// Admitted files whose worker panicked or was aborted. They have no report.
    pub worker_failures: usize,

    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Inserted { .. }))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, Outcome::DuplicateSkipped { .. }))
    }

    pub fn parse_failures(&self) -> usize {
        self.count(|o| matches!(o, Outcome::ParseFailed { .. }))
    }

    pub fn store_errors(&self) -> usize {
        self.count(|o| matches!(o, Outcome::StoreError { .. }))
    }

    /// Files whose outcome stands but whose archive or discard failed.
    pub fn side_effect_failures(&self) -> usize {
        self.reports.iter().filter(|r| r.side_effect.is_some()).count()
    }

    pub fn report_for(&self, path: &Path) -> Option<&FileReport> {
        self.reports.iter().find(|r| r.path == path)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} discovered: {} inserted, {} duplicate, {} unparsable, {} store errors",
            self.discovered,
            self.inserted().to_string().green(),
            self.duplicates().to_string().yellow(),
            self.parse_failures().to_string().red(),
            self.store_errors().to_string().red(),
        )?;

        if self.side_effect_failures() > 0 {
            write!(
                f,
                ", {} need manual cleanup",
                self.side_effect_failures().to_string().yellow()
            )?;
        }
        if self.worker_failures > 0 {
            write!(
                f,
                ", {} crashed workers",
                self.worker_failures.to_string().red()
            )?;
        }
        if self.not_admitted > 0 {
            write!(f, ", {} skipped after cancellation", self.not_admitted)?;
        }
        Ok(())
    }
}

/// Runs files through the ingestion state machine against a shared catalog.
#[derive(Clone)]
pub struct Pipeline {
    catalog: Arc<dyn Catalog>,
    config: Arc<PipelineConfig>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(catalog: Arc<dyn Catalog>, config: PipelineConfig) -> Self {
        Pipeline {
            catalog,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes `files` with at most `concurrency` in flight and waits for all of them.
    ///
    /// Once `cancel` turns `true` no further file is admitted, including one already waiting for
    /// a free slot. Files in flight still run to completion.
    pub async fn run(&self, files: Vec<PathBuf>, mut cancel: watch::Receiver<bool>) -> RunSummary {
        let started = Instant::now();
        let discovered = files.len();
        let permits = Arc::new(Semaphore::new(self.config.concurrency.get()));
        let mut workers = JoinSet::new();
        let mut admitted = 0;

        info!(
            files = discovered,
            concurrency = self.config.concurrency.get(),
            "starting ingestion"
        );

        for path in files {
            if *cancel.borrow() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let pipeline = self.clone();
            workers.spawn(async move {
                let report = pipeline.process_file(path).await;
                drop(permit);
                report
            });
            admitted += 1;
        }

        let not_admitted = discovered - admitted;
        if not_admitted > 0 {
            warn!(not_admitted, "cancelled, remaining files were not started");
        }

        let mut reports = Vec::with_capacity(admitted);
        let mut worker_failures = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!(error = %err, "ingestion worker did not complete");
                    worker_failures += 1;
                }
            }
        }
        reports.sort_by(|a, b| a.path.cmp(&b.path));

        RunSummary {
            reports,
            discovered,
            not_admitted,
            worker_failures,
            elapsed: started.elapsed(),
        }
    }

    /// Drives one file from discovery to its final state.
    #[instrument(name = "pipeline.file", skip(self, path), fields(path = %path.display()))]
    pub async fn process_file(&self, path: PathBuf) -> FileReport {
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = IngestError::io("read", &path, e);
                return parse_failed(path, error);
            }
        };

        let meta_info = match MetaInfo::from_bytes_with(&bytes, self.config.decode) {
            Ok(meta_info) => meta_info,
            Err(e) => {
                let error = IngestError::from_meta_info(&path, e);
                return parse_failed(path, error);
            }
        };

        let record = TorrentRecord::new(&meta_info);
        let hash = record.hash.clone();
        debug!(%hash, name = %record.name, "extracted");

        match self.catalog.find_by_hash(&hash).await {
            Ok(Some(_)) => return self.skip_duplicate(path, hash).await,
            Ok(None) => {}
            Err(e) => return store_error(path, IngestError::from_catalog(&hash, e), hash),
        }

        match self.catalog.insert(record).await {
            Ok(id) => {
                debug!(%hash, %id, "inserted");
                self.archive_inserted(path, hash).await
            }
            Err(e) => match IngestError::from_catalog(&hash, e) {
                IngestError::DuplicateKey { .. } => {
                    debug!(%hash, "lost the insert race");
                    self.skip_duplicate(path, hash).await
                }
                error => store_error(path, error, hash),
            },
        }
    }

    async fn archive_inserted(&self, path: PathBuf, hash: String) -> FileReport {
        let (archived_to, side_effect) = match archive(&path, &self.config.done_dir).await {
            Ok(destination) => (Some(destination), None),
            Err(e) => {
                warn!(%hash, error = %e, "record stored but the file could not be archived");
                (None, Some(e))
            }
        };

        info!(%hash, "inserted");
        FileReport {
            path,
            outcome: Outcome::Inserted { hash, archived_to },
            side_effect,
        }
    }

    async fn skip_duplicate(&self, path: PathBuf, hash: String) -> FileReport {
        let side_effect = match discard(&path).await {
            Ok(()) => None,
            Err(e) => {
                warn!(%hash, error = %e, "duplicate could not be discarded");
                Some(e)
            }
        };

        info!(%hash, "duplicate");
        FileReport {
            path,
            outcome: Outcome::DuplicateSkipped { hash },
            side_effect,
        }
    }
}

/// Resolves once `cancel` is set. Never resolves if the sender is gone without cancelling.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn parse_failed(path: PathBuf, error: IngestError) -> FileReport {
    warn!(error = %error, "unparsable torrent left in place");
    FileReport {
        path,
        outcome: Outcome::ParseFailed { error },
        side_effect: None,
    }
}

fn store_error(path: PathBuf, error: IngestError, hash: String) -> FileReport {
    warn!(%hash, error = %error, "catalog failure, file left in place");
    FileReport {
        path,
        outcome: Outcome::StoreError { hash, error },
        side_effect: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    fn pipeline(done_dir: &Path, concurrency: usize) -> Pipeline {
        Pipeline::new(
            Arc::new(MemoryCatalog::new()),
            PipelineConfig {
                done_dir: done_dir.to_path_buf(),
                concurrency: NonZeroUsize::new(concurrency).unwrap(),
                decode: DecodeOptions::default(),
            },
        )
    }

    #[tokio::test]
    async fn missing_file_is_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let report = pipeline(dir.path(), 1)
            .process_file(dir.path().join("vanished.torrent"))
            .await;

        assert!(matches!(
            report.outcome,
            Outcome::ParseFailed {
                error: IngestError::Filesystem { operation: "read", .. }
            }
        ));
        assert!(report.outcome.is_failure());
        assert_eq!(report.outcome.hash(), None);
    }

    #[tokio::test]
    async fn invalid_metadata_is_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-info.torrent");
        std::fs::write(&path, b"d8:announce3:urle").unwrap();

        let report = pipeline(dir.path(), 1).process_file(path.clone()).await;
        assert!(matches!(
            report.outcome,
            Outcome::ParseFailed {
                error: IngestError::InvalidMetadata { .. }
            }
        ));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn summary_counts_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let done = dir.path().join("done");
        std::fs::create_dir_all(&done).unwrap();

        let good = dir.path().join("good.torrent");
        std::fs::write(&good, b"d4:infod6:lengthi1e4:name1:a12:piece lengthi1eee").unwrap();
        let copy = dir.path().join("good-copy.torrent");
        std::fs::copy(&good, &copy).unwrap();
        let bad = dir.path().join("bad.torrent");
        std::fs::write(&bad, b"d4:info").unwrap();

        let (_tx, rx) = watch::channel(false);
        let summary = pipeline(&done, 1)
            .run(vec![bad.clone(), copy.clone(), good.clone()], rx)
            .await;

        assert_eq!(summary.discovered, 3);
        assert_eq!(summary.reports.len(), 3);
        assert_eq!(summary.inserted(), 1);
        assert_eq!(summary.duplicates(), 1);
        assert_eq!(summary.parse_failures(), 1);
        assert_eq!(summary.store_errors(), 0);
        assert_eq!(summary.not_admitted, 0);
        assert_eq!(summary.worker_failures, 0);

        // Admission follows the given order, so the copy is the one that gets stored.
        assert!(matches!(
            summary.report_for(&copy).unwrap().outcome,
            Outcome::Inserted { archived_to: Some(_), .. }
        ));
        assert!(!good.exists());
        assert!(bad.exists());

        let line = summary.to_string();
        assert!(line.starts_with("3 discovered"));
    }
}
