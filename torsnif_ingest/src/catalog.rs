//! The persisted collection of ingested torrents, keyed by info hash.
//!
//! The pipeline only ever issues [`Catalog::find_by_hash`] and [`Catalog::insert`]. Because those
//! are two separate calls, concurrent workers can both miss on lookup for the same hash; every
//! implementation must therefore reject the second insert with [`CatalogError::DuplicateKey`]
//! rather than store the hash twice.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use torsnif_torrent::TorrentRecord;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// A record with the same hash is already stored.
    #[error("a record with hash {hash} already exists")]
    DuplicateKey { hash: String },

    /// The backing storage could not be reached or written.
    #[error("catalog storage {} unavailable: {source}", path.display())]
    Unavailable { path: PathBuf, source: io::Error },

    /// A stored entry could not be read back.
    #[error("catalog entry on line {line} of {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    /// Any other backend failure.
    #[error("catalog failure: {0}")]
    Other(String),
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Verifies the backend is usable. Called once before a run starts.
    async fn health_check(&self) -> Result<(), CatalogError> {
        Ok(())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<TorrentRecord>, CatalogError>;

    /// Stores `record` and returns its id, or fails with [`CatalogError::DuplicateKey`] if its
    /// hash is already present.
    async fn insert(&self, record: TorrentRecord) -> Result<Uuid, CatalogError>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize, CatalogError>;
}

/// A catalog that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: Mutex<HashMap<String, TorrentRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<TorrentRecord>, CatalogError> {
        Ok(self.records.lock().await.get(hash).cloned())
    }

    async fn insert(&self, record: TorrentRecord) -> Result<Uuid, CatalogError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.hash) {
            return Err(CatalogError::DuplicateKey { hash: record.hash });
        }

        let id = record.id;
        records.insert(record.hash.clone(), record);
        Ok(id)
    }

    async fn len(&self) -> Result<usize, CatalogError> {
        Ok(self.records.lock().await.len())
    }
}

/// A catalog persisted as one json document per line.
///
/// The whole file is indexed in memory on open. Inserts append a line and are only visible once
/// the write has been synced.
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    state: Mutex<JsonCatalogState>,
}

#[derive(Debug)]
struct JsonCatalogState {
    index: HashMap<String, TorrentRecord>,
    file: File,

    /// Length of the file after the last complete append.
    len: u64,
}

impl JsonCatalog {
    /// Opens the catalog at `path`, creating an empty one if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |source| CatalogError::Unavailable {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(unavailable)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await
            .map_err(unavailable)?;

        let contents = tokio::fs::read_to_string(&path).await.map_err(unavailable)?;

        let mut index = HashMap::new();
        let mut offset = 0;
        let mut torn_at = None;
        let mut unterminated = false;
        for (i, line) in contents.split_inclusive('\n').enumerate() {
            let terminated = line.ends_with('\n');
            let body = line.trim_end();

            if !body.is_empty() {
                match serde_json::from_str::<TorrentRecord>(body) {
                    Ok(record) => {
                        unterminated = !terminated;
                        index.entry(record.hash.clone()).or_insert(record);
                    }
                    // Only the last line can lack a newline: an append that never completed.
                    Err(_) if !terminated => {
                        torn_at = Some(offset);
                        break;
                    }
                    Err(source) => {
                        return Err(CatalogError::Corrupt {
                            path: path.clone(),
                            line: i + 1,
                            source,
                        })
                    }
                }
            }
            offset += line.len();
        }

        if let Some(at) = torn_at {
            warn!(path = %path.display(), offset = at, "dropping incomplete last catalog entry");
            file.set_len(at as u64).await.map_err(unavailable)?;
        } else if unterminated {
            append(&mut file, b"\n").await.map_err(unavailable)?;
        }

        let len = file.metadata().await.map_err(unavailable)?.len();

        info!(path = %path.display(), records = index.len(), "opened catalog");

        Ok(JsonCatalog {
            path,
            state: Mutex::new(JsonCatalogState { index, file, len }),
        })
    }

    /// Cuts the file back to `len` bytes, removing whatever a failed append left behind.
    async fn truncate(&self, len: u64) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await?
            .set_len(len)
            .await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn health_check(&self) -> Result<(), CatalogError> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|_| ())
            .map_err(|source| CatalogError::Unavailable {
                path: self.path.clone(),
                source,
            })
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<TorrentRecord>, CatalogError> {
        Ok(self.state.lock().await.index.get(hash).cloned())
    }

    async fn insert(&self, record: TorrentRecord) -> Result<Uuid, CatalogError> {
        let mut state = self.state.lock().await;
        if state.index.contains_key(&record.hash) {
            return Err(CatalogError::DuplicateKey { hash: record.hash });
        }

        let mut line = serde_json::to_vec(&record).map_err(|e| CatalogError::Other(e.to_string()))?;
        line.push(b'\n');

        let start = state.len;
        if let Err(source) = append(&mut state.file, &line).await {
            if let Err(e) = self.truncate(start).await {
                warn!(path = %self.path.display(), error = %e, "unable to roll back failed append");
            }
            return Err(CatalogError::Unavailable {
                path: self.path.clone(),
                source,
            });
        }
        state.len = start + line.len() as u64;

        debug!(hash = %record.hash, "appended catalog record");

        let id = record.id;
        state.index.insert(record.hash.clone(), record);
        Ok(id)
    }

    async fn len(&self) -> Result<usize, CatalogError> {
        Ok(self.state.lock().await.index.len())
    }
}

/// Writes `bytes` at the end of `file` and waits until they are durable.
async fn append(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use torsnif_torrent::MetaInfo;

    fn record(name: &str) -> TorrentRecord {
        let bytes = format!("d4:infod6:lengthi1e4:name{}:{name}12:piece lengthi1eee", name.len());
        TorrentRecord::new(&MetaInfo::from_bytes(bytes.as_bytes()).unwrap())
    }

    #[tokio::test]
    async fn memory_catalog_rejects_duplicate_hashes() {
        let catalog = MemoryCatalog::new();
        let first = record("a");
        let again = record("a");
        assert_eq!(first.hash, again.hash);

        let id = catalog.insert(first.clone()).await.unwrap();
        assert_eq!(id, first.id);
        assert!(matches!(
            catalog.insert(again).await,
            Err(CatalogError::DuplicateKey { .. })
        ));

        assert_eq!(catalog.find_by_hash(&first.hash).await.unwrap(), Some(first));
        assert_eq!(catalog.find_by_hash("missing").await.unwrap(), None);
        assert_eq!(catalog.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn json_catalog_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.jsonl");

        let stored = record("persisted");
        {
            let catalog = JsonCatalog::open(&path).await.unwrap();
            catalog.health_check().await.unwrap();
            catalog.insert(stored.clone()).await.unwrap();
            catalog.insert(record("other")).await.unwrap();
        }

        let catalog = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(catalog.len().await.unwrap(), 2);
        assert_eq!(
            catalog.find_by_hash(&stored.hash).await.unwrap(),
            Some(stored.clone())
        );
        assert!(matches!(
            catalog.insert(stored).await,
            Err(CatalogError::DuplicateKey { .. })
        ));
    }

    #[tokio::test]
    async fn json_catalog_reports_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.jsonl");
        tokio::fs::write(&path, "{\"not\": \"a record\"}\n").await.unwrap();

        assert!(matches!(
            JsonCatalog::open(&path).await,
            Err(CatalogError::Corrupt { line: 1, .. })
        ));
    }

    #[tokio::test]
    async fn json_catalog_terminates_an_unfinished_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.jsonl");
        let first = record("first");
        tokio::fs::write(&path, serde_json::to_string(&first).unwrap())
            .await
            .unwrap();

        {
            let catalog = JsonCatalog::open(&path).await.unwrap();
            assert_eq!(catalog.len().await.unwrap(), 1);
            catalog.insert(record("second")).await.unwrap();
        }

        let catalog = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(catalog.len().await.unwrap(), 2);
        assert_eq!(
            catalog.find_by_hash(&first.hash).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn json_catalog_drops_a_torn_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.jsonl");
        let complete = format!("{}\n", serde_json::to_string(&record("kept")).unwrap());
        tokio::fs::write(&path, format!("{complete}{{\"id\":\"0f"))
            .await
            .unwrap();

        {
            let catalog = JsonCatalog::open(&path).await.unwrap();
            assert_eq!(catalog.len().await.unwrap(), 1);
            assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), complete);
            catalog.insert(record("next")).await.unwrap();
        }

        assert_eq!(JsonCatalog::open(&path).await.unwrap().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_append_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.jsonl");
        let catalog = JsonCatalog::open(&path).await.unwrap();
        catalog.insert(record("first")).await.unwrap();
        let committed = tokio::fs::read(&path).await.unwrap();

        // Leave half a record behind and make further writes through the catalog fail.
        {
            let mut state = catalog.state.lock().await;
            state.file = File::open(&path).await.unwrap();
        }
        let mut partial = committed.clone();
        partial.extend_from_slice(b"{\"id\":");
        tokio::fs::write(&path, &partial).await.unwrap();

        let failed = record("second");
        assert!(matches!(
            catalog.insert(failed.clone()).await,
            Err(CatalogError::Unavailable { .. })
        ));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), committed);
        assert_eq!(catalog.find_by_hash(&failed.hash).await.unwrap(), None);
        assert_eq!(catalog.len().await.unwrap(), 1);

        let reopened = JsonCatalog::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 1);
        reopened.insert(failed).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
    }
}
