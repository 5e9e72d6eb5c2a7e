use std::io;
use std::path::PathBuf;

use thiserror::Error;
use torsnif_parsers::bencode;
use torsnif_torrent::MetaInfoError;

use crate::catalog::CatalogError;

pub type IngestResult<T> = Result<T, IngestError>;

/// Errors produced while ingesting torrent files.
///
/// Everything except [`IngestError::Setup`] is scoped to a single file and never stops the run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The file is not valid bencode.
    #[error("malformed bencode: {source}")]
    MalformedEncoding {
        path: PathBuf,
        source: bencode::Error,
    },

    /// The file is valid bencode but not a usable torrent.
    #[error("invalid torrent metadata: {source}")]
    InvalidMetadata {
        path: PathBuf,
        source: MetaInfoError,
    },

    /// The catalog could not serve a lookup or accept a write.
    #[error("catalog unavailable: {source}")]
    StoreUnavailable { hash: String, source: CatalogError },

    /// Another writer stored the same hash between our lookup and our insert.
    #[error("hash {hash} was inserted concurrently")]
    DuplicateKey { hash: String },

    /// Reading, moving or deleting a file failed.
    #[error("filesystem failure during {operation} on {}: {source}", path.display())]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// The run cannot start.
    #[error("setup failed: {reason}")]
    Setup { reason: String },
}

impl IngestError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        IngestError::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn setup(reason: impl Into<String>) -> Self {
        IngestError::Setup {
            reason: reason.into(),
        }
    }

    pub(crate) fn from_meta_info(path: impl Into<PathBuf>, err: MetaInfoError) -> Self {
        match err {
            MetaInfoError::Malformed(source) => IngestError::MalformedEncoding {
                path: path.into(),
                source,
            },
            source @ MetaInfoError::InvalidMetadata { .. } => IngestError::InvalidMetadata {
                path: path.into(),
                source,
            },
        }
    }

    pub(crate) fn from_catalog(hash: &str, err: CatalogError) -> Self {
        match err {
            CatalogError::DuplicateKey { hash } => IngestError::DuplicateKey { hash },
            source => IngestError::StoreUnavailable {
                hash: hash.to_string(),
                source,
            },
        }
    }
}
