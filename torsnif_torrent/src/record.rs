//! The normalized catalog entry derived from a torrent file.

use chrono::Utc;
use human_bytes::human_bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meta_info::{Magnet, MetaInfo};

/// A byte count paired with its human readable rendering.
///
/// The number is authoritative. The string exists for presentation only and is never parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanSize(pub u64, pub String);

impl HumanSize {
    pub fn new(bytes: u64) -> Self {
        Self(bytes, human_bytes(bytes as f64))
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    pub fn human(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    pub path: String,
    pub length: HumanSize,
}

/// Everything the catalog stores about one torrent, keyed by [`hash`](TorrentRecord::hash).
///
/// Built once per successfully parsed file and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentRecord {
    pub id: Uuid,
    pub uuid: Uuid,
    pub name: String,
    pub created_by: String,
    pub creation_date: Option<i64>,
    pub total_files: usize,
    pub hash: String,
    pub magnet: Magnet,
    pub piece_length: u64,
    pub length: HumanSize,
    pub files: Vec<TorrentFile>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TorrentRecord {
    pub fn new(meta_info: &MetaInfo) -> Self {
        let files: Vec<TorrentFile> = meta_info
            .files()
            .layout(meta_info.name())
            .into_iter()
            .map(|(path, length)| TorrentFile {
                path,
                length: HumanSize::new(length),
            })
            .collect();

        let now = Utc::now().timestamp();

        TorrentRecord {
            id: Uuid::new_v4(),
            uuid: Uuid::new_v4(),
            name: meta_info.name().to_string(),
            created_by: meta_info.created_by().cloned().unwrap_or_default(),
            creation_date: meta_info.creation_date_raw(),
            total_files: files.len(),
            hash: meta_info.info_hash().as_hex(),
            magnet: meta_info.magnet(),
            piece_length: meta_info.piece_length(),
            length: HumanSize::new(meta_info.total_length()),
            files,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&MetaInfo> for TorrentRecord {
    fn from(meta_info: &MetaInfo) -> Self {
        Self::new(meta_info)
    }
}
