mod files;
mod info;
mod magnet;

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use thiserror::Error;
use torsnif_parsers::bencode::{self, DecodeOptions, Dictionary, Value};

pub use files::{FileEntry, Files};
pub use info::{Info, InfoHash};
pub use magnet::Magnet;

/// Errors raised while turning bytes into a [`MetaInfo`].
#[derive(Debug, Error)]
pub enum MetaInfoError {
    /// The input is not valid bencode.
    #[error(transparent)]
    Malformed(#[from] bencode::Error),

    /// The input is valid bencode but not a usable torrent.
    #[error("Invalid torrent metadata: `{field}` {reason}")]
    InvalidMetadata {
        field: Cow<'static, str>,
        reason: &'static str,
    },
}

impl MetaInfoError {
    fn invalid(field: impl Into<Cow<'static, str>>, reason: &'static str) -> Self {
        MetaInfoError::InvalidMetadata {
            field: field.into(),
            reason,
        }
    }
}

/// A type reprasenting the extracted contents of [Metainfo
/// files](https://en.wikipedia.org/wiki/Torrent_file) (also known as .torrent files)
///
/// Meteinfo files are bencoded dictionaries that contains metadata about files and folders to be
/// distributed, and usually also: a list of the network locations of
/// [trackers](https://en.wikipedia.org/wiki/BitTorrent_tracker)
#[derive(Debug, Clone)]
pub struct MetaInfo {
    // A dictionary that describes the file(s) of the torrent.
    pub(crate) info: Info,

    // Digest over the canonical encoding of the `info` dictionary as it appeared in the file.
    pub(crate) info_hash: InfoHash,

    // The announce URL of the tracker (string)
    pub(crate) announce: Option<String>,

    // (BEP: 12) list of tiers, each a list of tracker URLs.
    pub(crate) announce_list: Option<Vec<Vec<String>>>,

    // (BEP: 19) web seeds.
    pub(crate) url_list: Option<Vec<String>>,

    // The creation time of the torrent, in standard UNIX epoch format (integer, seconds since
    // 1-Jan-1970 00:00:00 UTC)
    pub(crate) creation_date: Option<i64>,

    // Free-form textual comments of the author (string)
    pub(crate) comment: Option<String>,

    // Name and version of the program used to create the .torrent (string)
    pub(crate) created_by: Option<String>,

    // The string encoding format used to generate the pieces part of the info dictionary
    pub(crate) encoding: Option<String>,
}

impl MetaInfo {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetaInfoError> {
        Self::from_bytes_with(bytes, DecodeOptions::default())
    }

    pub fn from_bytes_with(bytes: &[u8], options: DecodeOptions) -> Result<Self, MetaInfoError> {
        let value = bencode::parse_with(bytes, options)?;
        Self::from_value(&value)
    }

    /// Extracts the metadata from an already decoded value.
    ///
    /// Fails with [`MetaInfoError::InvalidMetadata`] if a required key is missing or has the
    /// wrong type. Optional keys with the wrong type are treated as absent.
    pub fn from_value(value: &Value) -> Result<Self, MetaInfoError> {
        let root = value
            .as_dictionary()
            .ok_or_else(|| MetaInfoError::invalid("<root>", "must be a dictionary"))?;

        let info_value = root
            .get(b"info".as_slice())
            .ok_or_else(|| MetaInfoError::invalid("info", "is missing"))?;
        let info_dict = info_value
            .as_dictionary()
            .ok_or_else(|| MetaInfoError::invalid("info", "must be a dictionary"))?;

        let info = extract_info(info_dict)?;
        let info_hash = InfoHash::from_info(info_value);

        let announce_list = value.get("announce-list").and_then(Value::as_list).map(|tiers| {
            tiers
                .iter()
                .filter_map(Value::as_list)
                .map(|tier| tier.iter().filter_map(text).collect::<Vec<_>>())
                .collect()
        });

        let url_list = value.get("url-list").and_then(|v| match v {
            Value::Bytes(_) => text(v).map(|url| vec![url]),
            Value::List(urls) => Some(urls.iter().filter_map(text).collect()),
            _ => None,
        });

        Ok(MetaInfo {
            info,
            info_hash,
            announce: value.get("announce").and_then(text),
            announce_list,
            url_list,
            creation_date: value.get("creation date").and_then(Value::as_integer),
            comment: value.get("comment").and_then(text),
            created_by: value.get("created by").and_then(text),
            encoding: value.get("encoding").and_then(text),
        })
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info_hash
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn files(&self) -> &Files {
        &self.info.files
    }

    pub fn piece_length(&self) -> u64 {
        self.info.piece_length
    }

    pub fn number_of_pieces(&self) -> usize {
        self.info.number_of_pieces
    }

    /// Sum of every file length in the torrent.
    pub fn total_length(&self) -> u64 {
        // checked during extraction
        self.info.files.total_length().unwrap_or(u64::MAX)
    }

    /// Returns the creation time of the torrent, in [RFC
    /// 2822](https://www.rfc-editor.org/rfc/rfc2822) format
    pub fn creation_date(&self) -> Option<String> {
        self.creation_date
            .and_then(|datetime| DateTime::<Utc>::from_timestamp(datetime, 0))
            .map(|datetime| datetime.to_rfc2822())
    }

    /// Returns the creation time of the torrent, in standard UNIX epoch format.
    pub fn creation_date_raw(&self) -> Option<i64> {
        self.creation_date
    }

    /// Returns comments of the author contained in the torrent file (if any).
    pub fn comment(&self) -> Option<&String> {
        self.comment.as_ref()
    }

    pub fn created_by(&self) -> Option<&String> {
        self.created_by.as_ref()
    }

    pub fn encoding(&self) -> Option<&String> {
        self.encoding.as_ref()
    }

    pub fn announce(&self) -> Option<&String> {
        self.announce.as_ref()
    }

    pub fn announce_list(&self) -> Option<&Vec<Vec<String>>> {
        self.announce_list.as_ref()
    }

    pub fn url_list(&self) -> Option<&Vec<String>> {
        self.url_list.as_ref()
    }

    /// One representative tracker per announce tier, followed by `announce`, without repeats.
    ///
    /// Only the first tracker of every tier is kept.
    pub fn trackers(&self) -> Vec<String> {
        let tier_heads = self
            .announce_list
            .iter()
            .flatten()
            .filter_map(|tier| tier.first());

        let mut trackers: Vec<String> = Vec::new();
        for tracker in tier_heads.chain(self.announce.as_ref()) {
            if !trackers.contains(tracker) {
                trackers.push(tracker.clone());
            }
        }
        trackers
    }

    pub fn magnet(&self) -> Magnet {
        Magnet {
            display_name: self.info.name.clone(),
            info_hash: self.info_hash.as_hex(),
            trackers: self.trackers(),
        }
    }
}

fn text(value: &Value) -> Option<String> {
    value.as_text().map(Cow::into_owned)
}

/// Reads `key`, preferring its `.utf-8` variant when the torrent carries one.
fn utf8_preferred<'a>(dict: &'a Dictionary, key: &str) -> Option<&'a Value> {
    dict.get(format!("{key}.utf-8").as_bytes())
        .filter(|v| v.as_bytes().is_some() || v.as_list().is_some())
        .or_else(|| dict.get(key.as_bytes()))
}

fn non_negative(
    field: impl Into<Cow<'static, str>>,
    value: Option<&Value>,
) -> Result<u64, MetaInfoError> {
    let field = field.into();
    let value = value.ok_or_else(|| MetaInfoError::invalid(field.clone(), "is missing"))?;
    let i = value
        .as_integer()
        .ok_or_else(|| MetaInfoError::invalid(field.clone(), "must be an integer"))?;
    u64::try_from(i).map_err(|_| MetaInfoError::invalid(field, "must not be negative"))
}

fn extract_info(dict: &Dictionary) -> Result<Info, MetaInfoError> {
    let name = utf8_preferred(dict, "name")
        .ok_or_else(|| MetaInfoError::invalid("info.name", "is missing"))?
        .as_text()
        .ok_or_else(|| MetaInfoError::invalid("info.name", "must be a byte string"))?
        .into_owned();

    let piece_length = non_negative("info.piece length", dict.get(b"piece length".as_slice()))?;
    if piece_length == 0 {
        return Err(MetaInfoError::invalid("info.piece length", "must be positive"));
    }

    let number_of_pieces = dict
        .get(b"pieces".as_slice())
        .and_then(Value::as_bytes)
        .map_or(0, |p| p.len() / 20);

    let private = dict
        .get(b"private".as_slice())
        .and_then(Value::as_integer)
        .map(|p| p == 1);

    let files = match dict.get(b"files".as_slice()) {
        Some(files) => {
            let list = files
                .as_list()
                .ok_or_else(|| MetaInfoError::invalid("info.files", "must be a list"))?;

            let files = list
                .iter()
                .enumerate()
                .map(|(i, file)| extract_file(i, file))
                .collect::<Result<Vec<_>, _>>()?;

            Files::MultiFile { files }
        }
        None => match dict.get(b"length".as_slice()) {
            Some(length) => Files::SingleFile {
                length: non_negative("info.length", Some(length))?,
            },
            None => {
                return Err(MetaInfoError::invalid(
                    "info.files",
                    "is missing and so is info.length",
                ))
            }
        },
    };

    if files.total_length().is_none() {
        return Err(MetaInfoError::invalid("info.files", "total length overflows"));
    }

    Ok(Info {
        name,
        piece_length,
        number_of_pieces,
        private,
        files,
    })
}

fn extract_file(index: usize, file: &Value) -> Result<FileEntry, MetaInfoError> {
    let dict = file.as_dictionary().ok_or_else(|| {
        MetaInfoError::invalid(format!("info.files[{index}]"), "must be a dictionary")
    })?;

    let length = non_negative(
        format!("info.files[{index}].length"),
        dict.get(b"length".as_slice()),
    )?;

    let path_field = format!("info.files[{index}].path");
    let components = utf8_preferred(dict, "path")
        .ok_or_else(|| MetaInfoError::invalid(path_field.clone(), "is missing"))?
        .as_list()
        .ok_or_else(|| MetaInfoError::invalid(path_field.clone(), "must be a list"))?;

    let path = components
        .iter()
        .map(|c| {
            text(c).ok_or_else(|| {
                MetaInfoError::invalid(path_field.clone(), "must only contain byte strings")
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if path.is_empty() {
        return Err(MetaInfoError::invalid(path_field, "must not be empty"));
    }

    Ok(FileEntry { length, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(input: &str) -> String {
        match MetaInfo::from_bytes(input.as_bytes()).unwrap_err() {
            MetaInfoError::InvalidMetadata { field, .. } => field.into_owned(),
            other => panic!("expected invalid metadata, got {other}"),
        }
    }

    #[test]
    fn extracts_multi_file_torrent() {
        let meta = MetaInfo::from_bytes(
            b"d8:announce13:http://t1/ann10:created by5:maker13:creation datei1700000000e\
              4:infod5:filesld6:lengthi1048576e4:pathl1:a5:b.binee\
              d6:lengthi2000e4:pathl5:c.txteee4:name4:pack12:piece lengthi262144eee",
        )
        .unwrap();

        assert_eq!(meta.name(), "pack");
        assert_eq!(meta.piece_length(), 262144);
        assert_eq!(meta.files().number_of_files(), 2);
        assert_eq!(meta.total_length(), 1_050_576);
        assert_eq!(meta.created_by().map(String::as_str), Some("maker"));
        assert_eq!(meta.creation_date_raw(), Some(1_700_000_000));
        assert_eq!(meta.trackers(), vec!["http://t1/ann".to_string()]);
    }

    #[test]
    fn single_file_torrent_is_one_file() {
        let meta =
            MetaInfo::from_bytes(b"d4:infod6:lengthi42e4:name5:a.iso12:piece lengthi16eee").unwrap();

        assert_eq!(meta.files(), &Files::SingleFile { length: 42 });
        assert_eq!(meta.files().layout(meta.name()), vec![("a.iso".to_string(), 42)]);
    }

    #[test]
    fn announce_list_keeps_first_of_each_tier() {
        let meta = MetaInfo::from_bytes(
            b"d8:announce2:t213:announce-listll2:t12:t9el2:t22:t8el2:t3ee\
              4:infod6:lengthi1e4:name1:x12:piece lengthi1eee",
        )
        .unwrap();

        assert_eq!(meta.trackers(), vec!["t1", "t2", "t3"]);
        assert_eq!(meta.magnet().trackers, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn utf8_variants_are_preferred() {
        let meta = MetaInfo::from_bytes(
            b"d4:infod5:filesld6:lengthi1e4:pathl3:olde10:path.utf-8l3:neweee\
              4:name3:old10:name.utf-83:new12:piece lengthi1eee",
        )
        .unwrap();

        assert_eq!(meta.name(), "new");
        assert_eq!(meta.files().layout(meta.name())[0].0, "new");
    }

    #[test]
    fn missing_or_mistyped_required_fields() {
        assert_eq!(invalid_field("i1e"), "<root>");
        assert_eq!(invalid_field("d3:fooi1ee"), "info");
        assert_eq!(invalid_field("d4:infoi1ee"), "info");
        assert_eq!(invalid_field("d4:infod12:piece lengthi1e6:lengthi1eee"), "info.name");
        assert_eq!(invalid_field("d4:infod4:name1:x6:lengthi1eee"), "info.piece length");
        assert_eq!(
            invalid_field("d4:infod4:name1:x12:piece length1:x6:lengthi1eee"),
            "info.piece length"
        );
        assert_eq!(invalid_field("d4:infod4:name1:x12:piece lengthi1eee"), "info.files");
        assert_eq!(
            invalid_field("d4:infod5:filesld4:pathl1:aeee4:name1:x12:piece lengthi1eee"),
            "info.files[0].length"
        );
        assert_eq!(
            invalid_field("d4:infod5:filesld6:lengthi-1e4:pathl1:aeee4:name1:x12:piece lengthi1eee"),
            "info.files[0].length"
        );
        assert_eq!(
            invalid_field("d4:infod5:filesld6:lengthi1e4:pathleee4:name1:x12:piece lengthi1eee"),
            "info.files[0].path"
        );
    }

    #[test]
    fn malformed_bencode_is_reported_as_such() {
        let err = MetaInfo::from_bytes(b"d4:infod4:name").unwrap_err();
        assert!(matches!(err, MetaInfoError::Malformed(_)));
    }
}
