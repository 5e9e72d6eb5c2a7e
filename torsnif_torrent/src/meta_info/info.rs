use std::fmt::Display;

use serde::{Deserialize, Serialize};
use torsnif_parsers::bencode::{self, Value};

use super::files::Files;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    // In the single file state this is the filename. In the multifile state this is the the name
    // of the directory in which to store all the files. This is purely advisory. (string)
    pub(crate) name: String,

    // number of bytes in each piece (integer).
    //
    // Every piece is of equal length except for the final piece, which is irregular. The number
    // of pieces is thus determined by 'ceil( total length / piece size )'.
    pub(crate) piece_length: u64,

    // number of 20-byte SHA1 hash values found in the `pieces` string. Zero when the key is
    // absent.
    pub(crate) number_of_pieces: usize,

    // (optional) if set to "1", the client MUST publish its presence to get other peers ONLY via
    // the trackers explicitly described in the metainfo file.
    pub(crate) private: Option<bool>,

    // A torrent can be a `Single-File` or a 'MultiFile'. This key reprasents that state
    #[serde(flatten)]
    pub(crate) files: Files,
}

impl Info {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn number_of_pieces(&self) -> usize {
        self.number_of_pieces
    }

    pub fn is_private(&self) -> bool {
        self.private.unwrap_or(false)
    }

    pub fn files(&self) -> &Files {
        &self.files
    }
}

/// The SHA-1 digest of the canonical bencoding of a torrent's `info` dictionary.
///
/// Because the digest is taken over the re-encoded value rather than the bytes read from disk,
/// two files whose `info` dictionaries are logically equal hash identically even if their keys
/// were written in a different order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    pub fn from_info(info: &Value) -> Self {
        let canonical = bencode::to_bytes(info);
        Self(sha1_smol::Sha1::from(&canonical).digest().bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex rendering, the form used as the catalog key.
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_sha1_of_canonical_bytes() {
        let info = bencode::parse("d4:name3:abc12:piece lengthi16384ee").unwrap();
        let expected = sha1_smol::Sha1::from("d4:name3:abc12:piece lengthi16384ee")
            .digest()
            .to_string();

        assert_eq!(InfoHash::from_info(&info).as_hex(), expected);
    }

    #[test]
    fn hash_ignores_source_key_order() {
        let sorted = bencode::parse("d6:lengthi5e4:name3:abc12:piece lengthi16384ee").unwrap();
        let shuffled = bencode::parse("d12:piece lengthi16384e4:name3:abc6:lengthi5ee").unwrap();

        let a = InfoHash::from_info(&sorted);
        let b = InfoHash::from_info(&shuffled);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), a.as_hex());
        assert_eq!(a.as_hex().len(), 40);
        assert!(a.as_hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
