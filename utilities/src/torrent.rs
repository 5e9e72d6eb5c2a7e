use std::{
    fs,
    path::{Path, PathBuf},
};

use torsnif_parsers::bencode::{self, Dictionary, Value};

/// Builds bencoded torrent files for tests.
#[derive(Debug, Clone)]
pub struct TorrentBuilder {
    name: String,
    piece_length: i64,
    files: Vec<(Vec<String>, i64)>,
    single_length: Option<i64>,
    announce: Option<String>,
    announce_list: Vec<Vec<String>>,
    created_by: Option<String>,
    creation_date: Option<i64>,
}

impl TorrentBuilder {
    pub fn new(name: &str) -> Self {
        TorrentBuilder {
            name: name.to_string(),
            piece_length: 262_144,
            files: Vec::new(),
            single_length: None,
            announce: None,
            announce_list: Vec::new(),
            created_by: None,
            creation_date: None,
        }
    }

    /// Adds an entry to the `files` list, making this a multi-file torrent.
    pub fn file(mut self, path: &[&str], length: i64) -> Self {
        self.files
            .push((path.iter().map(|s| s.to_string()).collect(), length));
        self
    }

    /// Makes this a single-file torrent of `length` bytes.
    pub fn single(mut self, length: i64) -> Self {
        self.single_length = Some(length);
        self
    }

    pub fn piece_length(mut self, piece_length: i64) -> Self {
        self.piece_length = piece_length;
        self
    }

    pub fn announce(mut self, url: &str) -> Self {
        self.announce = Some(url.to_string());
        self
    }

    pub fn tier(mut self, urls: &[&str]) -> Self {
        self.announce_list
            .push(urls.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn created_by(mut self, created_by: &str) -> Self {
        self.created_by = Some(created_by.to_string());
        self
    }

    pub fn creation_date(mut self, creation_date: i64) -> Self {
        self.creation_date = Some(creation_date);
        self
    }

    pub fn info_value(&self) -> Value {
        let mut info = Dictionary::new();
        info.insert(b"name".to_vec(), Value::from(self.name.as_str()));
        info.insert(b"piece length".to_vec(), Value::Integer(self.piece_length));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0xab; 20]));

        if let Some(length) = self.single_length {
            info.insert(b"length".to_vec(), Value::Integer(length));
        }

        if !self.files.is_empty() {
            let files = self
                .files
                .iter()
                .map(|(path, length)| {
                    let mut file = Dictionary::new();
                    file.insert(b"length".to_vec(), Value::Integer(*length));
                    file.insert(
                        b"path".to_vec(),
                        Value::List(path.iter().map(|p| Value::from(p.as_str())).collect()),
                    );
                    Value::Dictionary(file)
                })
                .collect();
            info.insert(b"files".to_vec(), Value::List(files));
        }

        Value::Dictionary(info)
    }

    pub fn to_value(&self) -> Value {
        let mut root = Dictionary::new();
        root.insert(b"info".to_vec(), self.info_value());

        if let Some(announce) = &self.announce {
            root.insert(b"announce".to_vec(), Value::from(announce.as_str()));
        }

        if !self.announce_list.is_empty() {
            let tiers = self
                .announce_list
                .iter()
                .map(|tier| Value::List(tier.iter().map(|t| Value::from(t.as_str())).collect()))
                .collect();
            root.insert(b"announce-list".to_vec(), Value::List(tiers));
        }

        if let Some(created_by) = &self.created_by {
            root.insert(b"created by".to_vec(), Value::from(created_by.as_str()));
        }

        if let Some(creation_date) = self.creation_date {
            root.insert(b"creation date".to_vec(), Value::Integer(creation_date));
        }

        Value::Dictionary(root)
    }

    /// Canonical bencode of the torrent.
    pub fn to_bytes(&self) -> Vec<u8> {
        bencode::to_bytes(&self.to_value())
    }

    /// Same torrent with every dictionary written in descending key order.
    pub fn to_reversed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_reversed(&self.to_value(), &mut out);
        out
    }

    /// Writes the canonical bytes to `dir/file_name` and returns the path.
    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        fs::write(&path, self.to_bytes()).expect("unable to write test torrent");
        path
    }
}

fn write_reversed(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Dictionary(dictionary) => {
            out.push(b'd');
            for (k, v) in dictionary.iter().rev() {
                out.extend_from_slice(format!("{}:", k.len()).as_bytes());
                out.extend_from_slice(k);
                write_reversed(v, out);
            }
            out.push(b'e');
        }
        Value::List(list) => {
            out.push(b'l');
            for item in list {
                write_reversed(item, out);
            }
            out.push(b'e');
        }
        other => out.extend_from_slice(&bencode::to_bytes(other)),
    }
}

/// The two-file torrent used throughout the tests: 1 MiB plus 2000 bytes.
pub fn two_file_torrent() -> TorrentBuilder {
    TorrentBuilder::new("two-files")
        .file(&["disk", "image.bin"], 1_048_576)
        .file(&["notes.txt"], 2_000)
        .announce("http://tracker.example/announce")
        .created_by("utilities")
        .creation_date(1_700_000_000)
}
