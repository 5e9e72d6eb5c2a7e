use std::path::MAIN_SEPARATOR_STR;

use serde::{Deserialize, Serialize};

/// Reprasents the the single file or multi file state of the torrent file.
///
/// As per the [The BitTorrent Protocol
/// Specification](https://www.bittorrent.org/beps/bep_0003.html), in a torrent files there is
/// either a key `length` or a key `files`, but not both or neither. If `length` is present then
/// the download represents a single file, otherwise there is a `files` key which represents a set
/// of files which go in a directory structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Files {
    SingleFile {
        // length of the file in bytes (integer)
        length: u64,
    },
    MultiFile {
        // a list of dictionaries, one for each file.
        files: Vec<FileEntry>,
    },
}

/// One entry of the `files` list of a multi-file torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    // length of the file in bytes (integer)
    pub(crate) length: u64,

    // a list containing one or more string elements that together represent the path and filename.
    // Each element in the list corresponds to either a directory name or (in the case of the final
    // element) the filename. For example, a the file "dir1/dir2/file.ext" would consist of three
    // string elements: "dir1", "dir2", and "file.ext".
    pub(crate) path: Vec<String>,
}

impl FileEntry {
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn path_components(&self) -> &[String] {
        &self.path
    }

    /// The relative path of the file, joined with the platform path separator.
    pub fn display_path(&self) -> String {
        self.path.join(MAIN_SEPARATOR_STR)
    }
}

impl Files {
    /// Flattens both torrent shapes into `(relative path, length)` pairs.
    ///
    /// A single-file torrent yields exactly one entry named after the torrent.
    pub fn layout(&self, name: &str) -> Vec<(String, u64)> {
        match self {
            Files::SingleFile { length } => vec![(name.to_string(), *length)],
            Files::MultiFile { files } => files
                .iter()
                .map(|f| (f.display_path(), f.length))
                .collect(),
        }
    }

    pub fn number_of_files(&self) -> usize {
        match self {
            Files::SingleFile { .. } => 1,
            Files::MultiFile { files } => files.len(),
        }
    }

    /// Sum of all file lengths. `None` if the sum does not fit in a `u64`.
    pub fn total_length(&self) -> Option<u64> {
        match self {
            Files::SingleFile { length } => Some(*length),
            Files::MultiFile { files } => files
                .iter()
                .try_fold(0u64, |acc, f| acc.checked_add(f.length)),
        }
    }
}

#[cfg(test)]
mod files_tests {
    use super::*;

    fn entry(length: u64, path: &[&str]) -> FileEntry {
        FileEntry {
            length,
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn single_file_layout_is_named_after_torrent() {
        let files = Files::SingleFile { length: 4096 };

        assert_eq!(files.layout("debian.iso"), vec![("debian.iso".to_string(), 4096)]);
        assert_eq!(files.number_of_files(), 1);
        assert_eq!(files.total_length(), Some(4096));
    }

    #[test]
    fn multi_file_paths_use_platform_separator() {
        let files = Files::MultiFile {
            files: vec![entry(10, &["dir1", "dir2", "file.ext"]), entry(5, &["top.txt"])],
        };

        let expected = format!("dir1{MAIN_SEPARATOR_STR}dir2{MAIN_SEPARATOR_STR}file.ext");
        let layout = files.layout("ignored");
        assert_eq!(layout[0], (expected, 10));
        assert_eq!(layout[1], ("top.txt".to_string(), 5));
        assert_eq!(files.total_length(), Some(15));
    }

    #[test]
    fn total_length_overflow() {
        let files = Files::MultiFile {
            files: vec![entry(u64::MAX, &["a"]), entry(1, &["b"])],
        };
        assert_eq!(files.total_length(), None);
    }
}
