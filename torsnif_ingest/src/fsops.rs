//! Discovery of candidate files and the archive / discard side effects.

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

use tokio::fs::{self, OpenOptions};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{IngestError, IngestResult};

const TORRENT_EXTENSION: &str = "torrent";

/// Upper bound on `name.N.ext` candidates tried when archiving.
const MAX_ARCHIVE_SUFFIX: u32 = 10_000;

pub fn is_torrent(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TORRENT_EXTENSION))
}

/// Recursively lists every `.torrent` regular file under `root`, sorted by path.
///
/// Anything below `exclude` (the archive directory, when it sits inside `root`) is skipped.
/// Entries that cannot be read are logged and skipped.
pub fn discover(root: &Path, exclude: Option<&Path>) -> IngestResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(IngestError::setup(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| exclude.map_or(true, |excluded| entry.path() != excluded));

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_torrent(entry.path()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "skipping unreadable directory entry"),
        }
    }

    files.sort();
    Ok(files)
}

/// Moves `path` into `done_dir`, keeping its file name.
///
/// The destination is claimed atomically, so an existing file is never overwritten: if
/// `name.ext` is taken, `name.1.ext`, `name.2.ext`, ... are tried in order. Returns the final
/// destination.
pub async fn archive(path: &Path, done_dir: &Path) -> IngestResult<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        IngestError::io(
            "archive",
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;

    for attempt in 0..=MAX_ARCHIVE_SUFFIX {
        let destination = done_dir.join(candidate_name(file_name, attempt));

        match claim(path, &destination).await {
            Ok(()) => {
                fs::remove_file(path)
                    .await
                    .map_err(|e| IngestError::io("archive.remove_source", path, e))?;
                debug!(from = %path.display(), to = %destination.display(), "archived");
                return Ok(destination);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(IngestError::io("archive", &destination, e)),
        }
    }

    Err(IngestError::io(
        "archive",
        done_dir,
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "every archive file name candidate is taken",
        ),
    ))
}

/// Deletes a file that is already represented in the catalog.
pub async fn discard(path: &Path) -> IngestResult<()> {
    fs::remove_file(path)
        .await
        .map_err(|e| IngestError::io("discard", path, e))?;
    debug!(path = %path.display(), "discarded");
    Ok(())
}

/// `name.ext` for attempt 0, `name.N.ext` afterwards.
fn candidate_name(file_name: &OsStr, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return PathBuf::from(file_name);
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().unwrap_or(file_name).to_string_lossy();
    match name.extension() {
        Some(ext) => PathBuf::from(format!("{stem}.{attempt}.{}", ext.to_string_lossy())),
        None => PathBuf::from(format!("{stem}.{attempt}")),
    }
}

/// Creates `destination` as a copy of `source` without ever replacing an existing file.
///
/// A hard link is tried first. Across devices the bytes are copied into a file opened with
/// `create_new`.
async fn claim(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::hard_link(source, destination).await {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
        Err(e) => debug!(error = %e, "hard link failed, copying instead"),
    }

    let mut target = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await?;
    let mut reader = fs::File::open(source).await?;

    if let Err(e) = tokio::io::copy(&mut reader, &mut target).await {
        drop(target);
        let _ = fs::remove_file(destination).await;
        return Err(e);
    }
    target.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn candidate_names() {
        let name = OsString::from("ubuntu.iso.torrent");
        assert_eq!(candidate_name(&name, 0), PathBuf::from("ubuntu.iso.torrent"));
        assert_eq!(candidate_name(&name, 2), PathBuf::from("ubuntu.iso.2.torrent"));
        assert_eq!(
            candidate_name(&OsString::from("noext"), 1),
            PathBuf::from("noext.1")
        );
    }

    #[test]
    fn torrent_extension_is_case_insensitive() {
        assert!(is_torrent(Path::new("a/b.torrent")));
        assert!(is_torrent(Path::new("B.TORRENT")));
        assert!(!is_torrent(Path::new("b.torrent.json")));
        assert!(!is_torrent(Path::new("torrent")));
    }

    #[test]
    fn discover_walks_recursively_and_skips_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::create_dir_all(root.join("done")).unwrap();
        for path in [
            "a.torrent",
            "nested/b.torrent",
            "nested/deeper/c.TORRENT",
            "nested/readme.txt",
            "done/old.torrent",
        ] {
            std::fs::write(root.join(path), b"x").unwrap();
        }

        let done = root.join("done");
        let found = discover(root, Some(&done)).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("a.torrent"),
                root.join("nested/b.torrent"),
                root.join("nested/deeper/c.TORRENT"),
            ]
        );

        assert!(matches!(
            discover(&root.join("missing"), None),
            Err(IngestError::Setup { .. })
        ));
    }

    #[tokio::test]
    async fn archive_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let done = dir.path().join("done");
        std::fs::create_dir_all(&done).unwrap();
        std::fs::write(done.join("x.torrent"), b"old").unwrap();

        let source = dir.path().join("x.torrent");
        std::fs::write(&source, b"new").unwrap();

        let destination = archive(&source, &done).await.unwrap();
        assert_eq!(destination, done.join("x.1.torrent"));
        assert!(!source.exists());
        assert_eq!(std::fs::read(done.join("x.torrent")).unwrap(), b"old");
        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    }

    #[tokio::test]
    async fn discard_removes_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.torrent");
        std::fs::write(&path, b"x").unwrap();

        discard(&path).await.unwrap();
        assert!(!path.exists());
        assert!(matches!(
            discard(&path).await,
            Err(IngestError::Filesystem { operation: "discard", .. })
        ));
    }
}
