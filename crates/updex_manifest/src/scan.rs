//! Fingerprinting of a release output directory.

use std::path::{Component, Path};

use updex_digest::compute_file_md5_hex;
use walkdir::WalkDir;

use crate::{FileEntry, Release, ScanError};

/// Recursively enumerates every regular file below `root` and computes its
/// digest.
///
/// The returned entries are sorted by their relative path, which always uses
/// `/` as separator regardless of the platform. Symbolic links are not
/// followed.
pub fn scan_release(root: &Path) -> Result<Vec<FileEntry>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    tracing::info!("creating release from '{}'", root.display());

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = relative_slash_path(root, entry.path())?;
        let digest = compute_file_md5_hex(entry.path())
            .map_err(|err| ScanError::Hash(entry.path().to_path_buf(), err))?;

        let file = FileEntry::new(relative_path, digest);
        tracing::debug!("{}", file);
        entries.push(file);
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    tracing::info!("fingerprinted {} file(s)", entries.len());
    Ok(entries)
}

/// Scans `root` and wraps the result in a [`Release`].
pub fn release_from_directory(
    root: &Path,
    version: impl Into<String>,
    name: impl Into<String>,
    is_latest: bool,
) -> Result<Release, ScanError> {
    let files = scan_release(root)?;
    Ok(Release::new(version, name, is_latest, files))
}

/// Returns `path` relative to `root` with `/` separators.
fn relative_slash_path(root: &Path, path: &Path) -> Result<String, ScanError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ScanError::OutsideRoot(path.to_path_buf()))?;

    let mut components = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => components.push(
                part.to_str()
                    .ok_or_else(|| ScanError::NonUtf8Path(path.to_path_buf()))?,
            ),
            Component::CurDir => {}
            _ => return Err(ScanError::OutsideRoot(path.to_path_buf())),
        }
    }
    Ok(components.join("/"))
}
