//! Removal of store objects that are no longer referenced by any manifest.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs_err as fs;
use updex_digest::is_md5_hex;
use updex_manifest::{shard_key, History, Release};
use walkdir::WalkDir;

use crate::{GcError, TEMP_DIR_NAME};

/// Options for [`collect`].
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Report what would be removed without deleting anything.
    pub dry_run: bool,
}

/// Statistics about a garbage collection pass.
#[derive(Debug, Clone, Default)]
pub struct CollectStats {
    /// Number of objects found in the store
    pub objects_scanned: usize,
    /// Number of objects that are still referenced
    pub objects_kept: usize,
    /// Number of objects removed (or that would be removed in a dry run)
    pub objects_removed: usize,
    /// Total size of the removed objects in bytes
    pub bytes_freed: u64,
    /// Number of empty directories removed
    pub directories_removed: usize,
    /// Files in the store that do not look like objects and were left alone
    pub unrecognized: Vec<PathBuf>,
    /// Paths of the removed objects
    pub removed_objects: Vec<PathBuf>,
    /// Objects that failed to be removed
    pub failed_removals: Vec<(PathBuf, String)>,
    /// Time taken by the pass
    pub duration: Duration,
}

impl CollectStats {
    /// The number of objects that were reclaimed.
    pub fn reclaimed_count(&self) -> usize {
        self.objects_removed
    }
}

/// An object found in the store.
#[derive(Debug)]
struct StoredObject {
    path: PathBuf,
    digest: String,
    size: u64,
}

/// Returns the digest of an object from its location in the store.
///
/// An object lives at `<shard>/<relative path>_<digest>`, so the digest is
/// whatever follows the last `_` of the file name. It must be a valid digest
/// whose shard matches the first path component.
fn object_digest(store_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(store_root).ok()?;
    let mut components = relative.components();
    let shard = components.next()?.as_os_str().to_str()?;
    if components.next().is_none() {
        return None;
    }

    let file_name = path.file_name()?.to_str()?;
    let (_, digest) = file_name.rsplit_once('_')?;
    if !is_md5_hex(digest) || shard_key(digest) != Some(shard) {
        return None;
    }
    Some(digest.to_string())
}

/// Removes every object in the store at `store_root` whose digest is not
/// referenced by any file of any release in `histories`. Directories left
/// empty are removed as well.
///
/// Delete markers do not reference content. A release only protects its
/// objects while it is listed in a history.
///
/// Failing to remove a single object is logged and recorded in the returned
/// statistics; the pass continues. Only failing to read the store root is an
/// error.
pub fn collect<'a>(
    store_root: &Path,
    histories: impl IntoIterator<Item = &'a History>,
    options: &CollectOptions,
) -> Result<CollectStats, GcError> {
    let start = Instant::now();
    let mut stats = CollectStats::default();

    let referenced: HashSet<&str> = histories
        .into_iter()
        .flat_map(History::iter)
        .flat_map(Release::live_digests)
        .collect();

    if !store_root.is_dir() {
        tracing::info!(
            "store '{}' does not exist, nothing to collect",
            store_root.display()
        );
        stats.duration = start.elapsed();
        return Ok(stats);
    }

    tracing::info!(
        "collecting garbage in '{}' ({} referenced digest(s))",
        store_root.display(),
        referenced.len()
    );

    let objects = list_objects(store_root, &mut stats)?;
    stats.objects_scanned = objects.len();

    for object in objects {
        if referenced.contains(object.digest.as_str()) {
            stats.objects_kept += 1;
            continue;
        }

        if options.dry_run {
            tracing::info!("would remove '{}'", object.path.display());
        } else if let Err(err) = fs::remove_file(&object.path) {
            tracing::warn!("failed to remove '{}': {}", object.path.display(), err);
            stats.failed_removals.push((object.path, err.to_string()));
            continue;
        } else {
            tracing::debug!("removed '{}'", object.path.display());
        }

        stats.objects_removed += 1;
        stats.bytes_freed += object.size;
        stats.removed_objects.push(object.path);
    }

    if !options.dry_run {
        stats.directories_removed = remove_empty_directories(store_root);
    }

    stats.duration = start.elapsed();
    tracing::info!(
        "removed {} object(s) ({} bytes) and {} empty director(ies), kept {}",
        stats.objects_removed,
        stats.bytes_freed,
        stats.directories_removed,
        stats.objects_kept
    );
    if !stats.failed_removals.is_empty() {
        tracing::warn!(
            "{} object(s) could not be removed",
            stats.failed_removals.len()
        );
    }
    Ok(stats)
}

fn is_temp_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() == 1 && entry.file_name() == TEMP_DIR_NAME
}

fn list_objects(store_root: &Path, stats: &mut CollectStats) -> Result<Vec<StoredObject>, GcError> {
    let mut objects = Vec::new();
    let walker = WalkDir::new(store_root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_temp_dir(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(GcError::ReadStore(store_root.to_path_buf(), err.into()))
            }
            Err(err) => {
                tracing::warn!("failed to read store entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(digest) = object_digest(store_root, entry.path()) else {
            tracing::debug!("ignoring unrecognized file '{}'", entry.path().display());
            stats.unrecognized.push(entry.into_path());
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        objects.push(StoredObject {
            path: entry.into_path(),
            digest,
            size,
        });
    }

    Ok(objects)
}

/// Removes every empty directory below `store_root`, deepest first, and
/// returns how many were removed.
fn remove_empty_directories(store_root: &Path) -> usize {
    let mut removed = 0;
    let walker = WalkDir::new(store_root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_entry(|entry| !is_temp_dir(entry));

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = match fs::read_dir(entry.path()) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };
        if !is_empty {
            continue;
        }
        match fs::remove_dir(entry.path()) {
            Ok(()) => {
                tracing::debug!("removed empty directory '{}'", entry.path().display());
                removed += 1;
            }
            Err(err) => {
                tracing::warn!(
                    "failed to remove directory '{}': {}",
                    entry.path().display(),
                    err
                );
            }
        }
    }
    removed
}
