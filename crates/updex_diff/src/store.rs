//! Placing the files of a release into the blob store.

use std::{
    fmt::{Display, Formatter},
    io::Write,
    path::{Path, PathBuf},
};

use fs_err as fs;
use updex_digest::{digest_to_hex, is_md5_hex, HashingReader, Md5};
use updex_manifest::{is_safe_relative_path, shard_key, store_url_for, FileEntry, Release};

use crate::{DiffStoreError, DIFF_DIR, TEMP_DIR_NAME};

/// What happened to a single file when it was materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterializeOutcome {
    /// The file was copied into the store.
    Copied,

    /// An object with the same name was already present.
    AlreadyPresent,

    /// The source file does not exist.
    MissingSource,

    /// The source file no longer matches the digest recorded when it was
    /// scanned.
    DigestMismatch,

    /// The entry has a path or digest that cannot be placed in the store.
    Invalid,
}

impl MaterializeOutcome {
    /// Returns true if the file was not placed in the store.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            MaterializeOutcome::MissingSource
                | MaterializeOutcome::DigestMismatch
                | MaterializeOutcome::Invalid
        )
    }
}

impl Display for MaterializeOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MaterializeOutcome::Copied => "copied",
            MaterializeOutcome::AlreadyPresent => "already present",
            MaterializeOutcome::MissingSource => "source file missing",
            MaterializeOutcome::DigestMismatch => "digest mismatch",
            MaterializeOutcome::Invalid => "invalid entry",
        })
    }
}

/// Statistics of a [`DiffStore::materialize`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Number of files copied into the store
    pub copied: usize,
    /// Number of files that were already present
    pub already_present: usize,
    /// Number of files skipped because the source was missing
    pub missing_source: usize,
    /// Number of files skipped because their content changed
    pub digest_mismatch: usize,
    /// Number of files skipped because the entry was not valid
    pub invalid: usize,
    /// The relative paths of the skipped files and the reason
    pub skipped: Vec<(String, MaterializeOutcome)>,
}

impl MaterializeStats {
    fn record(&mut self, entry: &FileEntry, outcome: MaterializeOutcome) {
        match outcome {
            MaterializeOutcome::Copied => self.copied += 1,
            MaterializeOutcome::AlreadyPresent => self.already_present += 1,
            MaterializeOutcome::MissingSource => self.missing_source += 1,
            MaterializeOutcome::DigestMismatch => self.digest_mismatch += 1,
            MaterializeOutcome::Invalid => self.invalid += 1,
        }
        if outcome.is_skipped() {
            self.skipped.push((entry.relative_path.clone(), outcome));
        }
    }

    /// The number of files that were not placed in the store.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// A trait that can be implemented to report progress of
/// [`DiffStore::materialize`].
pub trait MaterializeReporter: Send + Sync {
    /// Called before the first file is processed with the number of files
    /// that have content.
    fn on_start(&self, total: usize);
    /// Called after a file has been processed
    fn on_entry_complete(&self, entry: &FileEntry, outcome: MaterializeOutcome);
    /// Called when all files have been processed
    fn on_complete(&self, stats: &MaterializeStats);
}

/// The content-addressed blob store that update clients download files from.
///
/// Objects are stored as `<shard>/<relative path>_<digest>` where the shard
/// is the last two characters of the digest.
#[derive(Debug, Clone)]
pub struct DiffStore {
    root: PathBuf,
}

impl DiffStore {
    /// Constructs a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Constructs the store shared by all targets of a deploy directory.
    pub fn for_deploy_dir(deploy_dir: &Path) -> Self {
        Self::new(deploy_dir.join(DIFF_DIR))
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the location of the object for `entry`, or `None` if the entry
    /// has no content.
    pub fn object_path(&self, entry: &FileEntry) -> Option<PathBuf> {
        if !entry.has_content() {
            return None;
        }
        let shard = shard_key(&entry.digest)?;
        Some(self.root.join(shard).join(entry.stored_name()))
    }

    /// Returns true if the object for `entry` exists.
    pub fn contains(&self, entry: &FileEntry) -> bool {
        self.object_path(entry).is_some_and(|path| path.exists())
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR_NAME)
    }

    /// Removes the temporary directory if no temporary files are left in it.
    fn remove_empty_temp_dir(&self) {
        let temp_dir = self.temp_dir();
        match fs::remove_dir(&temp_dir) {
            Ok(()) => tracing::debug!("removed '{}'", temp_dir.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::debug!("kept '{}': {}", temp_dir.display(), err),
        }
    }

    /// Places every file with content of `release` into the store, reading
    /// the files from `source_root`.
    ///
    /// Files whose object already exists are not copied again. A file that
    /// is missing from `source_root`, or whose content no longer matches its
    /// digest, is skipped with a warning and reported in the returned
    /// statistics. Only failures of the store itself are errors.
    ///
    /// Returns a copy of `release` in which every file with content points to
    /// its expected location in the store, including skipped files.
    pub fn materialize(
        &self,
        source_root: &Path,
        release: &Release,
        reporter: Option<&dyn MaterializeReporter>,
    ) -> Result<(Release, MaterializeStats), DiffStoreError> {
        let total = release.files().iter().filter(|f| f.has_content()).count();
        tracing::info!(
            "materializing {} file(s) of release '{}' into '{}'",
            total,
            release.version,
            self.root.display()
        );
        if let Some(reporter) = reporter {
            reporter.on_start(total);
        }

        let mut stats = MaterializeStats::default();
        let mut files = Vec::with_capacity(release.files().len());
        for entry in release.files() {
            if !entry.has_content() {
                files.push(entry.clone());
                continue;
            }

            let outcome = self.materialize_entry(source_root, entry)?;
            let mut entry = entry.clone();
            if let Some(url) = store_url_for(&entry.relative_path, &entry.digest) {
                entry.store_url = Some(url);
            }

            stats.record(&entry, outcome);
            if let Some(reporter) = reporter {
                reporter.on_entry_complete(&entry, outcome);
            }
            files.push(entry);
        }
        self.remove_empty_temp_dir();

        if stats.skipped_count() > 0 {
            tracing::warn!(
                "{} file(s) of release '{}' could not be placed in the store",
                stats.skipped_count(),
                release.version
            );
        }
        tracing::info!(
            "copied {} file(s), {} already present",
            stats.copied,
            stats.already_present
        );
        if let Some(reporter) = reporter {
            reporter.on_complete(&stats);
        }

        Ok((release.with_files(files), stats))
    }

    fn materialize_entry(
        &self,
        source_root: &Path,
        entry: &FileEntry,
    ) -> Result<MaterializeOutcome, DiffStoreError> {
        if !is_safe_relative_path(&entry.relative_path) || !is_md5_hex(&entry.digest) {
            tracing::warn!("'{}' cannot be placed in the store, skipping", entry);
            return Ok(MaterializeOutcome::Invalid);
        }
        let Some(object_path) = self.object_path(entry) else {
            return Ok(MaterializeOutcome::Invalid);
        };

        if object_path.exists() {
            tracing::debug!("'{}' is already present", entry);
            return Ok(MaterializeOutcome::AlreadyPresent);
        }

        let source_path = source_root.join(&entry.relative_path);
        let source = match fs::File::open(&source_path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("file '{}' does not exist, skipping", source_path.display());
                return Ok(MaterializeOutcome::MissingSource);
            }
            Err(err) => return Err(DiffStoreError::ReadSource(source_path, err)),
        };

        // Copy into a temporary file while hashing, the object only becomes
        // visible once the copied bytes are known to match the digest.
        let temp_dir = self.temp_dir();
        fs::create_dir_all(&temp_dir)
            .map_err(|err| DiffStoreError::CreateDir(temp_dir.clone(), err))?;
        let mut temp = tempfile::Builder::new()
            .tempfile_in(&temp_dir)
            .map_err(|err| DiffStoreError::CreateDir(temp_dir.clone(), err))?;

        let mut reader = HashingReader::<_, Md5>::new(source);
        std::io::copy(&mut reader, &mut temp)
            .and_then(|_| temp.flush())
            .map_err(|err| DiffStoreError::Copy(source_path.clone(), err))?;
        let (_, hash) = reader.finalize();

        let actual = digest_to_hex::<Md5>(&hash);
        if actual != entry.digest {
            tracing::warn!(
                "hash of '{}' is different (expected {}, found {}), skipping",
                source_path.display(),
                entry.digest,
                actual
            );
            return Ok(MaterializeOutcome::DigestMismatch);
        }

        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| DiffStoreError::CreateDir(parent.to_path_buf(), err))?;
        }

        match temp.persist_noclobber(&object_path) {
            Ok(_) => {
                tracing::debug!("stored '{}'", object_path.display());
                Ok(MaterializeOutcome::Copied)
            }
            Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(MaterializeOutcome::AlreadyPresent)
            }
            Err(err) => Err(DiffStoreError::Persist(object_path, err.error)),
        }
    }
}
