use std::path::PathBuf;

use thiserror::Error;
use updex_manifest::ParseManifestError;

/// An error that occurs while placing files into the store.
#[derive(Debug, Error)]
pub enum DiffStoreError {
    /// The source file exists but could not be opened.
    #[error("failed to read '{0}'")]
    ReadSource(PathBuf, #[source] std::io::Error),

    /// A directory in the store could not be created.
    #[error("failed to create directory '{0}'")]
    CreateDir(PathBuf, #[source] std::io::Error),

    /// Copying the file into the store failed.
    #[error("failed to copy '{0}' into the store")]
    Copy(PathBuf, #[source] std::io::Error),

    /// The copied file could not be moved to its final location.
    #[error("failed to move the object to '{0}'")]
    Persist(PathBuf, #[source] std::io::Error),
}

/// An error that occurs while collecting garbage.
#[derive(Debug, Error)]
pub enum GcError {
    /// The store root could not be listed.
    #[error("failed to read the store at '{0}'")]
    ReadStore(PathBuf, #[source] std::io::Error),

    /// The deploy directory could not be listed.
    #[error("failed to list the deploy directory '{0}'")]
    ReadDeployDir(PathBuf, #[source] std::io::Error),

    /// A manifest could not be read.
    #[error("failed to read manifest '{0}'")]
    ReadManifest(PathBuf, #[source] std::io::Error),

    /// A manifest could not be parsed. Collecting garbage without it would
    /// delete objects it still references.
    #[error("manifest '{0}' could not be parsed, refusing to collect garbage")]
    InvalidManifest(PathBuf, #[source] ParseManifestError),
}
