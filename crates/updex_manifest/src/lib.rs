#![deny(missing_docs)]

//! Release manifests of an auto-update channel.
//!
//! A target (a platform such as `win-x64`) has a [`History`] of [`Release`]s
//! persisted as `<target>_manifest.xml`. Each release lists the
//! [`FileEntry`]s of a build output directory with their content digest and
//! the location of the file in the blob store.
//!
//! - [`scan_release`] fingerprints a release output directory.
//! - [`History::from_path`] and [`History::write_to_path`] load and persist a
//!   history.
//! - [`History::merge`] adds a release while keeping exactly one release
//!   marked as latest.

mod entry;
mod error;
mod history;
mod release;
mod scan;
mod xml;

pub use entry::{
    is_safe_relative_path, shard_key, store_url_for, stored_name_for, FileAction, FileEntry,
    SHARD_KEY_LEN,
};
pub use error::{ParseManifestError, ReadManifestError, ScanError, WriteManifestError};
pub use history::History;
pub use release::Release;
pub use scan::{release_from_directory, scan_release};
pub use xml::{manifest_file_name, MANIFEST_SUFFIX};
