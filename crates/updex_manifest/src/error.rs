use std::path::PathBuf;

use thiserror::Error;

/// An error that occurs while scanning a release output directory.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The release root does not exist or is not a directory.
    #[error("the release directory '{0}' does not exist or is not a directory")]
    NotADirectory(PathBuf),

    /// A path in the release tree is not valid UTF-8 and cannot be written to
    /// a manifest.
    #[error("the path '{0}' is not valid UTF-8")]
    NonUtf8Path(PathBuf),

    /// A path yielded by the directory walk is not below the release root.
    #[error("the path '{0}' is not inside the release directory")]
    OutsideRoot(PathBuf),

    /// Walking the directory tree failed.
    #[error("failed to walk the release directory")]
    Walk(#[from] walkdir::Error),

    /// A file could not be hashed.
    #[error("failed to compute the digest of '{0}'")]
    Hash(PathBuf, #[source] std::io::Error),
}

/// An error that occurs while parsing a manifest document.
#[derive(Debug, Error)]
pub enum ParseManifestError {
    /// The document is not well-formed XML.
    #[error("invalid xml")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be parsed.
    #[error("invalid attribute")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// The document does not contain a `releases` root element.
    #[error("missing 'releases' root element")]
    MissingRoot,

    /// The root element of the document is not `releases`.
    #[error("unexpected root element '{0}', expected 'releases'")]
    UnexpectedRoot(String),

    /// An element appeared somewhere it is not allowed.
    #[error("unexpected element '{0}'")]
    UnexpectedElement(String),

    /// A required attribute is missing.
    #[error("element '{element}' is missing the required attribute '{attribute}'")]
    MissingAttribute {
        /// The element that misses the attribute.
        element: &'static str,
        /// The name of the attribute.
        attribute: &'static str,
    },

    /// The `action` attribute of a file has an unknown value.
    #[error("unknown file action '{0}'")]
    UnknownAction(String),

    /// The document ended before all elements were closed.
    #[error("unexpected end of document")]
    UnexpectedEof,
}

/// An error that occurs while reading a manifest from disk.
#[derive(Debug, Error)]
pub enum ReadManifestError {
    /// The manifest exists but could not be read.
    #[error("failed to read manifest '{0}'")]
    Io(PathBuf, #[source] std::io::Error),
}

/// An error that occurs while writing a manifest.
#[derive(Debug, Error)]
pub enum WriteManifestError {
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The manifest could not be moved into place.
    #[error("failed to persist manifest to '{0}'")]
    Persist(PathBuf, #[source] std::io::Error),
}
