use std::fmt::{Display, Formatter};

/// The number of trailing digest characters used as the shard directory of
/// the blob store.
pub const SHARD_KEY_LEN: usize = 2;

/// What an update client should do with the file described by a
/// [`FileEntry`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAction {
    /// The file is part of the release and can be fetched from the blob
    /// store.
    #[default]
    None,

    /// The file existed in a previous release and must be removed on update.
    Delete,
}

impl FileAction {
    /// The value of the `action` attribute in a manifest, if any.
    pub fn as_attribute(&self) -> Option<&'static str> {
        match self {
            FileAction::None => None,
            FileAction::Delete => Some("del"),
        }
    }
}

/// A single file of a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    /// The path of the file relative to the release root, always using `/` as
    /// separator.
    pub relative_path: String,

    /// The lower-case hex digest of the file contents. Empty for delete
    /// markers.
    pub digest: String,

    /// The location of the file in the blob store, relative to the store
    /// root. `None` for delete markers.
    pub store_url: Option<String>,

    /// What to do with the file.
    pub action: FileAction,
}

impl FileEntry {
    /// Constructs an entry for a file with content. The store url is derived
    /// from the path and the digest.
    pub fn new(relative_path: impl Into<String>, digest: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let digest = digest.into();
        let store_url = store_url_for(&relative_path, &digest);
        Self {
            relative_path,
            digest,
            store_url,
            action: FileAction::None,
        }
    }

    /// Constructs a delete marker for the given path.
    pub fn delete_marker(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            digest: String::new(),
            store_url: None,
            action: FileAction::Delete,
        }
    }

    /// Returns true if this entry refers to content in the blob store.
    pub fn has_content(&self) -> bool {
        self.action == FileAction::None && !self.digest.is_empty()
    }

    /// Returns true if this entry is a delete marker.
    pub fn is_delete_marker(&self) -> bool {
        self.action == FileAction::Delete
    }

    /// The name of the object in its shard directory.
    pub fn stored_name(&self) -> String {
        stored_name_for(&self.relative_path, &self.digest)
    }
}

impl Display for FileEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.action {
            FileAction::None => write!(f, "{} - {}", self.relative_path, self.digest),
            FileAction::Delete => write!(f, "{} - [deleted]", self.relative_path),
        }
    }
}

/// Returns the shard directory for a digest: its last [`SHARD_KEY_LEN`]
/// characters. Returns `None` if the digest is too short.
pub fn shard_key(digest: &str) -> Option<&str> {
    let start = digest.len().checked_sub(SHARD_KEY_LEN)?;
    digest.get(start..)
}

/// Returns the name under which a file is stored inside its shard.
pub fn stored_name_for(relative_path: &str, digest: &str) -> String {
    format!("{relative_path}_{digest}")
}

/// Returns the location of a file in the blob store relative to the store
/// root, always using `/` as separator.
pub fn store_url_for(relative_path: &str, digest: &str) -> Option<String> {
    let shard = shard_key(digest)?;
    Some(format!("{shard}/{}", stored_name_for(relative_path, digest)))
}

/// Returns true if `relative_path` can be safely joined onto a directory:
/// it is not empty, not absolute and does not contain `..` or `.`
/// components.
pub fn is_safe_relative_path(relative_path: &str) -> bool {
    !relative_path.is_empty()
        && !relative_path.starts_with('/')
        && !relative_path.contains('\\')
        && !relative_path.contains(':')
        && relative_path
            .split('/')
            .all(|component| !component.is_empty() && component != "." && component != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_store_url() {
        let entry = FileEntry::new("data/client.dll", "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            entry.store_url.as_deref(),
            Some("72/data/client.dll_900150983cd24fb0d6963f7d28e17f72")
        );
        assert_eq!(
            entry.stored_name(),
            "data/client.dll_900150983cd24fb0d6963f7d28e17f72"
        );
        assert!(entry.has_content());
    }

    #[test]
    fn test_delete_marker_has_no_content() {
        let entry = FileEntry::delete_marker("old.dll");
        assert!(entry.is_delete_marker());
        assert!(!entry.has_content());
        assert_eq!(entry.store_url, None);
        assert_eq!(entry.to_string(), "old.dll - [deleted]");
    }

    #[rstest]
    #[case("900150983cd24fb0d6963f7d28e17f72", Some("72"))]
    #[case("ab", Some("ab"))]
    #[case("a", None)]
    #[case("", None)]
    fn test_shard_key(#[case] digest: &str, #[case] expected: Option<&str>) {
        assert_eq!(shard_key(digest), expected);
    }

    #[rstest]
    #[case("a.txt", true)]
    #[case("dir/sub/a.txt", true)]
    #[case("", false)]
    #[case("/etc/passwd", false)]
    #[case("../outside", false)]
    #[case("dir/../../outside", false)]
    #[case("dir//a", false)]
    #[case("./a", false)]
    #[case("C:/windows", false)]
    #[case("dir\\a", false)]
    fn test_is_safe_relative_path(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_safe_relative_path(path), expected);
    }
}
