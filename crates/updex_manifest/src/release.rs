use std::collections::HashSet;

use crate::FileEntry;

/// A single published version of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// The version string. Unique within a [`crate::History`].
    pub version: String,

    /// A display label.
    pub name: String,

    /// Whether this is the release clients update to by default.
    pub is_latest: bool,

    files: Vec<FileEntry>,
}

impl Release {
    /// Constructs a new release. The files are sorted by their relative path;
    /// if a path occurs more than once only the first entry is kept.
    pub fn new(
        version: impl Into<String>,
        name: impl Into<String>,
        is_latest: bool,
        files: impl IntoIterator<Item = FileEntry>,
    ) -> Self {
        let version = version.into();
        let mut files: Vec<FileEntry> = files.into_iter().collect();
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let len = files.len();
        files.dedup_by(|b, a| a.relative_path == b.relative_path);
        if files.len() != len {
            tracing::warn!(
                "release '{}' listed {} duplicate path(s), only the first occurrence is kept",
                version,
                len - files.len()
            );
        }
        Self {
            version,
            name: name.into(),
            is_latest,
            files,
        }
    }

    /// The files of the release, sorted by relative path.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Consumes the release and returns its files.
    pub fn into_files(self) -> Vec<FileEntry> {
        self.files
    }

    /// Returns a copy of this release with a different set of files.
    pub fn with_files(&self, files: impl IntoIterator<Item = FileEntry>) -> Self {
        Self::new(
            self.version.clone(),
            self.name.clone(),
            self.is_latest,
            files,
        )
    }

    /// Returns a copy of this release with a different latest flag.
    pub fn with_latest(mut self, is_latest: bool) -> Self {
        self.is_latest = is_latest;
        self
    }

    /// Iterates over the digests of every file that has content.
    pub fn live_digests(&self) -> impl Iterator<Item = &str> + '_ {
        self.files
            .iter()
            .filter(|file| file.has_content())
            .map(|file| file.digest.as_str())
    }

    /// Returns the entry for a path.
    pub fn file(&self, relative_path: &str) -> Option<&FileEntry> {
        self.files
            .binary_search_by(|file| file.relative_path.as_str().cmp(relative_path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    /// Adds a delete marker for every file with content in `previous` whose
    /// path no longer occurs in this release.
    pub fn with_delete_markers(self, previous: &Release) -> Self {
        let present: HashSet<&str> = self
            .files
            .iter()
            .map(|file| file.relative_path.as_str())
            .collect();
        let markers: Vec<FileEntry> = previous
            .files
            .iter()
            .filter(|file| file.has_content() && !present.contains(file.relative_path.as_str()))
            .map(|file| FileEntry::delete_marker(file.relative_path.clone()))
            .collect();

        if markers.is_empty() {
            return self;
        }

        tracing::info!(
            "marking {} file(s) of release '{}' as deleted",
            markers.len(),
            previous.version
        );
        let Release {
            version,
            name,
            is_latest,
            files,
        } = self;
        Release::new(version, name, is_latest, files.into_iter().chain(markers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_are_sorted_and_unique() {
        let release = Release::new(
            "1.0",
            "first",
            true,
            [
                FileEntry::new("b", "h2"),
                FileEntry::new("a", "h1"),
                FileEntry::new("b", "h3"),
            ],
        );
        let paths: Vec<_> = release
            .files()
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(paths, ["a", "b"]);
        assert_eq!(release.file("b").unwrap().digest, "h2");
        assert!(release.file("c").is_none());
    }

    #[test]
    fn test_delete_markers() {
        let previous = Release::new(
            "1.0",
            "first",
            true,
            [
                FileEntry::new("a", "h1"),
                FileEntry::new("b", "h2"),
                FileEntry::delete_marker("z"),
            ],
        );
        let next = Release::new(
            "2.0",
            "second",
            true,
            [FileEntry::new("a", "h1"), FileEntry::new("c", "h3")],
        )
        .with_delete_markers(&previous);

        let files: Vec<_> = next.files().iter().map(ToString::to_string).collect();
        assert_eq!(files, ["a - h1", "b - [deleted]", "c - h3"]);
        assert_eq!(next.live_digests().collect::<Vec<_>>(), ["h1", "h3"]);
    }
}
