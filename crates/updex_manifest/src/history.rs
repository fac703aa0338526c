use std::collections::HashSet;

use crate::Release;

/// The ordered list of releases of one target.
///
/// A history is a value: [`History::merge`] returns a new history and leaves
/// the original untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    releases: Vec<Release>,
}

impl History {
    /// Constructs a history from releases in the given order. No invariants
    /// are enforced; this mirrors what was persisted.
    pub fn from_releases(releases: impl IntoIterator<Item = Release>) -> Self {
        Self {
            releases: releases.into_iter().collect(),
        }
    }

    /// The releases in list order.
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// Iterates over the releases in list order.
    pub fn iter(&self) -> std::slice::Iter<'_, Release> {
        self.releases.iter()
    }

    /// The number of releases.
    pub fn len(&self) -> usize {
        self.releases.len()
    }

    /// Returns true if there are no releases.
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Returns the release with the given version.
    pub fn get(&self, version: &str) -> Option<&Release> {
        self.releases
            .iter()
            .find(|release| release.version == version)
    }

    /// Returns the release marked as latest. If the persisted history marks
    /// more than one release, the last one wins.
    pub fn latest(&self) -> Option<&Release> {
        self.releases.iter().rev().find(|release| release.is_latest)
    }

    /// Returns the union of the digests referenced by every file with content
    /// in every release.
    pub fn live_digests(&self) -> HashSet<&str> {
        self.releases
            .iter()
            .flat_map(Release::live_digests)
            .collect()
    }

    /// Merges a new release into the history and returns the result.
    ///
    /// - A release with the same version is replaced.
    /// - If `release` is latest, every other release loses the flag.
    /// - If `release` is not latest but no remaining release is, `release`
    ///   becomes the latest one.
    /// - If the remaining releases carry more than one latest flag, only the
    ///   last of them keeps it.
    ///
    /// The new release is always appended at the end. After a merge exactly
    /// one release is latest.
    pub fn merge(&self, release: Release) -> History {
        let mut releases: Vec<Release> = self
            .releases
            .iter()
            .filter(|existing| existing.version != release.version)
            .cloned()
            .collect();

        if releases.len() != self.releases.len() {
            tracing::warn!(
                "a release with version '{}' already exists, it will be replaced",
                release.version
            );
        }

        let release = if release.is_latest {
            for existing in &mut releases {
                existing.is_latest = false;
            }
            release
        } else {
            match releases.iter().rposition(|existing| existing.is_latest) {
                None => {
                    if !releases.is_empty() {
                        tracing::warn!(
                            "no remaining release is marked as latest, marking '{}' as latest",
                            release.version
                        );
                    }
                    release.with_latest(true)
                }
                Some(keep) => {
                    for (idx, existing) in releases.iter_mut().enumerate() {
                        if idx != keep && existing.is_latest {
                            tracing::warn!(
                                "release '{}' was also marked as latest, clearing the flag",
                                existing.version
                            );
                            existing.is_latest = false;
                        }
                    }
                    release
                }
            }
        };

        releases.push(release);
        History { releases }
    }

    /// Returns a copy of the history in which the release with the same
    /// version as `release` is swapped for `release`, keeping its position.
    /// The latest flag of `release` is taken from the release it replaces.
    ///
    /// If no release has that version this is the same as [`History::merge`].
    pub fn with_release(&self, release: Release) -> History {
        let Some(idx) = self
            .releases
            .iter()
            .position(|existing| existing.version == release.version)
        else {
            return self.merge(release);
        };

        let mut releases = self.releases.clone();
        let is_latest = releases[idx].is_latest;
        releases[idx] = release.with_latest(is_latest);
        History { releases }
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Release;
    type IntoIter = std::slice::Iter<'a, Release>;

    fn into_iter(self) -> Self::IntoIter {
        self.releases.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileEntry;

    fn release(version: &str, is_latest: bool) -> Release {
        Release::new(version, format!("release {version}"), is_latest, [])
    }

    fn latest_versions(history: &History) -> Vec<&str> {
        history
            .iter()
            .filter(|r| r.is_latest)
            .map(|r| r.version.as_str())
            .collect()
    }

    #[test]
    fn test_merge_into_empty() {
        let history = History::default().merge(Release::new(
            "1",
            "v1",
            true,
            [FileEntry::new("b", "h2"), FileEntry::new("a", "h1")],
        ));
        assert_eq!(history.len(), 1);
        let v1 = history.get("1").unwrap();
        assert!(v1.is_latest);
        let paths: Vec<_> = v1
            .files()
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(paths, ["a", "b"]);
    }

    #[test]
    fn test_first_release_is_forced_latest() {
        let history = History::default().merge(release("1", false));
        assert_eq!(latest_versions(&history), ["1"]);
    }

    #[test]
    fn test_new_latest_clears_others() {
        let history = History::default()
            .merge(release("1", true))
            .merge(release("2", true));
        assert_eq!(latest_versions(&history), ["2"]);
        assert_eq!(history.latest().unwrap().version, "2");
    }

    #[test]
    fn test_non_latest_keeps_existing_latest() {
        let history = History::default()
            .merge(release("1", true))
            .merge(release("2", false));
        assert_eq!(latest_versions(&history), ["1"]);
        let versions: Vec<_> = history.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["1", "2"]);
    }

    #[test]
    fn test_merge_is_append_order_not_version_order() {
        let history = History::default()
            .merge(release("2.0", true))
            .merge(release("10.0", true))
            .merge(release("1.5", true));
        let versions: Vec<_> = history.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["2.0", "10.0", "1.5"]);
    }

    #[test]
    fn test_replace_existing_version() {
        let history = History::default()
            .merge(release("1", true))
            .merge(release("2", true));
        let replaced = history.merge(Release::new("1", "again", true, [FileEntry::new("x", "h9")]));

        let versions: Vec<_> = replaced.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["2", "1"]);
        assert_eq!(replaced.get("1").unwrap().name, "again");
        assert_eq!(latest_versions(&replaced), ["1"]);

        // The input is left untouched.
        assert_eq!(latest_versions(&history), ["2"]);
        assert_eq!(history.get("1").unwrap().name, "release 1");
    }

    #[test]
    fn test_replacing_the_latest_with_non_latest_keeps_one_latest() {
        let history = History::default()
            .merge(release("1", true))
            .merge(release("2", true))
            .merge(release("2", false));
        assert_eq!(latest_versions(&history), ["2"]);
    }

    #[test]
    fn test_merge_repairs_multiple_latest() {
        let history = History::from_releases([release("1", true), release("2", true)]);
        let merged = history.merge(release("3", false));
        assert_eq!(latest_versions(&merged), ["2"]);
    }

    #[test]
    fn test_merge_sequences_keep_exactly_one_latest() {
        let steps = [
            ("1", false),
            ("2", true),
            ("3", false),
            ("2", false),
            ("4", true),
            ("4", false),
            ("1", true),
            ("5", false),
        ];

        let mut history = History::default();
        for (version, is_latest) in steps {
            history = history.merge(release(version, is_latest));
            assert_eq!(
                latest_versions(&history).len(),
                1,
                "after merging {version}"
            );
        }
    }

    #[test]
    fn test_with_release_keeps_position_and_flag() {
        let history = History::default()
            .merge(release("1", true))
            .merge(release("2", true))
            .merge(release("3", false));
        let updated = history.with_release(Release::new(
            "2",
            "updated",
            false,
            [FileEntry::new("a", "h1")],
        ));

        let versions: Vec<_> = updated.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["1", "2", "3"]);
        let v2 = updated.get("2").unwrap();
        assert!(v2.is_latest);
        assert_eq!(v2.name, "updated");
        assert_eq!(v2.files().len(), 1);

        let appended = history.with_release(release("4", false));
        assert_eq!(appended.len(), 4);
        assert_eq!(latest_versions(&appended), ["2"]);
    }

    #[test]
    fn test_live_digests() {
        let history = History::default()
            .merge(Release::new(
                "1",
                "v1",
                true,
                [FileEntry::new("a", "h1"), FileEntry::new("b", "h2")],
            ))
            .merge(Release::new(
                "2",
                "v2",
                true,
                [FileEntry::new("a", "h1"), FileEntry::delete_marker("b")],
            ));
        let mut digests: Vec<_> = history.live_digests().into_iter().collect();
        digests.sort_unstable();
        assert_eq!(digests, ["h1", "h2"]);
    }
}
