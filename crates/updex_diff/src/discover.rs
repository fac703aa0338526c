use std::{path::Path, str::FromStr};

use fs_err as fs;
use updex_manifest::{History, MANIFEST_SUFFIX};

use crate::GcError;

/// Loads the history of every target in a deploy directory, sorted by target
/// name.
///
/// Every `<target>_manifest.xml` file directly inside `deploy_dir` is a
/// target. Unlike [`History::from_path`] a manifest that cannot be parsed is
/// an error: collecting garbage against an empty stand-in would delete the
/// objects that manifest references.
pub fn discover_histories(deploy_dir: &Path) -> Result<Vec<(String, History)>, GcError> {
    let entries = fs::read_dir(deploy_dir)
        .map_err(|err| GcError::ReadDeployDir(deploy_dir.to_path_buf(), err))?;

    let mut manifests = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| GcError::ReadDeployDir(deploy_dir.to_path_buf(), err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(target) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(MANIFEST_SUFFIX))
        else {
            continue;
        };
        if target.is_empty() {
            continue;
        }
        manifests.push((target.to_string(), path));
    }
    manifests.sort();

    let mut histories = Vec::with_capacity(manifests.len());
    for (target, path) in manifests {
        let text =
            fs::read_to_string(&path).map_err(|err| GcError::ReadManifest(path.clone(), err))?;
        let history =
            History::from_str(&text).map_err(|err| GcError::InvalidManifest(path.clone(), err))?;
        tracing::info!("target '{}' lists {} release(s)", target, history.len());
        histories.push((target, history));
    }

    Ok(histories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use updex_manifest::{manifest_file_name, FileEntry, Release};

    #[test]
    fn test_discover_histories() {
        let deploy = tempfile::tempdir().unwrap();
        for target in ["win-x64", "linux-x64"] {
            History::default()
                .merge(Release::new("1", target, true, [FileEntry::new("a", "h1")]))
                .write_to_path(&deploy.path().join(manifest_file_name(target)))
                .unwrap();
        }
        fs::write(deploy.path().join("notes.xml"), "<releases/>").unwrap();
        fs::create_dir_all(deploy.path().join("diff")).unwrap();

        let histories = discover_histories(deploy.path()).unwrap();
        let targets: Vec<_> = histories.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(targets, ["linux-x64", "win-x64"]);
        assert!(histories.iter().all(|(_, h)| h.len() == 1));
    }

    #[test]
    fn test_corrupt_manifest_is_an_error() {
        let deploy = tempfile::tempdir().unwrap();
        fs::write(deploy.path().join("osx_manifest.xml"), "<releases>").unwrap();
        assert_matches!(
            discover_histories(deploy.path()),
            Err(GcError::InvalidManifest(_, _))
        );
    }
}
