//! Validated configuration passed from the command line into the publish and
//! gc workflows.

use std::path::{Path, PathBuf};

use thiserror::Error;
use updex_manifest::manifest_file_name;

/// An error in the values passed on the command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the release version must not be empty")]
    EmptyVersion,

    #[error("the target must not be empty")]
    EmptyTarget,

    #[error("the target '{0}' must not contain path separators")]
    InvalidTarget(String),
}

/// Everything `updex publish` needs to know.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// The build output directory to publish
    pub source_dir: PathBuf,
    /// The platform the build is for
    pub target: String,
    /// The version of the new release
    pub version: String,
    /// The display name of the new release
    pub name: String,
    /// Whether the new release becomes the latest one
    pub is_latest: bool,
    /// The directory holding the manifests and the diff store
    pub deploy_dir: PathBuf,
    /// Where the updated manifest is written
    pub output_path: PathBuf,
    /// Add delete markers for files that disappeared since the latest release
    pub mark_deleted: bool,
    /// Collect garbage in the diff store afterwards
    pub cleanup: bool,
    /// Fail instead of saving when a file could not be stored
    pub strict: bool,
}

impl PublishConfig {
    /// Validates the raw values. The name defaults to the version and the
    /// output path to the manifest of the target.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_dir: PathBuf,
        target: &str,
        version: &str,
        name: Option<&str>,
        is_latest: bool,
        deploy_dir: PathBuf,
        output_path: Option<PathBuf>,
        mark_deleted: bool,
        cleanup: bool,
        strict: bool,
    ) -> Result<Self, ConfigError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(ConfigError::EmptyVersion);
        }
        let target = validate_target(target)?;
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(version);
        let output_path =
            output_path.unwrap_or_else(|| deploy_dir.join(manifest_file_name(&target)));

        Ok(Self {
            source_dir,
            version: version.to_string(),
            name: name.to_string(),
            is_latest,
            output_path,
            mark_deleted,
            cleanup,
            strict,
            target,
            deploy_dir,
        })
    }

    /// The manifest of the target inside the deploy directory.
    pub fn manifest_path(&self) -> PathBuf {
        self.deploy_dir.join(manifest_file_name(&self.target))
    }
}

/// Everything `updex gc` needs to know.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// The directory holding the manifests and the diff store
    pub deploy_dir: PathBuf,
    /// Only report what would be removed
    pub dry_run: bool,
}

fn validate_target(target: &str) -> Result<String, ConfigError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ConfigError::EmptyTarget);
    }
    if target.contains(['/', '\\'])
        || matches!(target, "." | "..")
        || Path::new(target).components().count() != 1
    {
        return Err(ConfigError::InvalidTarget(target.to_string()));
    }
    Ok(target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        target: &str,
        version: &str,
        name: Option<&str>,
    ) -> Result<PublishConfig, ConfigError> {
        PublishConfig::new(
            PathBuf::from("build"),
            target,
            version,
            name,
            true,
            PathBuf::from("deploy"),
            None,
            false,
            false,
            false,
        )
    }

    #[test]
    fn test_defaults() {
        let config = config(" win-x64 ", " 1.2.3 ", None).unwrap();
        assert_eq!(config.target, "win-x64");
        assert_eq!(config.version, "1.2.3");
        assert_eq!(config.name, "1.2.3");
        assert_eq!(
            config.output_path,
            PathBuf::from("deploy").join("win-x64_manifest.xml")
        );
        assert_eq!(config.manifest_path(), config.output_path);
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            config("win", " ", None).unwrap_err(),
            ConfigError::EmptyVersion
        );
        assert_eq!(config("", "1", None).unwrap_err(), ConfigError::EmptyTarget);
        assert_eq!(
            config("../win", "1", None).unwrap_err(),
            ConfigError::InvalidTarget("../win".to_string())
        );
        assert_eq!(
            config("..", "1", Some("x")).unwrap_err(),
            ConfigError::InvalidTarget("..".to_string())
        );
        assert_eq!(config("win", "1", Some("Name")).unwrap().name, "Name");
    }
}
