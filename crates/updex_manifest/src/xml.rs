//! Reading and writing the xml manifest document of a target.
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8" standalone="yes"?>
//! <releases>
//!     <release name="…" version="…" latest="true">
//!         <files>
//!             <file filename="…" hash="…" url="…"/>
//!             <file filename="…" action="del"/>
//!         </files>
//!     </release>
//! </releases>
//! ```
//!
//! Serialization is deterministic: releases are written in list order, files
//! sorted by path and attributes in a fixed order, so writing an unchanged
//! history yields byte-identical output.

use std::{
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use fs_err as fs;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};

use crate::{
    store_url_for, FileAction, FileEntry, History, ParseManifestError, ReadManifestError, Release,
    WriteManifestError,
};

const RELEASES: &str = "releases";
const RELEASE: &str = "release";
const FILES: &str = "files";
const FILE: &str = "file";

/// The suffix of a manifest file name, `<target>_manifest.xml`.
pub const MANIFEST_SUFFIX: &str = "_manifest.xml";

/// Returns the file name of the manifest of a target.
pub fn manifest_file_name(target: &str) -> String {
    format!("{target}{MANIFEST_SUFFIX}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootState {
    NotSeen,
    Open,
    Closed,
}

struct PartialRelease {
    version: String,
    name: String,
    is_latest: bool,
    files: Vec<FileEntry>,
}

impl PartialRelease {
    fn finish(self) -> Release {
        Release::new(self.version, self.name, self.is_latest, self.files)
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, ParseManifestError> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn parse_release(e: &BytesStart<'_>) -> Result<PartialRelease, ParseManifestError> {
    let version = attribute(e, "version")?.ok_or(ParseManifestError::MissingAttribute {
        element: RELEASE,
        attribute: "version",
    })?;
    let name = attribute(e, "name")?.unwrap_or_default();
    let is_latest =
        attribute(e, "latest")?.is_some_and(|latest| latest.trim().eq_ignore_ascii_case("true"));
    Ok(PartialRelease {
        version,
        name,
        is_latest,
        files: Vec::new(),
    })
}

fn parse_file(e: &BytesStart<'_>) -> Result<FileEntry, ParseManifestError> {
    let relative_path = attribute(e, "filename")?.ok_or(ParseManifestError::MissingAttribute {
        element: FILE,
        attribute: "filename",
    })?;

    match attribute(e, "action")?.as_deref() {
        None | Some("") => {}
        Some(action) if action.eq_ignore_ascii_case("del") => {
            return Ok(FileEntry::delete_marker(relative_path));
        }
        Some(action) => return Err(ParseManifestError::UnknownAction(action.to_string())),
    }

    let digest = attribute(e, "hash")?.unwrap_or_default();
    let store_url = match attribute(e, "url")? {
        Some(url) if !url.is_empty() => Some(url),
        _ => store_url_for(&relative_path, &digest),
    };
    Ok(FileEntry {
        relative_path,
        digest,
        store_url,
        action: FileAction::None,
    })
}

impl FromStr for History {
    type Err = ParseManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut reader = Reader::from_str(s);
        reader.config_mut().trim_text(true);

        let mut root = RootState::NotSeen;
        let mut releases = Vec::new();
        let mut current: Option<PartialRelease> = None;

        // Depth inside an unknown element whose subtree is ignored.
        let mut ignored_depth = 0usize;

        loop {
            let event = reader.read_event()?;
            match event {
                Event::Start(_) | Event::Empty(_) | Event::End(_) if ignored_depth > 0 => {
                    match event {
                        Event::Start(_) => ignored_depth += 1,
                        Event::End(_) => ignored_depth -= 1,
                        _ => {}
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    match root {
                        RootState::NotSeen if e.name().as_ref() == RELEASES.as_bytes() => {
                            root = if self_closing {
                                RootState::Closed
                            } else {
                                RootState::Open
                            };
                        }
                        RootState::NotSeen => {
                            return Err(ParseManifestError::UnexpectedRoot(element_name(e)))
                        }
                        RootState::Closed => {
                            return Err(ParseManifestError::UnexpectedElement(element_name(e)))
                        }
                        RootState::Open => match e.name().as_ref() {
                            b"release" if current.is_none() => {
                                let release = parse_release(e)?;
                                if self_closing {
                                    releases.push(release.finish());
                                } else {
                                    current = Some(release);
                                }
                            }
                            b"files" if current.is_some() => {}
                            b"file" => match current.as_mut() {
                                Some(release) => release.files.push(parse_file(e)?),
                                None => {
                                    return Err(ParseManifestError::UnexpectedElement(
                                        element_name(e),
                                    ))
                                }
                            },
                            b"release" | b"files" => {
                                return Err(ParseManifestError::UnexpectedElement(element_name(e)))
                            }
                            _ => {
                                tracing::debug!("ignoring unknown element '{}'", element_name(e));
                                if !self_closing {
                                    ignored_depth = 1;
                                }
                            }
                        },
                    }
                }
                Event::End(ref e) => match e.name().as_ref() {
                    b"release" => {
                        if let Some(release) = current.take() {
                            releases.push(release.finish());
                        }
                    }
                    b"releases" => root = RootState::Closed,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        match root {
            RootState::NotSeen => Err(ParseManifestError::MissingRoot),
            RootState::Open => Err(ParseManifestError::UnexpectedEof),
            RootState::Closed => Ok(History::from_releases(releases)),
        }
    }
}

impl History {
    /// Reads the history of a target from disk.
    ///
    /// A manifest that is missing, empty or cannot be parsed results in an
    /// empty history and a warning; this is the normal situation for the
    /// first release of a target. Only failing to read an existing file is an
    /// error.
    pub fn from_path(path: &Path) -> Result<History, ReadManifestError> {
        tracing::info!("reading manifest at '{}'", path.display());

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "manifest '{}' not found, starting with an empty history",
                    path.display()
                );
                return Ok(History::default());
            }
            Err(err) => return Err(ReadManifestError::Io(path.to_path_buf(), err)),
        };

        let Ok(text) = String::from_utf8(bytes) else {
            tracing::warn!(
                "manifest '{}' is not valid utf-8, starting with an empty history",
                path.display()
            );
            return Ok(History::default());
        };

        if text.trim().is_empty() {
            tracing::warn!(
                "manifest '{}' is empty, starting with an empty history",
                path.display()
            );
            return Ok(History::default());
        }

        match History::from_str(&text) {
            Ok(history) => {
                tracing::info!("releases found: {}", history.len());
                for release in &history {
                    tracing::info!(
                        "  {} - {}{}",
                        release.name,
                        release.version,
                        if release.is_latest { " [latest]" } else { "" }
                    );
                }
                Ok(history)
            }
            Err(err) => {
                tracing::warn!(
                    "manifest '{}' is corrupted ({}), starting with an empty history",
                    path.display(),
                    err
                );
                Ok(History::default())
            }
        }
    }

    /// Serializes the history to its xml document.
    pub fn to_xml(&self) -> Result<String, WriteManifestError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;
        writer.write_event(Event::Start(BytesStart::new(RELEASES)))?;

        for release in self {
            let mut start = BytesStart::new(RELEASE);
            start.push_attribute(("name", release.name.as_str()));
            start.push_attribute(("version", release.version.as_str()));
            start.push_attribute(("latest", if release.is_latest { "true" } else { "false" }));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new(FILES)))?;

            // Files are kept sorted by `Release` itself.
            for file in release.files() {
                let mut element = BytesStart::new(FILE);
                element.push_attribute(("filename", file.relative_path.as_str()));
                match file.action.as_attribute() {
                    Some(action) => element.push_attribute(("action", action)),
                    None => {
                        element.push_attribute(("hash", file.digest.as_str()));
                        element.push_attribute(("url", file.store_url.as_deref().unwrap_or("")));
                    }
                }
                writer.write_event(Event::Empty(element))?;
            }

            writer.write_event(Event::End(BytesEnd::new(FILES)))?;
            writer.write_event(Event::End(BytesEnd::new(RELEASE)))?;
        }

        writer.write_event(Event::End(BytesEnd::new(RELEASES)))?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err).into())
    }

    /// Writes the history to `path`, creating missing parent directories.
    ///
    /// The document is written to a temporary file next to `path` which is
    /// then moved over the destination.
    pub fn write_to_path(&self, path: &Path) -> Result<(), WriteManifestError> {
        tracing::info!("saving manifest '{}'", path.display());
        let xml = self.to_xml()?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(xml.as_bytes())?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|err| WriteManifestError::Persist(path.to_path_buf(), err.error))?;

        tracing::debug!("wrote {} release(s) to '{}'", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample_history() -> History {
        History::default()
            .merge(Release::new(
                "1.0.0",
                "First",
                true,
                [
                    FileEntry::new("b.dll", "9e107d9d372bb6826bd81d3542a419d6"),
                    FileEntry::new("a.exe", "900150983cd24fb0d6963f7d28e17f72"),
                ],
            ))
            .merge(Release::new(
                "1.1.0",
                "Second & \"quoted\"",
                true,
                [
                    FileEntry::new("a.exe", "900150983cd24fb0d6963f7d28e17f72"),
                    FileEntry::new("data/c <1>.bin", "e807f1fcf82d132f9bb018ca6738a19f"),
                    FileEntry::delete_marker("b.dll"),
                ],
            ))
    }

    #[test]
    fn test_serialize_parse_is_a_fixed_point() {
        let history = sample_history();
        let xml = history.to_xml().unwrap();

        let parsed = History::from_str(&xml).unwrap();
        assert_eq!(parsed, history);
        assert_eq!(parsed.to_xml().unwrap(), xml);
    }

    #[test]
    fn test_serialized_shape() {
        let xml = sample_history().to_xml().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>"#));
        assert!(xml.contains(r#"<release name="First" version="1.0.0" latest="false">"#));
        assert!(xml.contains(
            r#"<release name="Second &amp; &quot;quoted&quot;" version="1.1.0" latest="true">"#
        ));
        assert!(xml.contains(
            r#"<file filename="a.exe" hash="900150983cd24fb0d6963f7d28e17f72" url="72/a.exe_900150983cd24fb0d6963f7d28e17f72"/>"#
        ));
        assert!(xml.contains(r#"<file filename="b.dll" action="del"/>"#));

        // Files are written in path order.
        let a = xml.find(r#"filename="a.exe""#).unwrap();
        let b = xml.find(r#"filename="b.dll""#).unwrap();
        assert!(a < b);
        assert!(xml.ends_with("</releases>\n"));
    }

    #[test]
    fn test_parse_foreign_document() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<releases>
	<release name="old" version="0.9" latest="True">
		<files>
			<file filename="z.txt" hash="e807f1fcf82d132f9bb018ca6738a19f" url="9f/z.txt_e807f1fcf82d132f9bb018ca6738a19f" />
			<file filename="a.txt" hash="900150983cd24fb0d6963f7d28e17f72" />
		</files>
	</release>
	<release name="empty" version="0.8" latest="False" />
</releases>"#;
        let history = History::from_str(xml).unwrap();
        assert_eq!(history.len(), 2);

        let old = history.get("0.9").unwrap();
        assert!(old.is_latest);
        let paths: Vec<_> = old
            .files()
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(paths, ["a.txt", "z.txt"]);
        assert_eq!(
            old.file("a.txt").unwrap().store_url.as_deref(),
            Some("72/a.txt_900150983cd24fb0d6963f7d28e17f72")
        );

        let empty = history.get("0.8").unwrap();
        assert!(!empty.is_latest);
        assert!(empty.files().is_empty());
    }

    #[test]
    fn test_parse_tolerates_multiple_latest() {
        let xml = r#"<releases>
            <release name="a" version="1" latest="true"><files/></release>
            <release name="b" version="2" latest="true"><files/></release>
        </releases>"#;
        let history = History::from_str(xml).unwrap();
        assert_eq!(history.iter().filter(|r| r.is_latest).count(), 2);
    }

    #[test]
    fn test_unknown_elements_are_skipped_with_their_children() {
        let xml = r#"<releases>
            <channel><release name="x" version="9" latest="true"><files/></release></channel>
            <release name="a" version="1" latest="true">
                <files>
                    <signature><file filename="nested" hash="h"/></signature>
                    <file filename="a" hash="900150983cd24fb0d6963f7d28e17f72"/>
                </files>
            </release>
            <comment/>
        </releases>"#;
        let history = History::from_str(xml).unwrap();
        assert_eq!(history.len(), 1);
        let release = history.get("1").unwrap();
        assert!(history.get("9").is_none());
        assert_eq!(release.files().len(), 1);
        assert!(release.file("nested").is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(History::from_str(""), Err(ParseManifestError::MissingRoot));
        assert_matches!(
            History::from_str("<manifest/>"),
            Err(ParseManifestError::UnexpectedRoot(name)) if name == "manifest"
        );
        assert_matches!(
            History::from_str(r#"<releases><release name="x"><files/></release></releases>"#),
            Err(ParseManifestError::MissingAttribute { attribute: "version", .. })
        );
        assert_matches!(
            History::from_str(
                r#"<releases><release version="1"><files><file filename="a" action="move"/></files></release></releases>"#
            ),
            Err(ParseManifestError::UnknownAction(action)) if action == "move"
        );
        assert_matches!(
            History::from_str(r#"<releases><file filename="a"/></releases>"#),
            Err(ParseManifestError::UnexpectedElement(name)) if name == "file"
        );
        assert!(History::from_str("<releases><release version=\"1\">").is_err());
    }

    #[test]
    fn test_empty_history_round_trip() {
        let xml = History::default().to_xml().unwrap();
        assert!(History::from_str(&xml).unwrap().is_empty());
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_from_path_missing_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let history = History::from_path(&temp_dir.path().join("win-x64_manifest.xml")).unwrap();
        assert!(history.is_empty());
        assert!(logs_contain("not found, starting with an empty history"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_from_path_corrupt_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("corrupt_manifest.xml");
        fs::write(&path, "<releases><release").unwrap();
        assert!(History::from_path(&path).unwrap().is_empty());
        assert!(logs_contain("is corrupted"));

        fs::write(&path, "   \n").unwrap();
        assert!(History::from_path(&path).unwrap().is_empty());
        assert!(logs_contain("is empty"));

        fs::write(&path, "<other/>").unwrap();
        assert!(History::from_path(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_to_path_creates_parents_and_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("deploy/nested/linux-x64_manifest.xml");
        let history = sample_history();

        history.write_to_path(&path).unwrap();
        let first = fs::read(&path).unwrap();

        let loaded = History::from_path(&path).unwrap();
        assert_eq!(loaded, history);
        loaded.write_to_path(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_manifest_file_name() {
        assert_eq!(manifest_file_name("win-x64"), "win-x64_manifest.xml");
    }
}
