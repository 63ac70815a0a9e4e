//! Snapshot identity: timestamped names and content digests.

pub mod dedup;
pub mod digest;

use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Extension shared by every snapshot archive.
pub const ARCHIVE_EXT: &str = "tar.zst";

/// A single point-in-time archive of the source tree.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub name: String,
    pub path: PathBuf,
    pub digest: String,
}

impl Snapshot {
    /// Capture a fully written archive: record its name and content
    /// digest. Must only be called after the archive is closed and
    /// flushed; a half-written file would produce a digest that matches
    /// nothing.
    pub fn capture(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                EngineError::Config(format!("{} is not a snapshot file path", path.display()))
            })?;

        let digest = digest::file_digest(path).map_err(|source| EngineError::DuplicateCheck {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            digest,
        })
    }
}

/// Snapshot filename for a source directory at a point in time:
/// `{base}_{YYYY-MM-DDTHH-MM-SS}.tar.zst`, local time, colon-free so the
/// name is portable across filesystems.
pub fn file_name(source_base: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        source_base,
        at.format("%Y-%m-%dT%H-%M-%S"),
        ARCHIVE_EXT
    )
}

/// Filename prefix shared by all snapshots of one source directory.
pub fn prefix(source_base: &str) -> String {
    format!("{source_base}_")
}

/// Base name of the source directory; doubles as the archive root entry.
pub fn source_base_name(source: &Path) -> Result<String> {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            EngineError::Config(format!(
                "source path {} has no directory name",
                source.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        let name = file_name("mydir", at(9, 30, 5));
        assert_eq!(name, "mydir_2024-03-15T09-30-05.tar.zst");
    }

    #[test]
    fn test_file_name_has_no_colons() {
        let name = file_name("mydir", at(23, 59, 59));
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_names_one_second_apart_differ() {
        assert_ne!(file_name("mydir", at(1, 2, 3)), file_name("mydir", at(1, 2, 4)));
    }

    #[test]
    fn test_names_for_different_sources_never_collide() {
        let t = at(1, 2, 3);
        assert_ne!(file_name("alpha", t), file_name("beta", t));
    }

    #[test]
    fn test_source_base_name() {
        let base = source_base_name(Path::new("/data/docs")).unwrap();
        assert_eq!(base, "docs");

        assert!(source_base_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_capture_reads_digest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("docs_2024-03-15T09-30-05.tar.zst");
        std::fs::write(&path, b"archive bytes").unwrap();

        let snapshot = Snapshot::capture(&path).unwrap();
        assert_eq!(snapshot.name, "docs_2024-03-15T09-30-05.tar.zst");
        assert_eq!(snapshot.digest.len(), 64);
    }
}
