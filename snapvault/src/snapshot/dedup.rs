//! Duplicate snapshot detection.
//!
//! Snapshot inventory is derived from the destination directory listing;
//! there is no separate index. Every file whose name carries the source
//! directory's prefix and the archive extension is a candidate, and each
//! candidate is hashed pairwise against the new snapshot. Hourly cadence
//! keeps candidate counts small, so O(n) digests per check is fine.

use super::digest;
use super::{Snapshot, ARCHIVE_EXT};
use crate::utils::errors::{EngineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Look for an existing snapshot in `destination` whose content digest
/// matches the freshly written `snapshot`. The new snapshot itself is
/// skipped. Returns the first match: the older snapshot the caller will
/// retain while deleting the new one.
pub fn find_duplicate(
    snapshot: &Snapshot,
    destination: &Path,
    prefix: &str,
) -> Result<Option<PathBuf>> {
    let suffix = format!(".{ARCHIVE_EXT}");

    for entry in fs::read_dir(destination)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();

        if !file_name.starts_with(prefix)
            || !file_name.ends_with(suffix.as_str())
            || file_name == snapshot.name.as_str()
        {
            continue;
        }
        if !entry.file_type()?.is_file() {
            continue;
        }

        let candidate = entry.path();
        let candidate_digest =
            digest::file_digest(&candidate).map_err(|source| EngineError::DuplicateCheck {
                path: candidate.clone(),
                source,
            })?;

        if candidate_digest == snapshot.digest {
            return Ok(Some(candidate));
        }
        debug!("candidate {} differs", candidate.display());
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot_at(dir: &Path, name: &str, contents: &[u8]) -> Snapshot {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        Snapshot::capture(&path).unwrap()
    }

    #[test]
    fn test_detects_identical_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("docs_2024-01-01T00-00-00.tar.zst"), b"same").unwrap();

        let new = snapshot_at(dir.path(), "docs_2024-01-01T01-00-00.tar.zst", b"same");
        let found = find_duplicate(&new, dir.path(), "docs_").unwrap();

        assert_eq!(
            found,
            Some(dir.path().join("docs_2024-01-01T00-00-00.tar.zst"))
        );
    }

    #[test]
    fn test_different_contents_are_unique() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("docs_2024-01-01T00-00-00.tar.zst"),
            b"earlier",
        )
        .unwrap();

        let new = snapshot_at(dir.path(), "docs_2024-01-01T01-00-00.tar.zst", b"changed");
        assert!(find_duplicate(&new, dir.path(), "docs_")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_new_snapshot_is_not_its_own_duplicate() {
        let dir = TempDir::new().unwrap();
        let new = snapshot_at(dir.path(), "docs_2024-01-01T00-00-00.tar.zst", b"alone");

        assert!(find_duplicate(&new, dir.path(), "docs_")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_other_sources_are_ignored() {
        let dir = TempDir::new().unwrap();
        // Identical bytes, but snapshots of a different source directory
        std::fs::write(dir.path().join("pics_2024-01-01T00-00-00.tar.zst"), b"same").unwrap();
        // ...and a non-archive file with the right prefix
        std::fs::write(dir.path().join("docs_notes.txt"), b"same").unwrap();

        let new = snapshot_at(dir.path(), "docs_2024-01-01T01-00-00.tar.zst", b"same");
        assert!(find_duplicate(&new, dir.path(), "docs_")
            .unwrap()
            .is_none());
    }
}
