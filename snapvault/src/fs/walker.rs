//! Directory traversal producing archive members.
//!
//! The walker collects every entry destined for a snapshot up front, so
//! the writer knows the total unit count before the first byte is
//! compressed and progress can be reported as `(current, total)`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Entry names to skip, subtree included
    pub exclude_patterns: Vec<String>,
}

/// One entry transferred into or out of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    /// Full path on disk
    pub path: PathBuf,

    /// Path relative to the walk root (empty for the root itself)
    pub relative_path: PathBuf,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time
    pub modified: SystemTime,

    /// Is this a directory?
    pub is_dir: bool,
}

impl ArchiveMember {
    /// Create an ArchiveMember from a DirEntry.
    /// A symlink to a regular file resolves to the target; symlinks to
    /// directories and broken symlinks yield None and are skipped.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let (size, modified, is_dir) = if raw_metadata.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => (
                    resolved.len(),
                    resolved.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    false,
                ),
                _ => return Ok(None),
            }
        } else {
            (
                raw_metadata.len(),
                raw_metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                raw_metadata.is_dir(),
            )
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
            modified,
            is_dir,
        }))
    }
}

/// Walk a directory tree and collect every archive member, root directory
/// entry included. An excluded directory removes its whole subtree.
pub fn collect_members(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<ArchiveMember>> {
    let mut members = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !should_exclude(entry, &options.exclude_patterns)
        });

    for entry in walker {
        let entry = entry?;
        if let Some(member) = ArchiveMember::from_entry(&entry, root)? {
            members.push(member);
        }
    }

    Ok(members)
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    let file_name = entry.file_name().to_string_lossy();

    patterns
        .iter()
        .any(|pattern| file_name.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let members = collect_members(temp_dir.path(), &WalkOptions::default())?;

        // Only the root directory entry itself
        assert_eq!(members.len(), 1);
        assert!(members[0].is_dir);
        assert!(members[0].relative_path.as_os_str().is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("sub"))?;
        fs::write(temp_dir.path().join("a.txt"), b"content a")?;
        fs::write(temp_dir.path().join("sub/b.txt"), b"content b")?;

        let members = collect_members(temp_dir.path(), &WalkOptions::default())?;

        // root, a.txt, sub, sub/b.txt
        assert_eq!(members.len(), 4);

        let files: Vec<_> = members
            .iter()
            .filter(|m| !m.is_dir)
            .map(|m| m.relative_path.to_str().unwrap().to_string())
            .collect();
        assert!(files.contains(&"a.txt".to_string()));
        assert!(files.contains(&"sub/b.txt".to_string()));

        let dirs = members.iter().filter(|m| m.is_dir).count();
        assert_eq!(dirs, 2);

        Ok(())
    }

    #[test]
    fn test_member_sizes_and_mtimes() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("f.txt"), b"12345")?;

        let members = collect_members(temp_dir.path(), &WalkOptions::default())?;
        let file = members.iter().find(|m| !m.is_dir).unwrap();

        assert_eq!(file.size, 5);
        assert!(file.modified > SystemTime::UNIX_EPOCH);
        Ok(())
    }

    #[test]
    fn test_exclude_patterns_remove_subtree() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("keep"))?;
        fs::create_dir(temp_dir.path().join("skipme"))?;
        fs::write(temp_dir.path().join("keep/a.txt"), b"keep")?;
        fs::write(temp_dir.path().join("skipme/b.txt"), b"skip")?;

        let options = WalkOptions {
            follow_links: false,
            exclude_patterns: vec!["skipme".to_string()],
        };
        let members = collect_members(temp_dir.path(), &options)?;

        assert!(members
            .iter()
            .all(|m| !m.relative_path.to_string_lossy().contains("skipme")));
        assert!(members
            .iter()
            .any(|m| m.relative_path.to_str() == Some("keep/a.txt")));
        Ok(())
    }
}
