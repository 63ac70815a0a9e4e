//! Snapshot archive creation.
//!
//! Streams a directory tree into a zstd-compressed tar, one entry per
//! unit of work, with the gate checked between entries. Entry names are
//! rooted at the source directory's base name so the archive reproduces
//! the source directory when unpacked.

use crate::events::{EngineEvent, EventBus, ProgressPayload};
use crate::fs::walker::{self, ArchiveMember, WalkOptions};
use crate::job::gate::{UnitFlow, WorkGate};
use crate::utils::errors::Result;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::{info, warn};
use zstd::stream::write::Encoder;

/// Result of one archive write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every unit was processed and the archive was flushed and closed.
    Completed { entries: usize },
    /// Stop was observed at a unit boundary. The archive was still
    /// finished (tar terminator, zstd frame close), so it remains readable
    /// up to the last fully written entry; the caller decides whether to
    /// keep it.
    Cancelled,
}

/// Walk `source` and write it into a new archive at `archive_path`.
///
/// The target file must not already exist: two snapshot attempts in the
/// same wall-clock second would otherwise silently overwrite each other.
/// An unreadable source entry is skipped with a warning rather than
/// failing the snapshot. On error the partial file is removed so a broken
/// archive never lingers in the destination.
pub fn write_archive(
    source: &Path,
    archive_path: &Path,
    options: &WalkOptions,
    compression_level: i32,
    gate: &WorkGate,
    events: &EventBus,
) -> Result<WriteOutcome> {
    let root_name = crate::snapshot::source_base_name(source)?;
    let members = walker::collect_members(source, options)?;
    let total = members.len();

    info!(
        "archiving {} ({} entries) to {}",
        source.display(),
        total,
        archive_path.display()
    );
    events.emit(EngineEvent::SnapshotProgress(ProgressPayload {
        current: 0,
        total,
        current_path: None,
    }));

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(archive_path)?;

    match append_members(file, &root_name, &members, compression_level, gate, events) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(archive_path) {
                warn!(
                    "failed to remove broken archive {}: {}",
                    archive_path.display(),
                    rm
                );
            }
            Err(e)
        }
    }
}

fn append_members(
    file: File,
    root_name: &str,
    members: &[ArchiveMember],
    compression_level: i32,
    gate: &WorkGate,
    events: &EventBus,
) -> Result<WriteOutcome> {
    let total = members.len();
    let encoder = Encoder::new(file, compression_level)?;
    let mut builder = Builder::new(encoder);
    let mut appended = 0usize;

    for (index, member) in members.iter().enumerate() {
        if gate.checkpoint() == UnitFlow::Cancelled {
            finish_archive(builder)?;
            info!("archive cancelled after {} of {} entries", index, total);
            return Ok(WriteOutcome::Cancelled);
        }

        let entry_path = entry_path(root_name, &member.relative_path);
        let result = if member.is_dir {
            builder.append_dir(&entry_path, &member.path)
        } else {
            File::open(&member.path).and_then(|mut f| builder.append_file(&entry_path, &mut f))
        };

        match result {
            Ok(()) => appended += 1,
            Err(e) => {
                warn!("skipping {}: {}", member.path.display(), e);
                events.emit(EngineEvent::SnapshotWarning {
                    path: member.path.display().to_string(),
                    message: e.to_string(),
                });
            }
        }

        events.emit(EngineEvent::SnapshotProgress(ProgressPayload {
            current: index + 1,
            total,
            current_path: Some(entry_path.display().to_string()),
        }));
    }

    finish_archive(builder)?;
    Ok(WriteOutcome::Completed { entries: appended })
}

/// Write the tar terminator, close the zstd frame and flush to disk. The
/// digest in the duplicate check is only meaningful once this has run.
fn finish_archive(builder: Builder<Encoder<'static, File>>) -> std::io::Result<()> {
    let encoder = builder.into_inner()?;
    let file = encoder.finish()?;
    file.sync_all()
}

/// In-archive path for a member: the source base name for the root entry,
/// `{base}/{relative}` for everything below it.
fn entry_path(root_name: &str, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        PathBuf::from(root_name)
    } else {
        Path::new(root_name).join(relative)
    }
}
