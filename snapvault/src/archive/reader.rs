//! Snapshot restore.
//!
//! Two passes over the archive: the first enumerates members so the total
//! is known before extraction starts, the second extracts one member per
//! unit of work under the same gate protocol as the writer. Existing
//! files at the target are overwritten without prompting; the caller is
//! expected to have confirmed the restore once, up front.

use crate::events::{EngineEvent, EventBus, ProgressPayload};
use crate::job::gate::{UnitFlow, WorkGate};
use crate::utils::errors::{EngineError, Result};
use std::fs::File;
use std::io;
use std::path::Path;
use tar::Archive;
use tracing::info;
use zstd::stream::read::Decoder;

/// Result of one restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every member was extracted.
    Completed { members: usize },
    /// Stop was observed at a member boundary; files extracted so far are
    /// left in place.
    Cancelled,
}

/// Number of members in an archive. Also serves as a structural check:
/// a truncated or corrupt archive fails here before extraction begins.
pub fn count_members(archive_path: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(Decoder::new(file)?);

    let mut count = 0;
    for entry in archive.entries()? {
        entry?;
        count += 1;
    }
    Ok(count)
}

/// Extract every member of `archive_path` into `target`, creating it if
/// needed. Member paths are kept relative to the target; an entry that
/// would escape it aborts the restore.
pub fn restore_archive(
    archive_path: &Path,
    target: &Path,
    gate: &WorkGate,
    events: &EventBus,
) -> Result<ReadOutcome> {
    let total = count_members(archive_path)?;

    info!(
        "restoring {} ({} members) into {}",
        archive_path.display(),
        total,
        target.display()
    );
    events.emit(EngineEvent::RestoreProgress(ProgressPayload {
        current: 0,
        total,
        current_path: None,
    }));

    std::fs::create_dir_all(target)?;

    let file = File::open(archive_path)?;
    let mut archive = Archive::new(Decoder::new(file)?);
    let mut extracted = 0usize;

    for entry in archive.entries()? {
        if gate.checkpoint() == UnitFlow::Cancelled {
            info!("restore cancelled after {} of {} members", extracted, total);
            return Ok(ReadOutcome::Cancelled);
        }

        let mut entry = entry?;
        let member_path = entry.path()?.into_owned();

        if !entry.unpack_in(target)? {
            return Err(EngineError::Archive(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "archive entry {} escapes the restore target",
                    member_path.display()
                ),
            )));
        }

        extracted += 1;
        events.emit(EngineEvent::RestoreProgress(ProgressPayload {
            current: extracted,
            total,
            current_path: Some(member_path.display().to_string()),
        }));
    }

    Ok(ReadOutcome::Completed { members: extracted })
}
