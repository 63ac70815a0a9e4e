//! Job control: run-state machine, scheduling loop and worker dispatch.
//!
//! One controller owns one backup/restore slot. At most one background
//! worker exists at a time; the worker communicates back through the
//! event bus and is steered through the [`gate::WorkGate`] shared with
//! the archive loops.

pub mod gate;

use crate::archive::{reader, writer, ReadOutcome, WriteOutcome};
use crate::config::JobConfig;
use crate::events::{EngineEvent, EventBus};
use crate::fs::walker::WalkOptions;
use crate::snapshot::{self, dedup, Snapshot};
use crate::utils::errors::{EngineError, Result};
use chrono::Local;
use gate::WorkGate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Run state of a job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Stopped,
    Running,
    Paused,
    Restoring,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Stopped => "stopped",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Restoring => "restoring",
        };
        f.write_str(name)
    }
}

/// Outcome of one scheduled snapshot attempt.
enum AttemptOutcome {
    Created(Snapshot),
    Duplicate { name: String, kept: PathBuf },
    Cancelled,
}

/// Controller for one backup/restore job slot.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<JobState>,
    config: Mutex<Option<JobConfig>>,
    gate: Mutex<Option<Arc<WorkGate>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    events: EventBus,
}

impl Inner {
    fn emit_state(&self, state: JobState) {
        self.events.emit(EngineEvent::StateChanged { state });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // A still-running worker must not outlive its controller.
        if let Some(gate) = lock(&self.gate).take() {
            gate.cancel();
        }
    }
}

impl JobController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(JobState::Stopped),
                config: Mutex::new(None),
                gate: Mutex::new(None),
                worker: Mutex::new(None),
                events: EventBus::new(),
            }),
        }
    }

    /// Subscribe to progress and log events emitted by the worker.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> JobState {
        *lock(&self.inner.state)
    }

    /// Set the job configuration. Rejected while a worker is active.
    pub fn configure(&self, config: JobConfig) -> Result<()> {
        let state = lock(&self.inner.state);
        if *state != JobState::Stopped {
            return Err(EngineError::AlreadyRunning(*state));
        }
        config.validate()?;
        *lock(&self.inner.config) = Some(config);
        Ok(())
    }

    /// Begin the scheduled snapshot loop: one attempt now, then one per
    /// tick interval until stopped.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            if *state != JobState::Stopped {
                return Err(EngineError::AlreadyRunning(*state));
            }

            let config = lock(&self.inner.config)
                .clone()
                .ok_or_else(|| EngineError::Config("job is not configured".to_string()))?;
            config.validate()?;

            let gate = Arc::new(WorkGate::new());
            *lock(&self.inner.gate) = Some(Arc::clone(&gate));
            *state = JobState::Running;

            let events = self.inner.events.clone();
            let handle = tokio::spawn(backup_loop(config, gate, events));
            *lock(&self.inner.worker) = Some(handle);
        }

        self.inner.emit_state(JobState::Running);
        info!("job started");
        Ok(())
    }

    /// Suspend progress at the next unit-of-work boundary. No-op unless
    /// running.
    pub fn pause(&self) {
        let mut state = lock(&self.inner.state);
        if *state != JobState::Running {
            return;
        }
        if let Some(gate) = lock(&self.inner.gate).as_ref() {
            gate.pause();
        }
        *state = JobState::Paused;
        drop(state);

        self.inner.emit_state(JobState::Paused);
        info!("job paused");
    }

    /// Resume a paused job. No-op unless paused.
    pub fn resume(&self) {
        let mut state = lock(&self.inner.state);
        if *state != JobState::Paused {
            return;
        }
        if let Some(gate) = lock(&self.inner.gate).as_ref() {
            gate.resume();
        }
        *state = JobState::Running;
        drop(state);

        self.inner.emit_state(JobState::Running);
        info!("job resumed");
    }

    /// Stop the active worker, abandoning the current operation at its
    /// next unit boundary. Wins over a concurrent pause. No-op when
    /// already stopped.
    pub async fn stop(&self) {
        let (gate, handle) = {
            let mut state = lock(&self.inner.state);
            if *state == JobState::Stopped {
                return;
            }
            *state = JobState::Stopped;
            (lock(&self.inner.gate).take(), lock(&self.inner.worker).take())
        };

        if let Some(gate) = gate {
            gate.cancel();
        }
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("worker task failed during stop: {e}");
                }
            }
        }

        self.inner.emit_state(JobState::Stopped);
        info!("job stopped");
    }

    /// Restore an archive into a target directory on the worker slot.
    /// Requires the job to be stopped; the controller returns to
    /// `Stopped` when the restore finishes, fails or is stopped. The
    /// caller is expected to have confirmed overwriting the target.
    pub async fn restore(&self, archive: &Path, target: &Path) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            if *state != JobState::Stopped {
                return Err(EngineError::AlreadyRunning(*state));
            }

            let gate = Arc::new(WorkGate::new());
            *lock(&self.inner.gate) = Some(Arc::clone(&gate));
            *state = JobState::Restoring;

            let handle = tokio::spawn(restore_worker(
                Arc::clone(&self.inner),
                archive.to_path_buf(),
                target.to_path_buf(),
                gate,
            ));
            *lock(&self.inner.worker) = Some(handle);
        }

        self.inner.emit_state(JobState::Restoring);
        info!(
            "restore started: {} -> {}",
            archive.display(),
            target.display()
        );
        Ok(())
    }
}

impl Default for JobController {
    fn default() -> Self {
        Self::new()
    }
}

/// The scheduled worker: one snapshot attempt, then an interruptible wait
/// of one tick interval, until stopped. A failed attempt never kills the
/// schedule.
async fn backup_loop(config: JobConfig, gate: Arc<WorkGate>, events: EventBus) {
    let tick = config.tick_interval();

    loop {
        match snapshot_attempt(&config, &gate, &events).await {
            Ok(AttemptOutcome::Cancelled) => break,
            Ok(AttemptOutcome::Created(snapshot)) => {
                info!("snapshot created: {}", snapshot.name);
            }
            Ok(AttemptOutcome::Duplicate { name, kept }) => {
                info!(
                    "duplicate snapshot {} deleted, keeping {}",
                    name,
                    kept.display()
                );
            }
            Err(e) => {
                error!("snapshot attempt failed: {e}");
                events.emit(EngineEvent::SnapshotFailed {
                    error: e.to_string(),
                });
            }
        }

        if gate.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = gate.cancelled() => break,
        }
    }
}

/// Write one snapshot, then decide whether to keep it: hash the closed
/// archive, compare against every prior snapshot of the same source, and
/// delete the newer file on a match.
async fn snapshot_attempt(
    config: &JobConfig,
    gate: &Arc<WorkGate>,
    events: &EventBus,
) -> Result<AttemptOutcome> {
    let source_base = snapshot::source_base_name(&config.source_path)?;
    let name = snapshot::file_name(&source_base, Local::now());
    let path = config.destination_path.join(&name);

    events.emit(EngineEvent::SnapshotStarted { name: name.clone() });

    let outcome = {
        let source = config.source_path.clone();
        let archive_path = path.clone();
        let options = WalkOptions {
            follow_links: false,
            exclude_patterns: config.exclude_patterns.clone(),
        };
        let level = config.compression_level;
        let gate = Arc::clone(gate);
        let events = events.clone();
        tokio::task::spawn_blocking(move || {
            writer::write_archive(&source, &archive_path, &options, level, &gate, &events)
        })
        .await
        .map_err(|e| EngineError::Worker(e.to_string()))??
    };

    match outcome {
        WriteOutcome::Cancelled => {
            if config.remove_partial_on_stop {
                remove_snapshot_file(&path);
            }
            Ok(AttemptOutcome::Cancelled)
        }
        WriteOutcome::Completed { entries } => {
            let (snapshot, duplicate) = {
                let snapshot_path = path.clone();
                let destination = config.destination_path.clone();
                let prefix = snapshot::prefix(&source_base);
                tokio::task::spawn_blocking(move || -> Result<(Snapshot, Option<PathBuf>)> {
                    let snapshot = Snapshot::capture(&snapshot_path)?;
                    let duplicate = dedup::find_duplicate(&snapshot, &destination, &prefix)?;
                    Ok((snapshot, duplicate))
                })
                .await
                .map_err(|e| EngineError::Worker(e.to_string()))??
            };

            match duplicate {
                Some(kept) => {
                    std::fs::remove_file(&snapshot.path)?;
                    events.emit(EngineEvent::SnapshotDuplicate {
                        name: snapshot.name.clone(),
                        kept: kept.display().to_string(),
                    });
                    Ok(AttemptOutcome::Duplicate {
                        name: snapshot.name,
                        kept,
                    })
                }
                None => {
                    events.emit(EngineEvent::SnapshotCreated {
                        name: snapshot.name.clone(),
                        path: snapshot.path.display().to_string(),
                        entries,
                    });
                    Ok(AttemptOutcome::Created(snapshot))
                }
            }
        }
    }
}

/// The one-shot restore worker. Settles the controller back to `Stopped`
/// on every exit path unless a concurrent stop already did.
async fn restore_worker(inner: Arc<Inner>, archive: PathBuf, target: PathBuf, gate: Arc<WorkGate>) {
    inner.events.emit(EngineEvent::RestoreStarted {
        archive: archive.display().to_string(),
    });

    let result = {
        let gate = Arc::clone(&gate);
        let events = inner.events.clone();
        let archive = archive.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || reader::restore_archive(&archive, &target, &gate, &events))
            .await
            .unwrap_or_else(|e| Err(EngineError::Worker(e.to_string())))
    };

    match result {
        Ok(ReadOutcome::Completed { members }) => {
            info!("restore completed: {} members", members);
            inner.events.emit(EngineEvent::RestoreCompleted {
                target: target.display().to_string(),
                members,
            });
        }
        Ok(ReadOutcome::Cancelled) => {
            info!("restore cancelled");
        }
        Err(e) => {
            error!("restore failed: {e}");
            inner.events.emit(EngineEvent::RestoreFailed {
                error: e.to_string(),
            });
        }
    }

    let mut state = lock(&inner.state);
    if *state == JobState::Restoring {
        *state = JobState::Stopped;
        lock(&inner.gate).take();
        drop(state);
        inner.emit_state(JobState::Stopped);
    }
}

fn remove_snapshot_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(
                "failed to remove partial snapshot {}: {}",
                path.display(),
                e
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
