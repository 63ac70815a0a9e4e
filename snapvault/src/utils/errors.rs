//! Custom error types for the snapshot engine.

use crate::job::JobState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("a worker is already active (state: {0})")]
    AlreadyRunning(JobState),

    #[error("archive I/O error: {0}")]
    Archive(#[from] io::Error),

    #[error("duplicate check failed for {}: {source}", .path.display())]
    DuplicateCheck { path: PathBuf, source: io::Error },

    #[error("worker task failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
