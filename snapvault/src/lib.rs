//! Snapvault Library
//!
//! Scheduled directory snapshot engine: archives a source tree into
//! compressed, timestamped snapshots, collapses byte-identical
//! duplicates, and restores snapshots back onto disk, with cooperative
//! pause/resume/stop between units of work.

pub mod archive;
pub mod config;
pub mod events;
pub mod fs;
pub mod job;
pub mod snapshot;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, JobConfig};
pub use events::{EngineEvent, EventBus};
pub use job::{JobController, JobState};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
