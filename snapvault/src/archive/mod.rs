//! Compressed tar snapshot archives: creation and restore.

pub mod reader;
pub mod writer;

pub use reader::{restore_archive, ReadOutcome};
pub use writer::{write_archive, WriteOutcome};
