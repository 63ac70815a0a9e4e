//! File system helpers for the snapshot engine.

pub mod walker;
