//! Gapless live audio capture.
//!
//! Audio from an input device is written to a sequence of encoded files.
//! An operator can request a break at any time; the capture callback
//! closes the current file and opens the next one between two buffers, so
//! no frame is dropped or duplicated across the boundary.

pub mod audio;
pub mod cli;
pub mod config;
pub mod control;
pub mod global;
