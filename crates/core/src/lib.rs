//! Lyric-to-audio synchronization: rebuilds per-line, per-syllable
//! karaoke timings from an external forced aligner's word timings.

pub mod audio;
pub mod cache;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod types;

pub use error::AlignError;
pub use pipeline::{SyncConfig, SyncReport, reconstruct};
