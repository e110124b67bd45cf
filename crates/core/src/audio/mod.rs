//! Reference audio handling around the aligner boundary.

pub mod fetch;

pub use fetch::{AudioSource, resolve_audio};
