//! Lyric text processing and alignment result reconstruction.

pub mod align;
pub mod hangul;
pub mod interpolate;
pub mod segment;
pub mod tokenize;

pub use interpolate::interpolate;
pub use segment::segment;
pub use tokenize::{LINE_SEPARATOR, tokenize};
