//! Word-level timings → per-syllable timings.
//!
//! When the aligner returns a multi-syllable word as one token, its span is
//! divided evenly among the syllables. The span runs from the word's start
//! to the next mark in the line, else the first mark of the next line,
//! else a fixed default. Uniform syllable duration is an approximation, not
//! an acoustic measurement.

use crate::types::{LineTimingResult, SyllableTiming, join_marks};

use super::hangul;

/// Span given to a word with nothing after it.
pub const DANGLING_WORD_SECONDS: f64 = 1.0;

/// Expand multi-syllable marks in every line into evenly spaced syllables.
///
/// Marks with a single syllable unit pass through untouched, so applying
/// this to its own output is a no-op.
pub fn interpolate(lines: &[LineTimingResult]) -> Vec<LineTimingResult> {
    lines
        .iter()
        .enumerate()
        .map(|(line_idx, line)| {
            let next_line_start = lines
                .get(line_idx + 1)
                .and_then(|next| next.timings.first())
                .map(|t| t.time_seconds);

            let mut timings = Vec::with_capacity(line.timings.len());
            for (word_idx, word) in line.timings.iter().enumerate() {
                let next_start = line
                    .timings
                    .get(word_idx + 1)
                    .map(|t| t.time_seconds)
                    .or(next_line_start);
                timings.extend(expand_word(word, next_start));
            }

            LineTimingResult {
                line_index: line.line_index,
                original_text: line.original_text.clone(),
                refined_text: join_marks(&timings),
                timings,
            }
        })
        .collect()
}

/// Split one word mark into syllable marks ending at `next_start`.
fn expand_word(word: &SyllableTiming, next_start: Option<f64>) -> Vec<SyllableTiming> {
    let units = hangul::syllable_units(&word.mark_name);
    if units.len() <= 1 {
        return vec![word.clone()];
    }

    let end = next_start.unwrap_or(word.time_seconds + DANGLING_WORD_SECONDS);
    let duration = (end - word.time_seconds).max(0.0);
    let step = duration / units.len() as f64;

    units
        .iter()
        .enumerate()
        .map(|(i, unit)| SyllableTiming::new(word.time_seconds + step * i as f64, unit))
        .collect()
}
