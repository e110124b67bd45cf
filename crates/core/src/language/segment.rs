//! Regroup the aligner's flat token timings into per-line results.
//!
//! Segmentation is sequential and position based: every separator token
//! closes the current line. There is no content matching, so a dropped
//! separator merges two lines and an extra one yields an empty line.

use crate::types::{LineTimingResult, LyricLine, SyllableTiming, TimedToken};

use super::tokenize::LINE_SEPARATOR;

/// Split `tokens` at separator tokens and attach each group to the next
/// input line in order.
///
/// Returns at most `lines.len()` results. Emissions past the last input
/// line are dropped.
pub fn segment(tokens: &[TimedToken], lines: &[LyricLine]) -> Vec<LineTimingResult> {
    let mut results = Vec::with_capacity(lines.len());
    let mut buffer: Vec<SyllableTiming> = Vec::new();
    let mut cursor = 0usize;

    for token in tokens {
        if token.text == LINE_SEPARATOR {
            match lines.get(cursor) {
                Some(line) => {
                    results.push(LineTimingResult::from_timings(
                        line,
                        std::mem::take(&mut buffer),
                    ));
                }
                None => {
                    log::debug!("Dropping separator beyond last line (cursor {})", cursor);
                    buffer.clear();
                }
            }
            cursor += 1;
        } else if !token.text.is_empty() {
            buffer.push(SyllableTiming::new(token.start, &token.text));
        }
    }

    if !buffer.is_empty() {
        if let Some(line) = lines.get(cursor) {
            results.push(LineTimingResult::from_timings(line, buffer));
        }
    }

    results
}
