use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One lyric line as submitted for alignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    /// Ordinal position in the song
    pub index: usize,
    pub original_text: String,
}

impl LyricLine {
    pub fn new(index: usize, original_text: &str) -> Self {
        Self {
            index,
            original_text: original_text.to_string(),
        }
    }
}

/// Build an ordered line list from raw strings, numbering from zero.
pub fn lines_from_texts<S: AsRef<str>>(texts: &[S]) -> Vec<LyricLine> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| LyricLine::new(i, t.as_ref()))
        .collect()
}

/// Word record as printed by the external aligner.
///
/// Times are read leniently: numbers and numeric strings are kept, and
/// anything else (null, missing, garbage) becomes `None` instead of
/// failing the whole payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordTimestamp {
    pub word: String,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub start: Option<f64>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub end: Option<f64>,
}

impl WordTimestamp {
    /// Convert to a token, trimming the word. `None` when there is no
    /// usable start time.
    pub fn into_token(self) -> Option<TimedToken> {
        let start = self.start?;
        Some(TimedToken {
            text: self.word.trim().to_string(),
            start,
            end: self.end.unwrap_or(start),
        })
    }
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A token with the time the aligner placed it at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimedToken {
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds (carried through, not used for segmentation)
    pub end: f64,
}

impl TimedToken {
    pub fn new(text: &str, start: f64, end: f64) -> Self {
        Self {
            text: text.to_string(),
            start,
            end,
        }
    }
}

impl From<&TimedToken> for WordTimestamp {
    fn from(t: &TimedToken) -> Self {
        Self {
            word: t.text.clone(),
            start: Some(t.start),
            end: Some(t.end),
        }
    }
}

/// A single highlight mark: a word or a syllable and when it starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyllableTiming {
    pub time_seconds: f64,
    pub mark_name: String,
}

impl SyllableTiming {
    pub fn new(time_seconds: f64, mark_name: &str) -> Self {
        Self {
            time_seconds,
            mark_name: mark_name.to_string(),
        }
    }
}

/// Reconstructed timing for one lyric line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineTimingResult {
    /// Ordinal of the source line
    #[serde(default)]
    pub line_index: usize,
    pub original_text: String,
    /// Space-joined mark names
    pub refined_text: String,
    pub timings: Vec<SyllableTiming>,
}

impl LineTimingResult {
    /// Build a result whose refined text is derived from `timings`.
    pub fn from_timings(line: &LyricLine, timings: Vec<SyllableTiming>) -> Self {
        Self {
            line_index: line.index,
            original_text: line.original_text.clone(),
            refined_text: join_marks(&timings),
            timings,
        }
    }

    /// A result with no timings, used when alignment is unavailable.
    pub fn empty(line: &LyricLine) -> Self {
        Self::from_timings(line, Vec::new())
    }
}

/// Space-join the mark names of a timing sequence.
pub fn join_marks(timings: &[SyllableTiming]) -> String {
    timings
        .iter()
        .map(|t| t.mark_name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
