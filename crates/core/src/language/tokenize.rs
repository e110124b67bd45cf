//! Lyric lines → flat aligner text with explicit line boundaries.

use crate::types::LyricLine;

use super::hangul;

/// Sentinel inserted between lines; never produced by tokenization.
pub const LINE_SEPARATOR: &str = "||LINE_BREAK||";

/// Tokenize one line and join its tokens with single spaces.
///
/// Whitespace-only lines yield an empty string.
pub fn tokenize_line(text: &str) -> String {
    hangul::extract_tokens(text).join(" ")
}

/// Flatten all lines into the text submitted to the aligner.
///
/// Lines are joined with `" ||LINE_BREAK|| "`. Empty lines are kept so
/// that separator positions stay in step with line ordinals.
pub fn tokenize(lines: &[LyricLine]) -> String {
    lines
        .iter()
        .map(|line| tokenize_line(&line.original_text))
        .collect::<Vec<_>>()
        .join(&format!(" {} ", LINE_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::lines_from_texts;

    #[test]
    fn test_tokenize_line_korean() {
        assert_eq!(tokenize_line("술을 마시고"), "술 을 마 시 고");
    }

    #[test]
    fn test_tokenize_joins_lines_with_separator() {
        let lines = lines_from_texts(&["가나", "hello world"]);
        assert_eq!(tokenize(&lines), "가 나 ||LINE_BREAK|| hello world");
    }

    #[test]
    fn test_tokenize_keeps_empty_line() {
        let lines = lines_from_texts(&["가", "   ", "나"]);
        assert_eq!(
            tokenize(&lines),
            "가 ||LINE_BREAK||  ||LINE_BREAK|| 나"
        );
    }

    #[test]
    fn test_tokenize_empty_input() {
        assert_eq!(tokenize(&[]), "");
    }

    #[test]
    fn test_tokenization_reversible_for_korean() {
        let text = "오늘 밤 우리 함께";
        let rejoined: String = tokenize_line(text).split(' ').collect();
        let original: String = text.split(' ').collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_separator_count_matches_line_count() {
        let lines = lines_from_texts(&["a", "b", "c", "d"]);
        let flat = tokenize(&lines);
        assert_eq!(flat.matches(LINE_SEPARATOR).count(), lines.len() - 1);
    }
}
