//! Hangul text helpers shared by the tokenizer and the interpolator.
//!
//! A "syllable block" is one precomposed Hangul syllable (U+AC00..=U+D7A3).
//! Everything else (Latin, digits, punctuation, jamo, other scripts) is
//! treated as opaque non-Korean text.

const SYLLABLE_FIRST: char = '\u{AC00}';
const SYLLABLE_LAST: char = '\u{D7A3}';

/// True if `c` is a precomposed Hangul syllable block.
pub fn is_syllable_block(c: char) -> bool {
    (SYLLABLE_FIRST..=SYLLABLE_LAST).contains(&c)
}

/// Extract alignment tokens from one line of text.
///
/// Each Hangul syllable block is its own token; each maximal run of
/// characters that are neither syllable blocks nor whitespace is one token.
/// Whitespace only separates.
pub fn extract_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut run = String::new();

    for c in text.chars() {
        if is_syllable_block(c) {
            if !run.is_empty() {
                tokens.push(std::mem::take(&mut run));
            }
            tokens.push(c.to_string());
        } else if c.is_whitespace() {
            if !run.is_empty() {
                tokens.push(std::mem::take(&mut run));
            }
        } else {
            run.push(c);
        }
    }
    if !run.is_empty() {
        tokens.push(run);
    }

    tokens
}

/// Split a word into syllable units for per-syllable timing.
///
/// Every syllable block is one unit. A run of non-Korean text preceding a
/// block stays attached to that block; only text after the last block
/// joins the block before it. A word without any syllable block is a
/// single unit.
pub fn syllable_units(word: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut pending = String::new();
    let mut seen_block = false;

    for c in word.chars() {
        if is_syllable_block(c) {
            if seen_block {
                units.push(std::mem::take(&mut current));
            }
            current.push_str(&std::mem::take(&mut pending));
            current.push(c);
            seen_block = true;
        } else if seen_block {
            pending.push(c);
        } else {
            current.push(c);
        }
    }
    current.push_str(&pending);
    if !current.is_empty() {
        units.push(current);
    }

    units
}

/// Number of syllable units in `word`.
pub fn syllable_count(word: &str) -> usize {
    let blocks = word.chars().filter(|&c| is_syllable_block(c)).count();
    if blocks == 0 {
        usize::from(!word.is_empty())
    } else {
        blocks
    }
}
