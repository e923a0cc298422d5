//! Noise removal for raw extracted text.

use regex::Regex;
use std::sync::LazyLock;

static NON_WORD_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\W_]+").expect("non-word pattern is valid"));

// Isolated one or two digit tokens are almost always page numbers or footer
// counters once punctuation has been stripped.
static PAGE_NUMBERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\b\d{1,2}\b)(?:\s[.\W_]+)*").expect("page number pattern is valid")
});

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Strips symbols, stray page numbers and repeated whitespace.
///
/// Never fails; text made only of noise normalizes to the empty string.
pub fn normalize_text(text: &str) -> String {
    let words_only = NON_WORD_RUNS.replace_all(text, " ");
    let without_pages = PAGE_NUMBERS.replace_all(&words_only, "");
    WHITESPACE_RUNS
        .replace_all(&without_pages, " ")
        .trim()
        .to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_and_spacing_are_removed() {
        let input = "The quick brown fox jumps over the lazy dog repeatedly today.";
        assert_eq!(
            normalize_text(input),
            "The quick brown fox jumps over the lazy dog repeatedly today"
        );
    }

    #[test]
    fn short_numeric_tokens_are_dropped() {
        let input = "Page 3 of 12 -- Introduction!\n\n\tSection";
        assert_eq!(normalize_text(input), "Page of Introduction Section");
    }

    #[test]
    fn longer_numbers_survive() {
        assert_eq!(normalize_text("Revised in 2024 (rev. 105)"), "Revised in 2024 rev 105");
    }

    #[test]
    fn underscores_count_as_noise() {
        assert_eq!(normalize_text("snake_case__value"), "snake case value");
    }

    #[test]
    fn garbage_normalizes_to_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("  ***  ---  7 "), "");
    }

    #[test]
    fn word_count_splits_on_whitespace() {
        assert_eq!(word_count("one two  three\nfour"), 4);
        assert_eq!(word_count(""), 0);
    }
}
