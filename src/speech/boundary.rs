//! Word boundary detection for backends without native boundary events
//!
//! This is deliberately simple: a word is a run of characters up to the
//! next run of non-word characters. It exists to give deterministic word
//! timing, not linguistically accurate tokenization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Runs of non-word characters (whitespace, punctuation, symbols)
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\W+").expect("separator pattern is valid"));

/// One speakable unit within an utterance
///
/// `start` and `length` are byte offsets into the utterance text;
/// `next` is where scanning resumes after the trailing separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSpan {
    pub start: usize,
    pub length: usize,
    pub next: usize,
}

/// Locates successive words in a text
#[derive(Debug, Default, Clone, Copy)]
pub struct WordBoundaryTracker;

impl WordBoundaryTracker {
    pub fn new() -> Self {
        Self
    }

    /// Find the word at or after `cursor`
    ///
    /// Separators directly at the cursor are skipped first. Returns `None`
    /// when nothing speakable remains.
    pub fn next_word(&self, text: &str, cursor: usize) -> Option<WordSpan> {
        if cursor >= text.len() || !text.is_char_boundary(cursor) {
            return None;
        }

        let mut start = cursor;
        if let Some(leading) = SEPARATORS.find_at(text, start) {
            if leading.start() == start {
                start = leading.end();
            }
        }
        if start >= text.len() {
            return None;
        }

        let (run_start, run_end) = match SEPARATORS.find_at(text, start) {
            Some(run) => (run.start(), run.end()),
            None => (text.len(), text.len()),
        };

        Some(WordSpan {
            start,
            length: run_start - start,
            next: run_end,
        })
    }

    /// Every word in `text`, in order
    pub fn words(&self, text: &str) -> Vec<WordSpan> {
        let mut spans = Vec::new();
        let mut cursor = 0;
        while let Some(span) = self.next_word(text, cursor) {
            cursor = span.next;
            spans.push(span);
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(text: &str) -> Vec<(usize, usize)> {
        WordBoundaryTracker::new()
            .words(text)
            .iter()
            .map(|w| (w.start, w.length))
            .collect()
    }

    #[test]
    fn test_hello_world() {
        assert_eq!(pairs("Hello, world!"), vec![(0, 5), (7, 5)]);
    }

    #[test]
    fn test_next_cursor_skips_separators() {
        let tracker = WordBoundaryTracker::new();
        let span = tracker.next_word("Hello, world!", 0).unwrap();
        assert_eq!(span.next, 7);
        let span = tracker.next_word("Hello, world!", 7).unwrap();
        assert_eq!(span.next, 13);
        assert!(tracker.next_word("Hello, world!", 13).is_none());
    }

    #[test]
    fn test_leading_separators() {
        assert_eq!(pairs("  -- hi there"), vec![(5, 2), (8, 5)]);
    }

    #[test]
    fn test_no_words() {
        assert!(pairs("?! ...").is_empty());
        assert!(pairs("").is_empty());
    }

    #[test]
    fn test_single_word_without_separator() {
        assert_eq!(pairs("word"), vec![(0, 4)]);
    }

    #[test]
    fn test_unicode_offsets_are_bytes() {
        // "café" is 5 bytes
        assert_eq!(pairs("café au lait"), vec![(0, 5), (6, 2), (9, 4)]);
    }

    #[test]
    fn test_cursor_inside_char_is_rejected() {
        let tracker = WordBoundaryTracker::new();
        assert!(tracker.next_word("é", 1).is_none());
    }
}
