//! Character-budget truncation for block text.

/// Truncates `text` to at most `max_chars` characters (not bytes), always
/// cutting on a character boundary.
///
/// Counting characters rather than bytes keeps the budget meaningful for
/// multi-byte scripts: a ceiling of 60k characters is roughly the same amount
/// of *content* whether the drawings are annotated in English or not.
///
/// # Examples
///
/// ```rust
/// use drawbridge_budget::truncate_chars;
/// assert_eq!(truncate_chars("ventilation", 4), "vent");
/// assert_eq!(truncate_chars("short", 100), "short");
/// ```
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_needed() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn truncates_ascii() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
    }

    #[test]
    fn zero_budget() {
        assert_eq!(truncate_chars("hello", 0), "");
    }

    #[test]
    fn empty_input() {
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn counts_characters_not_bytes() {
        // Cyrillic letters are two bytes each in UTF-8.
        let text = "вентиляция";
        let cut = truncate_chars(text, 4);
        assert_eq!(cut, "вент");
        assert_eq!(cut.chars().count(), 4);
    }

    #[test]
    fn never_splits_a_character() {
        let text = "a✓b✓c";
        for limit in 0..=text.chars().count() {
            // Slicing mid-character would panic; this must not.
            let cut = truncate_chars(text, limit);
            assert!(cut.chars().count() <= limit);
        }
    }
}
