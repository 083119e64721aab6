//! Length measurement and truncation.
//!
//! Budgets are counted in characters as a cheap stand-in for tokens. Every
//! measurement and cut in the pipeline goes through [`TextMeasure`], so a
//! tokenizer-backed implementation can replace [`CharCount`] without touching
//! assembly order.

/// Measures text and cuts it to a budget.
pub trait TextMeasure: Send + Sync {
    /// Size of `text` in budget units.
    fn measure(&self, text: &str) -> usize;

    /// Longest prefix of `text` whose size is at most `limit`.
    fn truncate<'a>(&self, text: &'a str, limit: usize) -> &'a str;

    /// Longest suffix of `text` whose size is at most `limit`.
    fn truncate_front<'a>(&self, text: &'a str, limit: usize) -> &'a str;

    /// Longest prefix within `limit` that ends on a line boundary.
    ///
    /// The trailing newline of the last kept line is dropped. If not even the
    /// first line fits, the result is empty.
    fn truncate_lines<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        let head = self.truncate(text, limit);
        if head.len() == text.len() || text[head.len()..].starts_with('\n') {
            return head;
        }
        match head.rfind('\n') {
            Some(i) => &head[..i],
            None => "",
        }
    }
}

/// One unit per Unicode scalar value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCount;

impl TextMeasure for CharCount {
    fn measure(&self, text: &str) -> usize {
        text.chars().count()
    }

    fn truncate<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        match text.char_indices().nth(limit) {
            Some((i, _)) => &text[..i],
            None => text,
        }
    }

    fn truncate_front<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        let count = self.measure(text);
        if count <= limit {
            return text;
        }
        match text.char_indices().nth(count - limit) {
            Some((i, _)) => &text[i..],
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(CharCount.measure(""), 0);
        assert_eq!(CharCount.measure("milk"), 4);
        assert_eq!(CharCount.measure("café"), 4);
    }

    #[test]
    fn truncate_keeps_prefix_on_char_boundary() {
        assert_eq!(CharCount.truncate("café au lait", 4), "café");
        assert_eq!(CharCount.truncate("short", 100), "short");
        assert_eq!(CharCount.truncate("abc", 0), "");
    }

    #[test]
    fn truncate_front_keeps_suffix() {
        assert_eq!(CharCount.truncate_front("0123456789", 3), "789");
        assert_eq!(CharCount.truncate_front("né", 1), "é");
        assert_eq!(CharCount.truncate_front("abc", 10), "abc");
        assert_eq!(CharCount.truncate_front("abc", 0), "");
    }

    #[test]
    fn truncate_lines_stops_at_last_full_line() {
        let text = "line one\nline two\nline three";
        assert_eq!(CharCount.truncate_lines(text, 12), "line one");
        // Cut lands exactly before a newline: the line is complete.
        assert_eq!(CharCount.truncate_lines(text, 17), "line one\nline two");
        assert_eq!(CharCount.truncate_lines(text, 100), text);
        assert_eq!(CharCount.truncate_lines(text, 5), "");
    }
}
