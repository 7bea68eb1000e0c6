//! Shared text helpers.

use regex::Regex;
use std::sync::LazyLock;

static JSON_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json[ \t]*\r?\n?(.*?)```").unwrap());

static ANY_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\r?\n?(.*?)```").unwrap());

/// Maximum characters kept by `preview`.
pub const PREVIEW_CHARS: usize = 300;

/// Pull the structured payload out of a model reply.
///
/// Order: first ```` ```json ```` block, then the first fenced block of any
/// kind, then the whole trimmed reply.
pub fn extract_structured_block(text: &str) -> &str {
    if let Some(cap) = JSON_FENCE_REGEX.captures(text).and_then(|c| c.get(1)) {
        return cap.as_str().trim();
    }
    if let Some(cap) = ANY_FENCE_REGEX.captures(text).and_then(|c| c.get(1)) {
        return cap.as_str().trim();
    }
    text.trim()
}

/// Trim, and cut to `PREVIEW_CHARS` characters plus `" …"` when longer.
pub fn preview(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{} …", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_fence_wins() {
        let text = "Reasoning first.\n```\nnot this\n```\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_structured_block(text), "{\"a\": 1}");
    }

    #[test]
    fn test_any_fence_when_no_json_fence() {
        let text = "Here:\n```text\n{\"b\": 2}\n```\ntrailing";
        assert_eq!(extract_structured_block(text), "{\"b\": 2}");
    }

    #[test]
    fn test_whole_text_when_no_fence() {
        assert_eq!(extract_structured_block("  {\"c\": 3}\n"), "{\"c\": 3}");
    }

    #[test]
    fn test_preview_301_chars_is_cut() {
        let input = "x".repeat(301);
        let out = preview(&input);
        assert_eq!(out, format!("{} …", "x".repeat(300)));
    }

    #[test]
    fn test_preview_300_chars_unchanged() {
        let input = format!("  {}\n", "y".repeat(300));
        assert_eq!(preview(&input), "y".repeat(300));
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let input = "调".repeat(300);
        assert_eq!(preview(&input), input);
        let longer = "调".repeat(301);
        assert!(preview(&longer).starts_with(&"调".repeat(300)));
        assert!(preview(&longer).ends_with(" …"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("研究报告", 2), "研究");
    }
}
