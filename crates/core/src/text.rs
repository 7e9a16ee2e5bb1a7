/// Truncate a string to `max_len` bytes, appending "..." if truncated.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len.saturating_sub(3);
        // Don't split in the middle of a multi-byte char
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Collapse all whitespace runs (newlines included) into single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First non-empty line of `s`, trimmed.
pub fn first_line(s: &str) -> Option<&str> {
    s.lines().map(str::trim).find(|line| !line.is_empty())
}

/// One-line preview of free text for titles and summaries.
pub fn preview(s: &str, max_len: usize) -> String {
    truncate_str(&collapse_whitespace(s), max_len)
}

/// Truncate to `max_len` bytes, cutting back to a char boundary. No ellipsis.
pub fn prefix_window(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_short() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_str_exact() {
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_str_long() {
        assert_eq!(truncate_str("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_str_multibyte_boundary() {
        let out = truncate_str("héllo wörld", 6);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 6);
    }

    #[test]
    fn test_preview_collapses_newlines() {
        assert_eq!(preview("  step one\n\n step   two ", 80), "step one step two");
    }

    #[test]
    fn test_first_line_skips_blank_lines() {
        assert_eq!(first_line("\n  \n  title here \nbody"), Some("title here"));
        assert_eq!(first_line("   "), None);
    }

    #[test]
    fn test_prefix_window_respects_char_boundary() {
        assert_eq!(prefix_window("abc", 10), "abc");
        assert_eq!(prefix_window("aé", 2), "a");
    }
}
