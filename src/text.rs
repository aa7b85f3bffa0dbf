//! Small string helpers shared by logging and error rendering.

/// Truncate a string to at most `max_bytes` without splitting a UTF-8 char.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    // Walk backward to find a valid char boundary
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `truncate_utf8` plus a `...` marker when anything was cut.
pub(crate) fn preview(s: &str, max_bytes: usize) -> String {
    if s.len() > max_bytes {
        format!("{}...", truncate_utf8(s, max_bytes))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("hello", 10), "hello");
    }

    #[test]
    fn test_preview_marks_truncation() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }
}
