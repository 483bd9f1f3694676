//! Shared utilities

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// The part of `current` not yet printed, given that `printed` chars were.
/// Returns `None` when there is nothing new.
pub fn unprinted_suffix(current: &str, printed: usize) -> Option<&str> {
    let (offset, _) = current.char_indices().nth(printed)?;
    Some(&current[offset..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語...");
    }

    #[test]
    fn test_unprinted_suffix() {
        assert_eq!(unprinted_suffix("Hello", 2), Some("llo"));
        assert_eq!(unprinted_suffix("Hello", 5), None);
        assert_eq!(unprinted_suffix("", 0), None);
        assert_eq!(unprinted_suffix("日本語", 1), Some("本語"));
    }
}
