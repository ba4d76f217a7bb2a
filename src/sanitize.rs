/// Cuts `text` to at most `max_chars` Unicode scalar values.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Replaces HTML-significant characters with numeric character references.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&#38;"),
            '<' => escaped.push_str("&#60;"),
            '>' => escaped.push_str("&#62;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            '`' => escaped.push_str("&#96;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Produces the text that gets stored: truncated, escaped, trimmed.
///
/// The raw text is cut to `max_chars` first, and the stored form must fit
/// the same limit after escaping. Returns `None` when nothing but
/// whitespace is left or when escaping pushed the text over the limit.
pub fn sanitize_message(text: &str, max_chars: usize) -> Option<String> {
    let escaped = escape_html(truncate_chars(text, max_chars));
    let trimmed = escaped.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max_chars {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_tag_is_escaped() {
        assert_eq!(
            sanitize_message("<script>x</script>", 1000).unwrap(),
            "&#60;script&#62;x&#60;/script&#62;"
        );
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(
            sanitize_message("hello, world", 1000).unwrap(),
            "hello, world"
        );
    }

    #[test]
    fn test_all_special_characters() {
        assert_eq!(escape_html(r#"&<>"'`"#), "&#38;&#60;&#62;&#34;&#39;&#96;");
    }

    #[test]
    fn test_long_text_is_truncated() {
        let text = "a".repeat(1050);
        assert_eq!(sanitize_message(&text, 1000).unwrap().chars().count(), 1000);
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let text = "é".repeat(1050);
        let sanitized = sanitize_message(&text, 1000).unwrap();
        assert_eq!(sanitized.chars().count(), 1000);
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[test]
    fn test_escaped_text_over_limit_is_rejected() {
        assert!(sanitize_message(&"<".repeat(1000), 1000).is_none());
        assert!(sanitize_message(&"<".repeat(200), 1000).is_some());
        // 200 escapes of five characters each land exactly on the limit
        assert_eq!(sanitize_message(&"&".repeat(200), 1000).unwrap().chars().count(), 1000);
        assert!(sanitize_message(&"&".repeat(201), 1000).is_none());
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(sanitize_message("  hi \n", 1000).unwrap(), "hi");
    }

    #[test]
    fn test_blank_message_is_rejected() {
        assert!(sanitize_message("", 1000).is_none());
        assert!(sanitize_message(" \t\n ", 1000).is_none());
    }
}
