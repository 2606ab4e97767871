//! Output sanitization for sandboxed runs

/// Maximum characters kept from each captured stream
pub const MAX_OUTPUT_CHARS: usize = 10_000;

/// Maximum characters kept from each rendered variable
pub const MAX_VARIABLE_CHARS: usize = 1_000;

/// Appended after a truncated stream or value
pub const TRUNCATION_MARKER: &str = "... (output truncated)";

/// Truncate to `max` characters (not bytes), appending the marker when cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Remove control characters other than newline and tab
pub fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Sanitize a captured stream before it leaves the sandbox
pub fn sanitize_output(text: &str) -> String {
    strip_control(&truncate_chars(text, MAX_OUTPUT_CHARS))
}

/// Sanitize a rendered variable value
pub fn sanitize_variable(text: &str) -> String {
    strip_control(&truncate_chars(text, MAX_VARIABLE_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_unchanged() {
        assert_eq!(sanitize_output("4\n"), "4\n");
    }

    #[test]
    fn test_long_output_truncated_with_marker() {
        let long = "a".repeat(11_000);
        let out = sanitize_output(&long);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), MAX_OUTPUT_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_exact_limit_not_truncated() {
        let exact = "b".repeat(MAX_OUTPUT_CHARS);
        assert_eq!(sanitize_output(&exact), exact);
    }

    #[test]
    fn test_truncation_counts_characters() {
        let accented = "é".repeat(MAX_OUTPUT_CHARS + 5);
        let out = sanitize_output(&accented);
        assert_eq!(
            out.chars().filter(|c| *c == 'é').count(),
            MAX_OUTPUT_CHARS
        );
    }

    #[test]
    fn test_control_characters_stripped() {
        let raw = "ok\u{0}\u{7}\r\x1b[31mred\u{7f}\u{85}\tdone\n";
        assert_eq!(strip_control(raw), "ok[31mred\tdone\n");
    }

    #[test]
    fn test_variable_cap() {
        let out = sanitize_variable(&"9".repeat(5_000));
        assert_eq!(out.chars().count(), MAX_VARIABLE_CHARS + TRUNCATION_MARKER.len());
    }
}
