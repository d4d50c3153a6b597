//! C3: header injection defense (§4.3).
//!
//! Strips `{CR, LF, TAB, VT, FF}` from header values derived from user
//! input. Quotes are not escaped and non-ASCII is not encoded — headers
//! are emitted verbatim after stripping, exactly as specified.

/// Removes CR, LF, TAB, VT, and FF from `value`.
pub fn sanitize_header_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\t' | '\u{0B}' | '\u{0C}'))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let injected = "Subject\r\nBcc: attacker@evil.example";
        let sanitized = sanitize_header_value(injected);
        assert_eq!(sanitized, "SubjectBcc: attacker@evil.example");
        assert!(!sanitized.contains('\r'));
        assert!(!sanitized.contains('\n'));
    }

    #[test]
    fn strips_tab_vt_ff() {
        let injected = "a\tb\u{0B}c\u{0C}d";
        assert_eq!(sanitize_header_value(injected), "abcd");
    }

    #[test]
    fn idempotent() {
        let value = "Re: quarterly report\r\nX-Injected: true";
        let once = sanitize_header_value(value);
        let twice = sanitize_header_value(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_clean_values_untouched() {
        let value = "Hello, world! héllo";
        assert_eq!(sanitize_header_value(value), value);
    }
}
