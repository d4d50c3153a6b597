//! C1: syntactic, RFC-shaped email address validation (§4.1).
//!
//! No DNS or MX lookups are performed — this is a pure string check, by
//! design (§4.1: "No DNS or MX check").

use crate::error::{ErrorCode, ErrorRecord};

fn is_local_part_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(c)
}

fn local_part_label_valid(label: &str) -> bool {
    let mut chars = label.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    if label.len() == 1 {
        return true;
    }
    let last = label.chars().next_back().unwrap();
    if !last.is_ascii_alphanumeric() {
        return false;
    }
    label.chars().all(is_local_part_char)
}

fn domain_label_valid(label: &str) -> bool {
    let mut chars = label.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    if label.len() == 1 {
        return true;
    }
    let last = label.chars().next_back().unwrap();
    if !last.is_ascii_alphanumeric() {
        return false;
    }
    label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Returns `true` iff `address` satisfies the shape described in §4.1 and
/// §8 invariant 5.
pub fn is_valid_email(address: &str) -> bool {
    if address.is_empty() {
        return false;
    }
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    if address.contains("..") || address.contains("@@") {
        return false;
    }

    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') {
        return false;
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    // a second '@' would already have tripped `@@`, but a bare extra '@'
    // without doubling (e.g. "a@b@c.d") must also be rejected.
    if domain.contains('@') {
        return false;
    }

    if !local.split('.').all(local_part_label_valid) {
        return false;
    }

    if !domain.contains('.') {
        return false;
    }
    if !domain.split('.').all(domain_label_valid) {
        return false;
    }

    true
}

/// Validates `address`, returning an [`ErrorRecord`] with code
/// `EINVALIDEMAIL` on rejection.
pub fn validate(address: &str) -> Result<(), ErrorRecord> {
    if is_valid_email(address) {
        Ok(())
    } else {
        Err(ErrorRecord::new(
            ErrorCode::InvalidEmail,
            format!("invalid email address: {address}"),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_known_bad_addresses() {
        for bad in [
            "",
            "a b@c.d",
            "a..b@c.d",
            ".a@c.d",
            "a.@c.d",
            "a@@c.d",
            "notanemail",
        ] {
            assert!(!is_valid_email(bad), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn accepts_known_good_addresses() {
        for good in ["a@b.co", "a.b@c.d.e", "a+b@c.d"] {
            assert!(is_valid_email(good), "expected {good:?} to be accepted");
        }
    }

    #[test]
    fn validate_returns_structured_error() {
        let err = validate("notanemail").unwrap_err();
        assert_eq!(err.code, "EINVALIDEMAIL");
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationError);
    }

    #[test]
    fn rejects_bare_extra_at() {
        assert!(!is_valid_email("a@b@c.d"));
    }
}
