//! C5: MIME composer (§4.5).
//!
//! Builds the full `DATA` payload — headers, parts, and the terminating
//! `.` line — as a single CRLF-delimited ASCII string. The transaction
//! engine sends this payload verbatim; it does not append the
//! end-of-message marker itself.

use base64ct::{Base64, Encoding};
use rand::RngCore;

use crate::attachment::LoadedAttachment;
use crate::message::MailRequest;
use crate::sanitize::sanitize_header_value;

/// Generates a boundary token: `"----"` followed by 32 hex characters
/// drawn from a cryptographic RNG (§4.5).
pub fn generate_boundary() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("----{hex}")
}

/// Generates the local delivery telemetry id: 16 random bytes, hex
/// encoded (§4.9 point 7). This is never emitted as a `Message-Id`
/// header — it is local bookkeeping only.
pub fn generate_message_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Renders `request`'s text/html/attachment parts plus headers into the
/// full DATA payload, given already-loaded attachments and a boundary.
pub fn compose(request: &MailRequest, from: &str, attachments: &[LoadedAttachment]) -> String {
    let boundary = generate_boundary();
    compose_with_boundary(request, from, attachments, &boundary)
}

fn compose_with_boundary(
    request: &MailRequest,
    from: &str,
    attachments: &[LoadedAttachment],
    boundary: &str,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("MIME-Version: 1.0".to_string());
    lines.push(format!("From: {}", sanitize_header_value(from)));
    lines.push(format!(
        "To: {}",
        sanitize_header_value(&request.to.join(", "))
    ));
    if !request.cc.is_empty() {
        lines.push(format!(
            "Cc: {}",
            sanitize_header_value(&request.cc.join(", "))
        ));
    }
    lines.push(format!(
        "Subject: {}",
        sanitize_header_value(&request.subject)
    ));
    lines.push(format!(
        "Content-Type: multipart/mixed; boundary=\"{boundary}\""
    ));
    lines.push(String::new());

    if let Some(text) = &request.text {
        lines.push(format!("--{boundary}"));
        lines.push("Content-Type: text/plain; charset=utf-8".to_string());
        lines.push(String::new());
        lines.push(text.clone());
        lines.push(String::new());
    }

    if let Some(html) = &request.html {
        lines.push(format!("--{boundary}"));
        lines.push("Content-Type: text/html; charset=utf-8".to_string());
        lines.push(String::new());
        lines.push(html.clone());
        lines.push(String::new());
    }

    for attachment in attachments {
        lines.push(format!("--{boundary}"));
        lines.push(format!("Content-Type: {}", attachment.content_type));
        lines.push(format!(
            "Content-Disposition: attachment; filename=\"{}\"",
            attachment.filename
        ));
        lines.push("Content-Transfer-Encoding: base64".to_string());
        lines.push(String::new());
        lines.push(Base64::encode_string(&attachment.bytes));
        lines.push(String::new());
    }

    lines.push(format!("--{boundary}--"));
    lines.push(".".to_string());

    let mut payload = lines.join("\r\n");
    payload.push_str("\r\n");
    payload
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attachment::LoadedAttachment;

    #[test]
    fn boundary_has_expected_shape() {
        let boundary = generate_boundary();
        assert!(boundary.starts_with("----"));
        assert_eq!(boundary.len(), 4 + 32);
        assert!(boundary[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn message_id_is_32_hex_chars() {
        let id = generate_message_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn composes_text_and_html_parts() {
        let request = MailRequest::new("to@example.com", "Hi")
            .text("hello")
            .html("<b>hello</b>");
        let payload = compose_with_boundary(&request, "from@example.com", &[], "BOUNDARY");

        assert!(payload.starts_with("MIME-Version: 1.0\r\n"));
        assert!(payload.contains("From: from@example.com\r\n"));
        assert!(payload.contains("To: to@example.com\r\n"));
        assert!(payload.contains("Subject: Hi\r\n"));
        assert!(payload.contains("Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n"));
        assert!(payload.contains("--BOUNDARY\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nhello\r\n"));
        assert!(payload.contains("--BOUNDARY\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<b>hello</b>\r\n"));
        assert!(payload.ends_with("--BOUNDARY--\r\n.\r\n"));
    }

    #[test]
    fn omits_cc_header_when_absent() {
        let request = MailRequest::new("to@example.com", "Hi").text("hi");
        let payload = compose_with_boundary(&request, "from@example.com", &[], "BOUNDARY");
        assert!(!payload.contains("Cc:"));
    }

    #[test]
    fn includes_cc_header_when_present() {
        let request = MailRequest::new("to@example.com", "Hi")
            .cc(vec!["cc@example.com".to_string()])
            .text("hi");
        let payload = compose_with_boundary(&request, "from@example.com", &[], "BOUNDARY");
        assert!(payload.contains("Cc: cc@example.com\r\n"));
    }

    #[test]
    fn sanitizes_subject_and_addresses_against_header_injection() {
        let request = MailRequest::new(
            "to@example.com",
            "Hi\r\nBcc: attacker@evil.example",
        )
        .text("hi");
        let payload = compose_with_boundary(&request, "from@example.com", &[], "BOUNDARY");
        assert!(!payload.contains("Bcc: attacker@evil.example"));
        assert!(payload.contains("Subject: HiBcc: attacker@evil.example\r\n"));
    }

    #[test]
    fn encodes_attachment_as_base64_with_headers() {
        let request = MailRequest::new("to@example.com", "Hi").text("hi");
        let attachment = LoadedAttachment {
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: b"hello".to_vec(),
        };
        let payload = compose_with_boundary(&request, "from@example.com", &[attachment], "BOUNDARY");

        assert!(payload.contains("Content-Type: application/pdf\r\n"));
        assert!(payload.contains("Content-Disposition: attachment; filename=\"report.pdf\"\r\n"));
        assert!(payload.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(payload.contains(&Base64::encode_string(b"hello")));
    }
}
