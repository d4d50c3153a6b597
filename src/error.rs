//! The single error boundary every subsystem funnels into.
//!
//! Each subsystem (address validation, attachment loading, the SMTP
//! transaction engine, the rate limiter) raises its own narrow error, but
//! callers of the facade only ever see an [`ErrorRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Coarse classification of a failure, used both for the public
/// [`ErrorRecord`] and to bucket the `errors_by_type` metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionError,
    AuthenticationError,
    RateLimitError,
    ValidationError,
    TimeoutError,
    AttachmentError,
    CommandError,
    UnknownError,
}

impl ErrorKind {
    /// The metric bucket name under `errors_by_type`.
    pub fn metric_key(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "connection",
            ErrorKind::AuthenticationError => "authentication",
            ErrorKind::RateLimitError => "rate_limit",
            ErrorKind::ValidationError => "validation",
            ErrorKind::TimeoutError => "timeout",
            ErrorKind::AttachmentError => "attachment",
            ErrorKind::CommandError => "command",
            ErrorKind::UnknownError => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_key())
    }
}

/// Extra context attached to an [`ErrorRecord`], matching §3's
/// `details` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_response: Option<String>,
}

impl ErrorDetails {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: BTreeMap::new(),
            timestamp: Utc::now(),
            attempt_number: None,
            socket_state: None,
            last_command: None,
            server_response: None,
        }
    }

    pub fn with_last_command(mut self, command: impl Into<String>) -> Self {
        self.last_command = Some(command.into());
        self
    }

    pub fn with_server_response(mut self, response: impl Into<String>) -> Self {
        self.server_response = Some(response.into());
        self
    }

    pub fn with_socket_state(mut self, state: impl Into<String>) -> Self {
        self.socket_state = Some(state.into());
        self
    }
}

/// Error codes, stable strings surfaced to callers and used to key the
/// taxonomy table in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidEmail,
    TimedOut,
    Connection,
    Command,
    RateLimit,
    Attachment,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidEmail => "EINVALIDEMAIL",
            ErrorCode::TimedOut => "ETIMEDOUT",
            ErrorCode::Connection => "ECONNECTION",
            ErrorCode::Command => "ECOMMAND",
            ErrorCode::RateLimit => "ERATELIMIT",
            ErrorCode::Attachment => "EATTACHMENT",
            ErrorCode::Unknown => "EUNKNOWN",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::InvalidEmail => ErrorKind::ValidationError,
            ErrorCode::TimedOut => ErrorKind::TimeoutError,
            ErrorCode::Connection => ErrorKind::ConnectionError,
            ErrorCode::Command => ErrorKind::CommandError,
            ErrorCode::RateLimit => ErrorKind::RateLimitError,
            ErrorCode::Attachment => ErrorKind::AttachmentError,
            ErrorCode::Unknown => ErrorKind::UnknownError,
        }
    }
}

/// The error surfaced to every caller of the facade (§3 `ErrorRecord`).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
    pub details: ErrorDetails,
}

impl ErrorRecord {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            details: ErrorDetails::new(code.kind()),
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        // keep the code-derived kind unless the caller overrides it
        self.details = details;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.details.kind
    }
}

/// Errors raised while resolving/reading an attachment (§4.4), wrapped
/// into [`ErrorRecord`] at the call boundary.
#[derive(Debug, Error)]
pub enum AttachmentLoadError {
    #[error("attachment path escapes the working directory or does not exist: {0}")]
    NotFound(String),
    #[error("failed to read attachment at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("inline attachment content is not valid UTF-8")]
    InvalidUtf8,
}

impl From<AttachmentLoadError> for ErrorRecord {
    fn from(err: AttachmentLoadError) -> Self {
        ErrorRecord::new(ErrorCode::Attachment, err.to_string())
    }
}

/// Errors raised by the SMTP transaction engine (§4.9).
#[derive(Debug, Error)]
pub enum SmtpEngineError {
    #[error("connect to {host}:{port} timed out")]
    ConnectTimeout { host: String, port: u16 },
    #[error("socket error while talking to {host}:{port}: {source}")]
    Io {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server rejected {command} with: {response}")]
    Rejected { command: String, response: String },
    #[error("idle timeout while waiting for a reply to {command}")]
    IdleTimeout { command: String },
    #[error("malformed reply from server while waiting for {command}")]
    MalformedReply { command: String },
}

impl SmtpEngineError {
    pub fn last_command(&self) -> Option<&str> {
        match self {
            SmtpEngineError::Rejected { command, .. }
            | SmtpEngineError::IdleTimeout { command }
            | SmtpEngineError::MalformedReply { command } => Some(command),
            _ => None,
        }
    }

    pub fn into_error_record(self) -> ErrorRecord {
        match self {
            SmtpEngineError::ConnectTimeout { host, port } => {
                let mut details = ErrorDetails::new(ErrorKind::TimeoutError);
                details
                    .context
                    .insert("host".into(), Value::String(host.clone()));
                details
                    .context
                    .insert("port".into(), Value::Number(port.into()));
                ErrorRecord::new(
                    ErrorCode::TimedOut,
                    format!("connection to {host}:{port} timed out"),
                )
                .with_details(details)
            }
            SmtpEngineError::Io { host, port, source } => {
                let mut details = ErrorDetails::new(ErrorKind::ConnectionError);
                details
                    .context
                    .insert("host".into(), Value::String(host.clone()));
                details
                    .context
                    .insert("port".into(), Value::Number(port.into()));
                details.socket_state = Some("closed".into());
                ErrorRecord::new(
                    ErrorCode::Connection,
                    format!("socket error talking to {host}:{port}: {source}"),
                )
                .with_details(details)
            }
            SmtpEngineError::Tls { host, source } => {
                let mut details = ErrorDetails::new(ErrorKind::ConnectionError);
                details
                    .context
                    .insert("host".into(), Value::String(host.clone()));
                ErrorRecord::new(
                    ErrorCode::Connection,
                    format!("TLS handshake with {host} failed: {source}"),
                )
                .with_details(details)
            }
            SmtpEngineError::Rejected { command, response } => {
                // AUTH LOGIN and its two credential-line follow-ups are
                // rejections of authentication, not of a generic
                // command — classify them under `authentication_error`
                // (§3, §4.9) even though the wire-level code stays
                // `ECOMMAND` (no dedicated authentication code exists
                // in the code table, §7).
                let kind = if command.starts_with("AUTH") {
                    ErrorKind::AuthenticationError
                } else {
                    ErrorKind::CommandError
                };
                let details = ErrorDetails::new(kind)
                    .with_last_command(command.clone())
                    .with_server_response(response.clone());
                ErrorRecord::new(
                    ErrorCode::Command,
                    format!("server rejected {command}: {response}"),
                )
                .with_details(details)
            }
            SmtpEngineError::IdleTimeout { command } => {
                let details =
                    ErrorDetails::new(ErrorKind::TimeoutError).with_last_command(command.clone());
                ErrorRecord::new(
                    ErrorCode::TimedOut,
                    format!("idle timeout waiting for a reply to {command}"),
                )
                .with_details(details)
            }
            SmtpEngineError::MalformedReply { command } => {
                let details =
                    ErrorDetails::new(ErrorKind::CommandError).with_last_command(command.clone());
                ErrorRecord::new(
                    ErrorCode::Command,
                    format!("malformed reply while waiting for {command}"),
                )
                .with_details(details)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn auth_rejection_classifies_as_authentication_error() {
        let error = SmtpEngineError::Rejected {
            command: "AUTH LOGIN (password)".to_string(),
            response: "535 authentication failed".to_string(),
        }
        .into_error_record();
        assert_eq!(error.code, "ECOMMAND");
        assert_eq!(error.kind(), ErrorKind::AuthenticationError);
    }

    #[test]
    fn non_auth_rejection_classifies_as_command_error() {
        let error = SmtpEngineError::Rejected {
            command: "RCPT TO".to_string(),
            response: "550 no such user".to_string(),
        }
        .into_error_record();
        assert_eq!(error.kind(), ErrorKind::CommandError);
    }
}
