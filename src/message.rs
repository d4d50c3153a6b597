//! Public request/response shapes (§3 `MailRequest`, `Attachment`,
//! `SendResult`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ErrorRecord;

/// One or many recipient addresses, matching §3's `to: string | [string]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            Recipients::One(addr) => vec![addr.clone()],
            Recipients::Many(addrs) => addrs.clone(),
        }
    }
}

impl From<&str> for Recipients {
    fn from(value: &str) -> Self {
        Recipients::One(value.to_string())
    }
}

impl From<String> for Recipients {
    fn from(value: String) -> Self {
        Recipients::One(value)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(value: Vec<String>) -> Self {
        Recipients::Many(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// The content source for an [`Attachment`] (§3).
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    Path(String),
    Content(Vec<u8>),
}

/// An attachment as supplied by the caller, before loading (§3, §4.4).
#[derive(Debug, Clone)]
pub struct Attachment {
    pub source: AttachmentSource,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            source: AttachmentSource::Path(path.into()),
            filename: None,
            content_type: None,
        }
    }

    pub fn from_bytes(content: Vec<u8>) -> Self {
        Self {
            source: AttachmentSource::Content(content),
            filename: None,
            content_type: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A request to send one message (§3 `MailRequest`).
#[derive(Debug, Clone, Default)]
pub struct MailRequest {
    pub to: Vec<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub priority: Option<Priority>,
    /// Reserved — accepted but not consulted (§3).
    pub headers: HashMap<String, String>,
}

impl MailRequest {
    pub fn new(to: impl Into<Recipients>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into().as_vec(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn cc(mut self, cc: impl Into<Recipients>) -> Self {
        self.cc = cc.into().as_vec();
        self
    }

    pub fn bcc(mut self, bcc: impl Into<Recipients>) -> Self {
        self.bcc = bcc.into().as_vec();
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// All recipients in input order: To, then Cc, then Bcc (§4.6, §5).
    pub fn all_recipients(&self) -> Vec<String> {
        let mut all = Vec::with_capacity(self.to.len() + self.cc.len() + self.bcc.len());
        all.extend(self.to.iter().cloned());
        all.extend(self.cc.iter().cloned());
        all.extend(self.bcc.iter().cloned());
        all
    }
}

/// The outcome of a `sendMail` call (§3 `SendResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    pub recipients: String,
    pub timestamp: DateTime<Utc>,
}
