#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

use mailsift::errors::{AppError, AppResult};
use mailsift::gmail::MailSource;
use mailsift::types::{FullMessage, Header, LeafPart, MessageRef, MimePart, PartBody};

pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

pub fn plain(text: &str) -> MimePart {
    MimePart::Leaf(LeafPart {
        mime_type: "text/plain".into(),
        filename: None,
        body: PartBody::Inline(encode(text.as_bytes())),
        size: text.len() as u64,
        headers: vec![Header::new("Content-Type", "text/plain; charset=UTF-8")],
    })
}

pub fn html(body: &str) -> MimePart {
    MimePart::Leaf(LeafPart {
        mime_type: "text/html".into(),
        filename: None,
        body: PartBody::Inline(encode(body.as_bytes())),
        size: body.len() as u64,
        headers: vec![Header::new("Content-Type", "text/html; charset=UTF-8")],
    })
}

fn attachment_headers(filename: &str) -> Vec<Header> {
    vec![
        Header::new("Content-Type", "application/pdf"),
        Header::new(
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        ),
    ]
}

pub fn inline_attachment(filename: &str, bytes: &[u8]) -> MimePart {
    MimePart::Leaf(LeafPart {
        mime_type: "application/pdf".into(),
        filename: Some(filename.into()),
        body: PartBody::Inline(encode(bytes)),
        size: bytes.len() as u64,
        headers: attachment_headers(filename),
    })
}

pub fn remote_attachment(filename: &str, attachment_id: &str, size: u64) -> MimePart {
    MimePart::Leaf(LeafPart {
        mime_type: "application/pdf".into(),
        filename: Some(filename.into()),
        body: PartBody::Remote {
            attachment_id: attachment_id.into(),
        },
        size,
        headers: attachment_headers(filename),
    })
}

pub fn container(mime_type: &str, children: Vec<MimePart>) -> MimePart {
    MimePart::Container {
        mime_type: mime_type.into(),
        children,
    }
}

pub fn message(id: &str, subject: Option<&str>, parts: Vec<MimePart>) -> FullMessage {
    let mut headers = vec![
        Header::new("From", "alerts@example.test"),
        Header::new("To", "me@example.test"),
        Header::new("Date", "Mon, 19 Oct 2026 08:00:00 +0000"),
    ];
    if let Some(subject) = subject {
        headers.push(Header::new("Subject", subject));
    }
    FullMessage {
        id: id.into(),
        headers,
        parts,
    }
}

/// Scripted mailbox. Messages are returned by `search` in insertion order.
#[derive(Default)]
pub struct FakeMailbox {
    order: Vec<String>,
    messages: HashMap<String, FullMessage>,
    attachments: HashMap<(String, String), Vec<u8>>,
    broken: HashSet<String>,
    transient_failures: AtomicU32,
    attachment_status: Option<u16>,
    pub attachment_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, msg: FullMessage) -> Self {
        self.order.push(msg.id.clone());
        self.messages.insert(msg.id.clone(), msg);
        self
    }

    /// Listed by search, but fetching it fails.
    pub fn with_broken_message(mut self, id: &str) -> Self {
        self.order.push(id.to_string());
        self.broken.insert(id.to_string());
        self
    }

    pub fn with_attachment(mut self, message_id: &str, attachment_id: &str, bytes: &[u8]) -> Self {
        self.attachments.insert(
            (message_id.to_string(), attachment_id.to_string()),
            bytes.to_vec(),
        );
        self
    }

    /// The next `n` attachment calls fail with a network error.
    pub fn failing_attachments(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Every attachment call fails with this HTTP status.
    pub fn attachment_status(mut self, status: u16) -> Self {
        self.attachment_status = Some(status);
        self
    }

    pub fn attachment_calls(&self) -> usize {
        self.attachment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSource for FakeMailbox {
    async fn search(&self, _query: &str) -> AppResult<Vec<MessageRef>> {
        Ok(self.order.iter().map(MessageRef::new).collect())
    }

    async fn get_full_message(&self, id: &str) -> AppResult<FullMessage> {
        if self.broken.contains(id) {
            return Err(AppError::Network(format!("connection reset fetching {id}")));
        }
        self.messages.get(id).cloned().ok_or_else(|| AppError::Api {
            status: 404,
            message: format!("no message {id}"),
        })
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> AppResult<Vec<u8>> {
        self.attachment_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Network("timed out".into()));
        }
        if let Some(status) = self.attachment_status {
            return Err(AppError::Api {
                status,
                message: "scripted failure".into(),
            });
        }
        self.attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| AppError::Api {
                status: 404,
                message: format!("no attachment {attachment_id}"),
            })
    }
}

pub fn folder_names(root: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
