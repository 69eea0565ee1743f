//! Materialises the leaves of a message body into its folder.
use crate::errors::{AppError, AppResult};
use crate::gmail::MailSource;
use crate::naming::MailFolder;
use crate::types::{decode_body_data, LeafPart, MimePart, PartBody};
use humansize::{format_size, BINARY};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub html_written: usize,
    pub attachments_written: usize,
    pub text_parts: usize,
    pub skipped: usize,
    pub failures: usize,
    pub written: Vec<PathBuf>,
}

impl ExtractReport {
    pub fn files_written(&self) -> usize {
        self.written.len()
    }
}

pub struct PartExtractor<'a> {
    source: &'a dyn MailSource,
    attachment_retries: u32,
    retry_delay: Duration,
}

impl<'a> PartExtractor<'a> {
    pub fn new(source: &'a dyn MailSource, attachment_retries: u32) -> Self {
        Self {
            source,
            attachment_retries,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Walk `parts` in pre-order and write every leaf worth keeping.
    ///
    /// Never fails as a whole: per-part problems are logged and counted.
    pub async fn extract(
        &self,
        message_id: &str,
        parts: &[MimePart],
        folder: &MailFolder,
    ) -> ExtractReport {
        let mut report = ExtractReport::default();
        if parts.is_empty() {
            debug!(message_id = %message_id, "No parts found in message");
            return report;
        }

        let mut stack: Vec<&MimePart> = parts.iter().rev().collect();
        while let Some(part) = stack.pop() {
            match part {
                MimePart::Container { children, .. } => stack.extend(children.iter().rev()),
                MimePart::Leaf(leaf) => self.handle_leaf(message_id, leaf, folder, &mut report).await,
            }
        }

        report
    }

    async fn handle_leaf(
        &self,
        message_id: &str,
        leaf: &LeafPart,
        folder: &MailFolder,
        report: &mut ExtractReport,
    ) {
        let mime = leaf.mime_type.to_ascii_lowercase();

        if mime == "text/plain" {
            match &leaf.body {
                PartBody::Inline(data) => match decode_body_data(data) {
                    Ok(bytes) => {
                        report.text_parts += 1;
                        debug!(
                            message_id = %message_id,
                            text = %String::from_utf8_lossy(&bytes),
                            "Plain text body"
                        );
                    }
                    Err(e) => {
                        report.failures += 1;
                        warn!(message_id = %message_id, error = %e, "Undecodable plain text part");
                    }
                },
                _ => report.skipped += 1,
            }
            return;
        }

        if mime == "text/html" {
            let data = match (&leaf.body, &leaf.filename) {
                (PartBody::Inline(data), None) if report.html_written == 0 => data,
                _ => {
                    report.skipped += 1;
                    debug!(message_id = %message_id, filename = ?leaf.filename, "Skipping HTML part");
                    return;
                }
            };
            let path = folder.path.join(folder.html_filename());
            match decode_body_data(data).and_then(|bytes| write_file(&path, &bytes)) {
                Ok(()) => {
                    info!(message_id = %message_id, path = %path.display(), "Saved HTML body");
                    report.html_written += 1;
                    report.written.push(path);
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(message_id = %message_id, error = %e, "Writing HTML body failed");
                }
            }
            return;
        }

        if !leaf.is_attachment() {
            report.skipped += 1;
            debug!(message_id = %message_id, mime_type = %leaf.mime_type, "Skipping non-attachment part");
            return;
        }

        let Some(filename) = leaf.filename.as_deref().and_then(safe_filename) else {
            report.skipped += 1;
            let err = AppError::MissingFilename {
                message_id: message_id.to_string(),
                mime_type: leaf.mime_type.clone(),
            };
            warn!(error = %err, "Attachment skipped");
            return;
        };

        info!(
            message_id = %message_id,
            filename = %filename,
            size = %format_size(leaf.size, BINARY),
            "Attachment"
        );

        let bytes = match &leaf.body {
            PartBody::Inline(data) => decode_body_data(data),
            PartBody::Remote { attachment_id } => self.fetch_attachment(message_id, attachment_id).await,
            PartBody::Empty => {
                report.skipped += 1;
                debug!(message_id = %message_id, filename = %filename, "Attachment has no body");
                return;
            }
        };

        match bytes.and_then(|bytes| write_attachment(folder, filename, &bytes)) {
            Ok(path) => {
                if path.file_name().and_then(|n| n.to_str()) != Some(filename) {
                    info!(
                        message_id = %message_id,
                        filename = %filename,
                        path = %path.display(),
                        "Attachment name taken; saved under a new name"
                    );
                }
                report.attachments_written += 1;
                report.written.push(path);
            }
            Err(e) => {
                report.failures += 1;
                warn!(message_id = %message_id, filename = %filename, error = %e, "Saving attachment failed");
            }
        }
    }

    async fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> AppResult<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.source.get_attachment(message_id, attachment_id).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.attachment_retries => {
                    attempt += 1;
                    warn!(
                        message_id = %message_id,
                        attempt,
                        error = %e,
                        "Attachment fetch failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Final path component of an attachment name, or `None` if nothing usable
/// remains.
pub fn safe_filename(raw: &str) -> Option<&str> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> AppResult<()> {
    fs::write(path, bytes).map_err(|e| AppError::io(path, e))
}

/// Write an attachment without replacing anything already in the folder.
///
/// Taken names become `stem_N.ext`. The HTML body name is never handed out,
/// even before the body itself has been written.
fn write_attachment(folder: &MailFolder, filename: &str, bytes: &[u8]) -> AppResult<PathBuf> {
    let reserved = folder.html_filename();
    let original = Path::new(filename);
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let ext = original.extension().and_then(|e| e.to_str());

    let mut counter: u32 = 0;
    loop {
        let name = match (counter, ext) {
            (0, _) => filename.to_string(),
            (n, Some(ext)) => format!("{stem}_{n}.{ext}"),
            (n, None) => format!("{stem}_{n}"),
        };
        counter += 1;
        if name == reserved {
            continue;
        }

        let path = folder.path.join(&name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(bytes).map_err(|e| AppError::io(&path, e))?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(AppError::io(path, e)),
        }
    }
}
