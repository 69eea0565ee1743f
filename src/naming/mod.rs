//! Folder naming for ingested messages.
//!
//! Names are allocated with an exclusive `create_dir`, so two workers racing
//! on the same subject can never both win the same name.
use crate::config::SubjectlessPolicy;
use crate::errors::{AppError, AppResult};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

pub const FALLBACK_FOLDER: &str = "INBOX";

/// Byte budget for a sanitized subject. Leaves room under the usual 255-byte
/// name limit for a `_{counter}` suffix and the `.html` body inside.
pub const MAX_NAME_BYTES: usize = 200;

/// Replace every non-alphanumeric character with `_`, truncated on a char
/// boundary to [`MAX_NAME_BYTES`].
pub fn sanitize_subject(subject: &str) -> String {
    let mut name = String::new();
    for c in subject.chars() {
        let c = if c.is_alphanumeric() { c } else { '_' };
        if name.len() + c.len_utf8() > MAX_NAME_BYTES {
            break;
        }
        name.push(c);
    }
    name
}

/// A folder created for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailFolder {
    pub name: String,
    pub path: PathBuf,
    /// False when an existing shared fallback folder was reused.
    pub created: bool,
}

impl MailFolder {
    /// Filename of the canonical HTML body inside this folder.
    pub fn html_filename(&self) -> String {
        format!("{}.html", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct FolderNamer {
    root: PathBuf,
    subjectless: SubjectlessPolicy,
}

impl FolderNamer {
    pub fn new(root: impl Into<PathBuf>, subjectless: SubjectlessPolicy) -> Self {
        Self {
            root: root.into(),
            subjectless,
        }
    }

    /// Pick a name for a message with the given Subject and create its folder.
    pub fn allocate(&self, subject: Option<&str>) -> AppResult<MailFolder> {
        let base = subject.map(sanitize_subject).filter(|s| !s.is_empty());

        match base {
            Some(base) => self.create_unique(&base),
            None => match self.subjectless {
                SubjectlessPolicy::Unique => self.create_unique(FALLBACK_FOLDER),
                SubjectlessPolicy::Shared => self.open_shared_fallback(),
            },
        }
    }

    fn create_unique(&self, base: &str) -> AppResult<MailFolder> {
        let mut counter: u64 = 0;
        loop {
            let name = if counter == 0 {
                base.to_string()
            } else {
                format!("{base}_{counter}")
            };
            let path = self.root.join(&name);

            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!(folder = %name, "Created mail folder");
                    return Ok(MailFolder {
                        name,
                        path,
                        created: true,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(AppError::io(path, e)),
            }
        }
    }

    fn open_shared_fallback(&self) -> AppResult<MailFolder> {
        let path = self.root.join(FALLBACK_FOLDER);
        let created = match fs::create_dir(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => false,
            Err(e) => return Err(AppError::io(path, e)),
        };
        Ok(MailFolder {
            name: FALLBACK_FOLDER.to_string(),
            path,
            created,
        })
    }
}
