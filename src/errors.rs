use std::path::PathBuf;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Mail API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Attachment part ({mime_type}) of message {message_id} has no filename")]
    MissingFilename {
        message_id: String,
        mime_type: String,
    },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry of the same remote call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Network(_) => true,
            AppError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
