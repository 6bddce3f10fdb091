use serde::{Deserialize, Serialize};
use thiserror::Error;
use super::types::UploadId;

#[derive(Error, Debug)]
pub enum UploadError {
    /// Fatal validation failure, no network activity happened
    #[error("{0}")]
    Validation(String),

    #[error("Network error occurred during upload")]
    Network(#[source] reqwest::Error),

    #[error("Upload timed out")]
    Timeout,

    #[error("{message}")]
    Server {
        status: u16,
        message: String,
    },

    #[error("Invalid response format")]
    InvalidResponse,

    /// Failure reported back by the executor, already classified there
    #[error("{message}")]
    Remote {
        message: String,
        retryable: bool,
    },

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("An upload is already in progress for {0}")]
    AlreadyInFlight(UploadId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("Executor shut down")]
    ExecutorShutdown,
}

/// Structured tag carried by every failure path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network,
    Timeout,
    Server,
    InvalidResponse,
    Remote,
    Cancelled,
    Conflict,
    InvalidRequest,
    Io,
    Shutdown,
}

/// How failures are tagged retryable / non-retryable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// Classify on [`ErrorKind`]
    #[default]
    Structured,
    /// Classify on the rendered message text, the legacy behaviour
    MessageText,
}

impl UploadError {
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Validation(_) => ErrorKind::Validation,
            UploadError::Network(_) => ErrorKind::Network,
            UploadError::Timeout => ErrorKind::Timeout,
            UploadError::Server { .. } => ErrorKind::Server,
            UploadError::InvalidResponse => ErrorKind::InvalidResponse,
            UploadError::Remote { .. } => ErrorKind::Remote,
            UploadError::Cancelled => ErrorKind::Cancelled,
            UploadError::AlreadyInFlight(_) => ErrorKind::Conflict,
            UploadError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            UploadError::Io(_) => ErrorKind::Io,
            UploadError::ExecutorShutdown => ErrorKind::Shutdown,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    pub fn is_retryable(&self) -> bool {
        self.is_retryable_with(ClassificationMode::Structured)
    }

    pub fn is_retryable_with(&self, mode: ClassificationMode) -> bool {
        match mode {
            ClassificationMode::Structured => match self {
                // backend re-validated the payload and refused it
                UploadError::Server { status, message } => {
                    let rejected = matches!(status, 413 | 415) || looks_like_validation_rejection(message);
                    !rejected
                }
                UploadError::Remote { retryable, .. } => *retryable,
                other => matches!(
                    other.kind(),
                    ErrorKind::Network
                        | ErrorKind::Timeout
                        | ErrorKind::InvalidResponse
                        | ErrorKind::Io
                        | ErrorKind::Shutdown
                ),
            },
            ClassificationMode::MessageText => {
                !matches!(self.kind(), ErrorKind::Cancelled | ErrorKind::Conflict)
                    && !looks_like_validation_rejection(&self.to_string())
            }
        }
    }
}

/// Substring match for size / type / emptiness rejections.
pub fn looks_like_validation_rejection(message: &str) -> bool {
    let message = message.to_lowercase();
    ["size", "type", "empty", "too large"]
        .iter()
        .any(|needle| message.contains(needle))
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout
        } else if err.is_decode() {
            UploadError::InvalidResponse
        } else {
            UploadError::Network(err)
        }
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_classification() {
        assert!(!UploadError::Validation("File is empty".into()).is_retryable());
        assert!(!UploadError::Cancelled.is_retryable());
        assert!(!UploadError::AlreadyInFlight(UploadId::from("a")).is_retryable());
        assert!(UploadError::Timeout.is_retryable());
        assert!(UploadError::InvalidResponse.is_retryable());
        assert!(UploadError::server_error(500, "disk full").is_retryable());
        assert!(UploadError::server_error(503, "Upload failed with status 503").is_retryable());
        assert!(!UploadError::Remote { message: "boom".into(), retryable: false }.is_retryable());
    }

    #[test]
    fn test_server_rejections_are_not_retryable() {
        assert!(!UploadError::server_error(413, "request entity too large").is_retryable());
        assert!(!UploadError::server_error(415, "nope").is_retryable());
        assert!(!UploadError::server_error(400, "File size exceeds limit").is_retryable());
        assert!(!UploadError::server_error(500, "File size exceeds server limit").is_retryable());
        assert!(!UploadError::server_error(502, "Unsupported media type").is_retryable());
    }

    #[test]
    fn test_message_text_classification() {
        let mode = ClassificationMode::MessageText;
        assert!(!UploadError::Validation("Unsupported file type: text/html".into()).is_retryable_with(mode));
        assert!(!UploadError::Cancelled.is_retryable_with(mode));
        assert!(UploadError::Timeout.is_retryable_with(mode));
        assert!(UploadError::server_error(500, "disk full").is_retryable_with(mode));
        assert!(!UploadError::server_error(500, "File size exceeds server limit").is_retryable_with(mode));
        assert!(!UploadError::AlreadyInFlight(UploadId::from("a")).is_retryable_with(mode));
        // both modes agree on server rejections, they differ on locally raised kinds
        assert!(!UploadError::invalid_request("bad endpoint").is_retryable());
        assert!(UploadError::invalid_request("bad endpoint").is_retryable_with(mode));
    }

    #[test]
    fn test_validation_rejection_matcher() {
        assert!(looks_like_validation_rejection("File SIZE exceeds maximum"));
        assert!(looks_like_validation_rejection("Payload too large"));
        assert!(looks_like_validation_rejection("File is empty"));
        assert!(!looks_like_validation_rejection("disk full"));
    }
}
