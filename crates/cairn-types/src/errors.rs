//! Error taxonomy for record store operations.
//!
//! Input errors and state-machine rejections are surfaced to callers
//! verbatim; internal failures are wrapped with a correlation id so the
//! operator can match a client report against the logs.

use thiserror::Error;

use crate::record::RecordStatus;

/// Result alias for record store operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors surfaced by the record service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The supplied token is not a valid 32-byte hex token.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// What was wrong with the token.
        reason: String,
    },

    /// No record exists for the token on the queried branch.
    #[error("record not found")]
    RecordNotFound,

    /// An update produced a record identical to the stored one.
    #[error("no changes to record")]
    NoChanges,

    /// The requested status change is not in the legal transition table.
    #[error("invalid record status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the record currently holds.
        from: RecordStatus,
        /// Status that was requested.
        to: RecordStatus,
    },

    /// Record content failed verification.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// No referendum exists for the token.
    #[error("referendum not found")]
    ReferendumNotFound,

    /// The referendum's vote period has ended.
    #[error("referendum is closed")]
    ReferendumClosed,

    /// The referendum's vote period has not ended yet.
    #[error("referendum is still active")]
    ReferendumActive,

    /// The identity has already voted in this referendum.
    #[error("identity has already voted")]
    AlreadyVoted,

    /// The service is shutting down and rejects new mutations.
    #[error("record store is shutting down")]
    Shutdown,

    /// Internal failure; details are in the server log under the
    /// correlation id.
    #[error("internal server error, correlation {correlation}")]
    Internal {
        /// Correlation id, derived from the current time.
        correlation: i64,
    },
}

/// Why record content failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    /// The record carries no files.
    NoFiles,

    /// Two files share a name.
    DuplicateFilename,

    /// A filename is empty or contains a path separator.
    InvalidFilename,

    /// A file's MIME type is malformed.
    InvalidMime,

    /// A file's MIME type is not in the configured allow list.
    UnsupportedMime,

    /// A file's payload does not hash to its declared digest.
    InvalidFileDigest,

    /// The record is missing the required index file.
    MissingIndexFile,

    /// The title (first line of the index file) violates policy.
    InvalidTitle,

    /// A file payload exceeds the configured size cap.
    FileSizeExceeded,

    /// The record carries more files than the configured cap.
    FileCountExceeded,

    /// Two metadata streams share an ID.
    DuplicateMetadataId,
}

impl ContentErrorCode {
    /// Stable name for logs and error context.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentErrorCode::NoFiles => "no files",
            ContentErrorCode::DuplicateFilename => "duplicate filename",
            ContentErrorCode::InvalidFilename => "invalid filename",
            ContentErrorCode::InvalidMime => "invalid mime type",
            ContentErrorCode::UnsupportedMime => "unsupported mime type",
            ContentErrorCode::InvalidFileDigest => "invalid file digest",
            ContentErrorCode::MissingIndexFile => "missing index file",
            ContentErrorCode::InvalidTitle => "invalid title",
            ContentErrorCode::FileSizeExceeded => "file size exceeded",
            ContentErrorCode::FileCountExceeded => "file count exceeded",
            ContentErrorCode::DuplicateMetadataId => "duplicate metadata id",
        }
    }
}

/// Structured content verification failure: a code plus the offending
/// values (filenames, MIME types, digests) for the caller's error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("content verification failed: {}{}", .code.as_str(), format_context(.context))]
pub struct ContentError {
    /// What class of verification failed.
    pub code: ContentErrorCode,

    /// The offending values, if any.
    pub context: Vec<String>,
}

impl ContentError {
    /// Content error with no context values.
    pub fn new(code: ContentErrorCode) -> Self {
        Self {
            code,
            context: Vec::new(),
        }
    }

    /// Content error naming the offending values.
    pub fn with_context(code: ContentErrorCode, context: Vec<String>) -> Self {
        Self { code, context }
    }
}

fn format_context(context: &[String]) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(": {}", context.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_display() {
        assert_eq!(RecordError::RecordNotFound.to_string(), "record not found");
        assert_eq!(RecordError::NoChanges.to_string(), "no changes to record");
        assert_eq!(
            RecordError::AlreadyVoted.to_string(),
            "identity has already voted"
        );
        assert_eq!(
            RecordError::Shutdown.to_string(),
            "record store is shutting down"
        );
    }

    #[test]
    fn invalid_transition_display() {
        let err = RecordError::InvalidTransition {
            from: RecordStatus::Vetted,
            to: RecordStatus::Censored,
        };
        assert_eq!(
            err.to_string(),
            "invalid record status transition: vetted -> censored"
        );
    }

    #[test]
    fn internal_display_carries_correlation() {
        let err = RecordError::Internal { correlation: 1234 };
        assert_eq!(err.to_string(), "internal server error, correlation 1234");
    }

    #[test]
    fn content_error_display_without_context() {
        let err = ContentError::new(ContentErrorCode::NoFiles);
        assert_eq!(err.to_string(), "content verification failed: no files");
    }

    #[test]
    fn content_error_display_with_context() {
        let err = ContentError::with_context(
            ContentErrorCode::DuplicateFilename,
            vec!["index.md".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "content verification failed: duplicate filename: index.md"
        );
    }

    #[test]
    fn content_error_wraps_into_record_error() {
        let err: RecordError = ContentError::new(ContentErrorCode::MissingIndexFile).into();
        assert_eq!(
            err.to_string(),
            "content verification failed: missing index file"
        );
    }

    #[test]
    fn record_error_equality() {
        assert_eq!(RecordError::NoChanges, RecordError::NoChanges);
        assert_ne!(RecordError::NoChanges, RecordError::RecordNotFound);
    }
}
