//! Errors!

use miette::Diagnostic;
use thiserror::Error;

/// Gotta love a newtyped Result
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// An error from the extraction pipeline
#[derive(Debug, Error, Diagnostic)]
pub enum ArchiveError {
    /// The archive data could not be decoded; wraps whatever the backend
    /// reported
    #[error("archive invalid: {reason}")]
    Invalid {
        /// What went wrong
        reason: String,
        /// The backend's own error, when there is one
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An entry path tried to leave the extraction root
    #[error("archive entry {path:?} escapes the extraction root")]
    UnsafePath {
        /// The offending path, as found in the archive
        path: String,
    },

    /// Plain filesystem or stream failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An external unpacking utility failed to run
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cmd(#[from] axoprocess::AxoprocessError),

    /// The cancellation token fired
    #[error("the operation was canceled")]
    Canceled,

    /// The format needs an OS this is not
    #[error("{format} archives can only be extracted on {os}")]
    PlatformUnsupported {
        /// Archive format that was requested
        format: &'static str,
        /// OS the format's extractor needs
        os: &'static str,
    },

    /// Nothing registered for the MIME type
    #[error("no extractor is registered for {mime_type}")]
    UnknownMimeType {
        /// The MIME type we were asked for
        mime_type: String,
    },

    /// The computed manifest digest disagrees with the expected one
    #[error("manifest digest mismatch: expected {expected}, computed {actual}")]
    #[diagnostic(help("the archive was corrupted in transit, or the feed lists a stale digest"))]
    DigestMismatch {
        /// Digest the caller expected
        expected: String,
        /// Digest computed over the materialized directory
        actual: String,
    },
}

impl ArchiveError {
    /// Shorthand for the [`ArchiveError::Invalid`] kind.
    pub fn invalid(
        reason: impl Into<String>,
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ArchiveError::Invalid {
            reason: reason.into(),
            cause,
        }
    }

    /// The host exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            ArchiveError::Invalid { .. } | ArchiveError::UnsafePath { .. } => 25,
            ArchiveError::Io(_) | ArchiveError::Cmd(_) => 12,
            ArchiveError::Canceled => 100,
            ArchiveError::PlatformUnsupported { .. } | ArchiveError::UnknownMimeType { .. } => 50,
            ArchiveError::DigestMismatch { .. } => 26,
        }
    }
}
