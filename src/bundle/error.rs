//! Error types for the bundle module.
//!
//! Errors are split by where they stop:
//! - [`FetchError`] never leaves a worker; it becomes a [`FailedAttachment`](super::FailedAttachment)
//! - [`ArchiveError`] is fatal to a run that already fetched its data
//! - [`BundleError`] is what [`BulkRetrieval`](super::BulkRetrieval) callers see

use thiserror::Error;

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Errors that can occur while fetching a single attachment.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching attachment {id}: {source}")]
    Network {
        /// Attachment identifier.
        id: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The fetch did not complete within the configured timeout.
    #[error("timeout fetching attachment {id}")]
    Timeout {
        /// Attachment identifier.
        id: String,
    },

    /// The file proxy answered with a non-success status.
    #[error("HTTP {status} fetching attachment {id}")]
    HttpStatus {
        /// Attachment identifier.
        id: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The file proxy rejected the credential.
    #[error("[AUTH] authentication rejected (HTTP {status}) fetching attachment {id}")]
    AuthRequired {
        /// Attachment identifier.
        id: String,
        /// 401 or 403.
        status: u16,
    },

    /// The body exceeded the configured size cap.
    #[error("attachment {id} exceeds the {limit_bytes} byte limit")]
    TooLarge {
        /// Attachment identifier.
        id: String,
        /// Configured cap in bytes.
        limit_bytes: u64,
    },

    /// The response could not be used as attachment bytes.
    #[error("malformed response for attachment {id}: {reason}")]
    Malformed {
        /// Attachment identifier.
        id: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// The run was cancelled before this attachment finished.
    #[error("fetch of attachment {id} was cancelled")]
    Cancelled {
        /// Attachment identifier.
        id: String,
    },

    /// The fetch implementation panicked.
    #[error("fetch of attachment {id} panicked")]
    Panicked {
        /// Attachment identifier.
        id: String,
    },

    /// The id cannot be expressed as a single URL path segment.
    #[error("attachment id {id:?} cannot be used as a URL path segment")]
    UnaddressableId {
        /// Attachment identifier.
        id: String,
    },

    /// Failure reported by a host-supplied fetcher.
    #[error("failed to fetch attachment {id}: {message}")]
    Other {
        /// Attachment identifier.
        id: String,
        /// Host-provided description.
        message: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(id: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            id: id.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(id: impl Into<String>) -> Self {
        Self::Timeout { id: id.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(id: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            id: id.into(),
            status,
        }
    }

    /// Creates an authentication error.
    pub fn auth_required(id: impl Into<String>, status: u16) -> Self {
        Self::AuthRequired {
            id: id.into(),
            status,
        }
    }

    /// Creates a size-cap error.
    pub fn too_large(id: impl Into<String>, limit_bytes: u64) -> Self {
        Self::TooLarge {
            id: id.into(),
            limit_bytes,
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(id: impl Into<String>) -> Self {
        Self::Cancelled { id: id.into() }
    }

    /// Creates an error for host fetchers that have no better variant.
    pub fn other(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while packaging fetched attachments into the archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The zip writer rejected an entry or the central directory.
    #[error("failed to write archive entry {entry}: {source}")]
    Zip {
        /// Entry being written, or `<central directory>` during finish.
        entry: String,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// Writing entry bytes into the in-memory buffer failed.
    #[error("IO error writing archive entry {entry}: {source}")]
    Io {
        /// Entry being written.
        entry: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The blocking compression task did not run to completion.
    #[error("archive compression task failed: {source}")]
    Task {
        /// The join error from the blocking pool.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Run-level errors returned to pipeline callers.
///
/// Per-attachment failures are never reported here; see
/// [`RunResult::failed`](super::RunResult::failed).
#[derive(Debug, Error)]
pub enum BundleError {
    /// The pipeline was invoked with no descriptors.
    #[error("no attachments to retrieve: descriptor list is empty")]
    EmptyInput,

    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The attachment proxy base URL could not be parsed.
    #[error("invalid attachment proxy URL {url}: {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    HttpClient {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Attachments were fetched but could not be packaged.
    #[error("archive finalization failed: {0}")]
    Finalize(#[from] ArchiveError),
}
