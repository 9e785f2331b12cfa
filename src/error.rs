use reqwest::StatusCode;
use thiserror::Error;

use crate::path::RemotePath;

/// Terminal outcome of a single transfer operation.
///
/// Every operation resolves exactly once with `Ok` or one of these; there is
/// no other completion path. `Cancelled` is the third terminal signal: a
/// cancelled operation produces neither a success nor a failure outcome.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The caller supplied a path this engine refuses to send. Not retried.
    #[error("invalid remote path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The server body could not be decoded as well-formed multistatus XML.
    /// Surfaced as-is, never retried by this layer.
    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    /// Authentication was rejected (HTTP 401/407). Never retried
    /// automatically; the caller must refresh credentials first.
    #[error("credentials rejected by server (HTTP {status})")]
    CredentialFailure { status: StatusCode },

    /// Transient network-level or server-side failure. Retry policy is the
    /// caller's decision; the status is carried when one was received.
    #[error("recoverable transfer failure: {message}")]
    Recoverable {
        status: Option<StatusCode>,
        message: String,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::CredentialFailure { .. })
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Failure of a chunked upload, pinned to the chunk that broke the run.
///
/// Already-acknowledged chunks stay uploaded; resuming from `chunk_index`
/// targets the same chunk paths and never re-sends completed chunks.
#[derive(Debug, Error)]
#[error("chunk {chunk_index} of upload to '{destination}' failed: {source}")]
pub struct ChunkUploadError {
    pub destination: RemotePath,
    pub chunk_index: usize,
    #[source]
    pub source: TransferError,
}
