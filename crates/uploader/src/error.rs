//! Uploader error types.

use bigup_transfer::TransferError;

/// Hard failures reported synchronously at the call site.
///
/// Everything recoverable is reported as a progress event instead.
#[derive(Debug, thiserror::Error)]
pub enum UploaderError {
    #[error("no fingerprinter configured")]
    FingerprinterUnavailable,

    #[error("attribute list must hold key/value pairs, got {0} items")]
    OddAttributes(usize),
}

/// Why an upload ended without storing the file.
///
/// Delivered through [`UploadHandle::wait`](crate::UploadHandle::wait).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("chunk {chunk_index} failed after {retries} retries")]
    RetryFailed { chunk_index: usize, retries: u32 },

    #[error("merge failed: {0}")]
    MergeFailed(String),

    #[error("cancelled")]
    Canceled,

    #[error("fingerprint failed: {0}")]
    Fingerprint(String),

    #[error("uploader dropped before the session finished")]
    Abandoned,
}

/// Failure of a call to an upload endpoint.
///
/// The orchestrator treats these the same as a response with
/// `success == false`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(#[from] TransferError),
}

/// Errors from a session persistence store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
