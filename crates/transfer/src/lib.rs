//! Chunk planning and byte-level transfer helpers.
//!
//! Splits a file into size-tiered chunks, reads chunk byte ranges from
//! memory or disk, computes SHA-256 fingerprints and stores uploaded
//! chunks on disk until they are merged.

mod chunked;
mod planner;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkStore, checksum_file, checksum_bytes, fingerprint_file};
pub use planner::{Chunk, ChunkPlan, ChunkTiers, MIB};
pub use progress::SpeedCalculator;
pub use types::{FileSource, UploadFile};
pub use validation::validate_segment;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("byte range {start}..{end} outside file of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },

    #[error("chunk {index} missing from {dir}")]
    MissingChunk { dir: String, index: usize },

    #[error("background task failed: {0}")]
    Task(String),
}
