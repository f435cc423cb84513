//! Shared value types for chunked uploads.
//!
//! Upload states, the progress events published on every transition,
//! the response envelope of the upload endpoints and the persisted
//! session record.

pub mod envelope;
pub mod events;
pub mod record;
pub mod types;

// Re-export primary types for convenience.
pub use envelope::ApiResponse;
pub use events::ProgressEvent;
pub use record::SessionRecord;
pub use types::{MERGE_CHECKPOINT, PauseCheckpoint, UploadState};
