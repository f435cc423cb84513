//! Progress events published on every session state transition.

use serde::{Deserialize, Serialize};

use crate::types::{PauseCheckpoint, UploadState};

/// Immutable snapshot of a state transition.
///
/// One variant per [`UploadState`], each carrying only the data relevant
/// to that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    Prepare {
        session_id: String,
        file_name: String,
        file_size: u64,
    },
    HashWaiting {
        session_id: String,
    },
    Waiting {
        session_id: String,
    },
    Uploading {
        session_id: String,
        chunk_index: usize,
        step: f64,
    },
    Retry {
        session_id: String,
        chunk_index: usize,
        retry_count: u32,
    },
    Merge {
        session_id: String,
    },
    Done {
        session_id: String,
    },
    QuickUpload {
        session_id: String,
    },
    BreakPointUpload {
        session_id: String,
        /// Number of chunks already stored server-side.
        resume_index: usize,
        /// Cumulative progress covered by those chunks.
        progress: f64,
    },
    OtherUploading {
        session_id: String,
        fingerprint: String,
    },
    Pause {
        session_id: String,
        checkpoint: PauseCheckpoint,
    },
    PauseRetry {
        session_id: String,
    },
    Canceled {
        session_id: String,
    },
    RetryFailed {
        session_id: String,
        retry_count: u32,
    },
    MergeFailed {
        session_id: String,
    },
}

impl ProgressEvent {
    /// The state this event transitions into.
    pub fn state(&self) -> UploadState {
        match self {
            Self::Prepare { .. } => UploadState::Prepare,
            Self::HashWaiting { .. } => UploadState::HashWaiting,
            Self::Waiting { .. } => UploadState::Waiting,
            Self::Uploading { .. } => UploadState::Uploading,
            Self::Retry { .. } => UploadState::Retry,
            Self::Merge { .. } => UploadState::Merge,
            Self::Done { .. } => UploadState::Done,
            Self::QuickUpload { .. } => UploadState::QuickUpload,
            Self::BreakPointUpload { .. } => UploadState::BreakPointUpload,
            Self::OtherUploading { .. } => UploadState::OtherUploading,
            Self::Pause { .. } => UploadState::Pause,
            Self::PauseRetry { .. } => UploadState::PauseRetry,
            Self::Canceled { .. } => UploadState::Canceled,
            Self::RetryFailed { .. } => UploadState::RetryFailed,
            Self::MergeFailed { .. } => UploadState::MergeFailed,
        }
    }

    /// The session this event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Prepare { session_id, .. }
            | Self::HashWaiting { session_id }
            | Self::Waiting { session_id }
            | Self::Uploading { session_id, .. }
            | Self::Retry { session_id, .. }
            | Self::Merge { session_id }
            | Self::Done { session_id }
            | Self::QuickUpload { session_id }
            | Self::BreakPointUpload { session_id, .. }
            | Self::OtherUploading { session_id, .. }
            | Self::Pause { session_id, .. }
            | Self::PauseRetry { session_id }
            | Self::Canceled { session_id }
            | Self::RetryFailed { session_id, .. }
            | Self::MergeFailed { session_id } => session_id,
        }
    }

    /// Returns `true` if this event ends its session.
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }
}
