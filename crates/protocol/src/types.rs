use serde::{Deserialize, Serialize};

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadState {
    /// Session registered, metadata stored.
    Prepare,
    /// Waiting for the content fingerprint.
    HashWaiting,
    /// Queued for (or about to enter) the chunk loop.
    Waiting,
    /// A chunk was confirmed by the server.
    Uploading,
    /// A chunk failed and is being re-attempted.
    Retry,
    /// All chunks stored, merge requested.
    Merge,
    /// Merge succeeded.
    Done,
    /// Content already existed server-side; nothing was transferred.
    QuickUpload,
    /// Resumed session skipped chunks the server already holds.
    BreakPointUpload,
    /// Another session with identical content is uploading it.
    OtherUploading,
    /// Suspended by an external command.
    Pause,
    /// Resumed from a pause checkpoint.
    PauseRetry,
    /// Cancelled by an external command.
    Canceled,
    /// A chunk failed more than the configured number of retries.
    RetryFailed,
    /// The merge request failed.
    MergeFailed,
}

impl UploadState {
    /// Returns `true` for states that end a session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::QuickUpload | Self::Canceled | Self::RetryFailed | Self::MergeFailed
        )
    }

    /// Returns `true` for terminal states that mean the content is stored.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Done | Self::QuickUpload)
    }

    /// Returns `true` if a running chunk loop may dispatch its next chunk.
    pub fn allows_chunk_dispatch(self) -> bool {
        matches!(
            self,
            Self::Waiting | Self::Uploading | Self::Retry | Self::PauseRetry
        )
    }

    /// Returns `true` if a pause command is meaningful in this state.
    pub fn accepts_pause(self) -> bool {
        matches!(
            self,
            Self::Waiting
                | Self::BreakPointUpload
                | Self::Uploading
                | Self::Retry
                | Self::PauseRetry
                | Self::Merge
                | Self::Pause
        )
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Prepare => "preparing",
            Self::HashWaiting => "hashing",
            Self::Waiting => "queued",
            Self::Uploading => "uploading",
            Self::Retry => "retrying",
            Self::Merge => "merging",
            Self::Done => "done",
            Self::QuickUpload => "already uploaded",
            Self::BreakPointUpload => "resuming",
            Self::OtherUploading => "waiting for identical upload",
            Self::Pause => "paused",
            Self::PauseRetry => "resumed",
            Self::Canceled => "cancelled",
            Self::RetryFailed => "failed",
            Self::MergeFailed => "merge failed",
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a paused session resumes.
///
/// Serialized as a plain integer: the chunk index, or `-1` for a session
/// that was paused while merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum PauseCheckpoint {
    /// Resume the chunk loop at this index.
    Chunk(usize),
    /// Resume by re-issuing the merge.
    Merge,
}

/// Wire value for [`PauseCheckpoint::Merge`].
pub const MERGE_CHECKPOINT: i64 = -1;

impl From<PauseCheckpoint> for i64 {
    fn from(cp: PauseCheckpoint) -> Self {
        match cp {
            PauseCheckpoint::Chunk(i) => i as i64,
            PauseCheckpoint::Merge => MERGE_CHECKPOINT,
        }
    }
}

impl TryFrom<i64> for PauseCheckpoint {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            MERGE_CHECKPOINT => Ok(Self::Merge),
            i if i >= 0 => Ok(Self::Chunk(i as usize)),
            other => Err(format!("invalid pause checkpoint: {other}")),
        }
    }
}
