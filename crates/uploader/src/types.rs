use std::collections::BTreeMap;
use std::time::Duration;

use bigup_protocol::{PauseCheckpoint, UploadState};
use tokio::sync::oneshot;

use crate::error::UploadError;

/// Result delivered when a session reaches a terminal state.
pub type Completion = Result<UploadOutcome, UploadError>;

/// A stored upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub session_id: String,
    pub fingerprint: String,
    pub file_name: String,
    /// Name of the merged file on the server.
    pub stored_name: String,
    /// `true` when the content already existed and no chunk was sent.
    pub quick: bool,
}

/// Returned by [`Uploader::submit`](crate::Uploader::submit).
#[derive(Debug)]
pub struct UploadHandle {
    session_id: String,
    completion: oneshot::Receiver<Completion>,
}

impl UploadHandle {
    pub(crate) fn new(session_id: String, completion: oneshot::Receiver<Completion>) -> Self {
        Self {
            session_id,
            completion,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Waits until the session reaches a terminal state.
    pub async fn wait(self) -> Completion {
        self.completion.await.unwrap_or(Err(UploadError::Abandoned))
    }
}

/// Point-in-time view of a live session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub fingerprint: Option<String>,
    pub state: UploadState,
    /// Accumulated progress percentage.
    pub progress: f64,
    pub uploaded_bytes: u64,
    pub retry_count: u32,
    pub checkpoint: Option<PauseCheckpoint>,
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
    pub attributes: BTreeMap<String, String>,
}
