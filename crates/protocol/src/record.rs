use serde::{Deserialize, Serialize};

use crate::types::{PauseCheckpoint, UploadState};

/// Persisted view of an in-flight session, used to survive restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
    pub state: UploadState,
    /// Accumulated progress percentage.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PauseCheckpoint>,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub retry_count: u32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_omits_defaults() {
        let rec = SessionRecord {
            session_id: "s1".into(),
            file_name: "movie.mp4".into(),
            file_size: 1024,
            fingerprint: String::new(),
            state: UploadState::Uploading,
            progress: 40.0,
            checkpoint: None,
            retry_count: 0,
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("fingerprint"));
        assert!(!json.contains("checkpoint"));
        assert!(!json.contains("retryCount"));
        let parsed: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, parsed);
    }

    #[test]
    fn record_keeps_merge_checkpoint() {
        let rec = SessionRecord {
            session_id: "s1".into(),
            file_name: "a.bin".into(),
            file_size: 1,
            fingerprint: "abc".into(),
            state: UploadState::Pause,
            progress: 100.0,
            checkpoint: Some(PauseCheckpoint::Merge),
            retry_count: 0,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["checkpoint"], -1);
    }
}
