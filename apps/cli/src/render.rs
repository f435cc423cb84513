//! Terminal output for upload progress.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bigup_protocol::{PauseCheckpoint, ProgressEvent};
use bigup_uploader::{Completion, UploadError};

/// Prints one line per state transition, labelled with the file name.
#[derive(Default)]
pub struct ProgressPrinter {
    names: Mutex<HashMap<String, String>>,
    progress: Mutex<HashMap<String, f64>>,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles one event from the uploader.
    pub fn handle(&self, event: &ProgressEvent) {
        println!("{}", self.line(event));
    }

    /// Renders `event` and updates the tracked per-session progress.
    pub fn line(&self, event: &ProgressEvent) -> String {
        let id = event.session_id();
        if let ProgressEvent::Prepare { file_name, .. } = event {
            self.names
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.to_string(), file_name.clone());
        }

        let percent = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = progress.entry(id.to_string()).or_insert(0.0);
            match event {
                ProgressEvent::Uploading { step, .. } => *entry = (*entry + step).min(100.0),
                ProgressEvent::BreakPointUpload { progress, .. } => *entry = *progress,
                _ => {}
            }
            let value = *entry;
            if event.is_terminal() {
                progress.remove(id);
            }
            value
        };

        let name = {
            let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
            let name = names.get(id).cloned().unwrap_or_else(|| id.to_string());
            if event.is_terminal() {
                names.remove(id);
            }
            name
        };

        format!("[{name}] {}", describe(event, percent))
    }
}

fn describe(event: &ProgressEvent, percent: f64) -> String {
    match event {
        ProgressEvent::Prepare { file_size, .. } => format!("preparing ({file_size} bytes)"),
        ProgressEvent::HashWaiting { .. } => "hashing".into(),
        ProgressEvent::Waiting { .. } => "queued".into(),
        ProgressEvent::Uploading { chunk_index, .. } => {
            format!("uploaded chunk {chunk_index} ({percent:.1}%)")
        }
        ProgressEvent::Retry {
            chunk_index,
            retry_count,
            ..
        } => format!("retrying chunk {chunk_index} (attempt {retry_count})"),
        ProgressEvent::Merge { .. } => "merging".into(),
        ProgressEvent::Done { .. } => "done".into(),
        ProgressEvent::QuickUpload { .. } => "already on server".into(),
        ProgressEvent::BreakPointUpload {
            resume_index,
            progress,
            ..
        } => format!("resuming after {resume_index} stored chunk(s) ({progress:.1}%)"),
        ProgressEvent::OtherUploading { fingerprint, .. } => {
            format!("waiting for identical upload {fingerprint}")
        }
        ProgressEvent::Pause { checkpoint, .. } => match checkpoint {
            PauseCheckpoint::Chunk(i) => format!("paused at chunk {i}"),
            PauseCheckpoint::Merge => "paused before merge".into(),
        },
        ProgressEvent::PauseRetry { .. } => "paused while retrying".into(),
        ProgressEvent::Canceled { .. } => "canceled".into(),
        ProgressEvent::RetryFailed { retry_count, .. } => {
            format!("failed after {retry_count} retries")
        }
        ProgressEvent::MergeFailed { .. } => "merge failed".into(),
    }
}

/// Final summary line for one file.
pub fn summary(file_name: &str, completion: &Completion) -> String {
    match completion {
        Ok(outcome) if outcome.quick => {
            format!("ok      {file_name} -> {} (already stored)", outcome.stored_name)
        }
        Ok(outcome) => format!("ok      {file_name} -> {}", outcome.stored_name),
        Err(UploadError::Canceled) => format!("skipped {file_name}: canceled"),
        Err(e) => format!("FAILED  {file_name}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigup_uploader::UploadOutcome;

    fn prepare(id: &str, name: &str) -> ProgressEvent {
        ProgressEvent::Prepare {
            session_id: id.into(),
            file_name: name.into(),
            file_size: 4,
        }
    }

    #[test]
    fn lines_use_file_name_and_accumulate_progress() {
        let printer = ProgressPrinter::new();
        assert_eq!(printer.line(&prepare("s1", "a.bin")), "[a.bin] preparing (4 bytes)");

        let chunk = |i| ProgressEvent::Uploading {
            session_id: "s1".into(),
            chunk_index: i,
            step: 25.0,
        };
        printer.line(&chunk(0));
        assert_eq!(printer.line(&chunk(1)), "[a.bin] uploaded chunk 1 (50.0%)");

        let done = ProgressEvent::Done {
            session_id: "s1".into(),
        };
        assert_eq!(printer.line(&done), "[a.bin] done");
        // Terminal events forget the session.
        assert_eq!(printer.line(&done), "[s1] done");
    }

    #[test]
    fn breakpoint_sets_progress() {
        let printer = ProgressPrinter::new();
        printer.line(&prepare("s1", "a.bin"));
        printer.line(&ProgressEvent::BreakPointUpload {
            session_id: "s1".into(),
            resume_index: 2,
            progress: 40.0,
        });
        let line = printer.line(&ProgressEvent::Uploading {
            session_id: "s1".into(),
            chunk_index: 2,
            step: 20.0,
        });
        assert_eq!(line, "[a.bin] uploaded chunk 2 (60.0%)");
    }

    #[test]
    fn pause_lines_name_the_checkpoint() {
        let printer = ProgressPrinter::new();
        let merge = ProgressEvent::Pause {
            session_id: "s1".into(),
            checkpoint: PauseCheckpoint::Merge,
        };
        assert_eq!(printer.line(&merge), "[s1] paused before merge");
    }

    #[test]
    fn summaries() {
        let outcome = UploadOutcome {
            session_id: "s1".into(),
            fingerprint: "abc".into(),
            file_name: "a.bin".into(),
            stored_name: "abc.bin".into(),
            quick: true,
        };
        assert_eq!(
            summary("a.bin", &Ok(outcome)),
            "ok      a.bin -> abc.bin (already stored)"
        );
        let failed = summary(
            "b.bin",
            &Err(UploadError::RetryFailed {
                chunk_index: 3,
                retries: 3,
            }),
        );
        assert!(failed.starts_with("FAILED  b.bin: "));
    }
}
