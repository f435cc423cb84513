//! Chunked upload orchestration.
//!
//! Splits files into chunks, uploads them through an [`UploadApi`] with
//! bounded concurrency and per-chunk retry, skips content the server
//! already holds, shares one transfer between sessions uploading identical
//! content, and supports pause/resume from a checkpoint. Progress is
//! published as [`ProgressEvent`](bigup_protocol::ProgressEvent)s on an
//! ordered [`EventBus`].

pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod hasher;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod types;

pub use api::{ApiFuture, LocalDirApi, UploadApi};
pub use bus::{EventBus, SubscriberOrder, SubscriberSort, Subscription};
pub use config::{RetryBackoff, UploaderConfig};
pub use error::{ApiError, StoreError, UploadError, UploaderError};
pub use hasher::{FingerprintFuture, Fingerprinter, Sha256Fingerprinter};
pub use orchestrator::{PROGRESS_CHANNEL, Uploader, UploaderBuilder};
pub use registry::{DedupRegistry, SessionRegistry};
pub use scheduler::TaskScheduler;
pub use store::{JsonFileSessionStore, MemorySessionStore, SessionStore};
pub use types::{Completion, SessionSnapshot, UploadHandle, UploadOutcome};
