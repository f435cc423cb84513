//! Upload orchestration.
//!
//! Drives every session through its lifecycle:
//!
//! ```text
//! Prepare -> HashWaiting -> Waiting -> Uploading <-> Retry -> Merge -> Done
//! ```
//!
//! with the side branches `QuickUpload` (content already stored),
//! `OtherUploading` (an identical file is being uploaded by another
//! session), `BreakPointUpload` (server already holds some chunks) and
//! `Pause`/`PauseRetry`. Every transition is published as a
//! [`ProgressEvent`] on [`PROGRESS_CHANNEL`]. Recoverable failures end up
//! as events too; only misuse is reported as an error from the call.

use std::collections::BTreeMap;
use std::sync::Arc;

use bigup_protocol::{PauseCheckpoint, ProgressEvent, UploadState};
use bigup_transfer::{Chunk, ChunkPlan, UploadFile};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::UploadApi;
use crate::bus::{EventBus, SubscriberOrder, Subscription};
use crate::config::UploaderConfig;
use crate::error::{UploadError, UploaderError};
use crate::hasher::Fingerprinter;
use crate::registry::{DedupRole, Evicted, Session, SessionRegistry};
use crate::scheduler::TaskScheduler;
use crate::store::{MemorySessionStore, SessionStore};
use crate::types::{SessionSnapshot, UploadHandle, UploadOutcome};

/// Bus channel carrying every [`ProgressEvent`].
pub const PROGRESS_CHANNEL: &str = "upload-progress";

/// Builds an [`Uploader`].
pub struct UploaderBuilder {
    api: Arc<dyn UploadApi>,
    fingerprinter: Option<Arc<dyn Fingerprinter>>,
    config: UploaderConfig,
    registry: Option<Arc<SessionRegistry>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl UploaderBuilder {
    /// Sets the hashing collaborator. Without one, every submission fails.
    pub fn fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    pub fn config(mut self, config: UploaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing registry instead of a fresh one.
    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Store used when `persist` is enabled. Defaults to memory.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Uploader {
        let registry = self.registry.unwrap_or_default();
        let scheduler = TaskScheduler::new(
            self.config.concurrency_limit,
            self.config.dispatch_jitter(),
        );
        let bus = EventBus::new();

        let store = if self.config.persist {
            let store = self
                .store
                .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
            bus.subscribe(
                PROGRESS_CHANNEL,
                SubscriberOrder::last(0),
                persistence_observer(Arc::clone(&registry), Arc::clone(&store)),
            );
            Some(store)
        } else {
            None
        };

        Uploader {
            engine: Arc::new(Engine {
                config: self.config,
                api: self.api,
                fingerprinter: self.fingerprinter,
                registry,
                bus,
                scheduler,
                store,
            }),
        }
    }
}

/// Saves in-flight sessions and drops finished ones.
fn persistence_observer(
    registry: Arc<SessionRegistry>,
    store: Arc<dyn SessionStore>,
) -> impl Fn(&ProgressEvent) + Send + Sync + 'static {
    move |event| {
        let session_id = event.session_id();
        let result = match event.state() {
            state if state.is_terminal() => store.remove(session_id),
            UploadState::Uploading
            | UploadState::Retry
            | UploadState::Pause
            | UploadState::PauseRetry
            | UploadState::Merge => match registry.record(session_id) {
                Some(record) => store.save(&record),
                None => Ok(()),
            },
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!(session = %session_id, error = %e, "failed to persist session record");
        }
    }
}

/// Chunked uploader with bounded concurrency, dedup and resume.
///
/// Cloning is cheap and every clone drives the same sessions. Methods that
/// start work must be called from within a tokio runtime.
#[derive(Clone)]
pub struct Uploader {
    engine: Arc<Engine>,
}

impl Uploader {
    pub fn builder(api: Arc<dyn UploadApi>) -> UploaderBuilder {
        UploaderBuilder {
            api,
            fingerprinter: None,
            config: UploaderConfig::default(),
            registry: None,
            store: None,
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.engine.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.engine.registry
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.engine.scheduler
    }

    /// The persistence store, when `persist` is enabled.
    pub fn session_store(&self) -> Option<&Arc<dyn SessionStore>> {
        self.engine.store.as_ref()
    }

    /// Registers `file` and starts hashing it.
    ///
    /// Returns as soon as the session exists. `Prepare` has been published
    /// by then, unless another event is being delivered (for example when
    /// called from a subscriber), in which case it is queued behind it.
    pub fn submit(&self, file: UploadFile) -> Result<UploadHandle, UploaderError> {
        self.submit_with_attributes::<&str>(file, &[])
    }

    /// Like [`submit`](Self::submit), attaching metadata given as a flat
    /// `[key, value, key, value, ...]` list.
    pub fn submit_with_attributes<S: AsRef<str>>(
        &self,
        file: UploadFile,
        attributes: &[S],
    ) -> Result<UploadHandle, UploaderError> {
        self.engine.submit(file, attributes)
    }

    /// Pauses a running session, or resumes a paused one.
    ///
    /// Returns `false` if the command was ignored (unknown session or a
    /// state where pausing has no meaning).
    pub fn pause(&self, session_id: &str) -> bool {
        self.engine.pause(session_id)
    }

    /// Cancels a session. Returns `false` for unknown or finished sessions.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.engine.finish(
            session_id,
            ProgressEvent::Canceled {
                session_id: session_id.to_string(),
            },
            Err(UploadError::Canceled),
        )
    }

    /// Subscribes to the events of every session.
    pub fn subscribe<F>(&self, order: SubscriberOrder, handler: F) -> Subscription
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.engine.bus.subscribe(PROGRESS_CHANNEL, order, handler)
    }

    /// Subscribes to the events of one session.
    pub fn subscribe_session<F>(
        &self,
        session_id: &str,
        order: SubscriberOrder,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        let session_id = session_id.to_string();
        self.engine
            .bus
            .subscribe(PROGRESS_CHANNEL, order, move |event: &ProgressEvent| {
                if event.session_id() == session_id {
                    handler(event);
                }
            })
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.engine.bus.unsubscribe(subscription)
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.engine.registry.snapshot(session_id)
    }

    /// Ids of every session that has not reached a terminal state.
    pub fn active_sessions(&self) -> Vec<String> {
        self.engine.registry.session_ids()
    }
}

fn parse_attributes<S: AsRef<str>>(
    items: &[S],
) -> Result<BTreeMap<String, String>, UploaderError> {
    if items.len() % 2 != 0 {
        return Err(UploaderError::OddAttributes(items.len()));
    }
    Ok(items
        .chunks_exact(2)
        .map(|pair| (pair[0].as_ref().to_string(), pair[1].as_ref().to_string()))
        .collect())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Engine {
    config: UploaderConfig,
    api: Arc<dyn UploadApi>,
    fingerprinter: Option<Arc<dyn Fingerprinter>>,
    registry: Arc<SessionRegistry>,
    bus: EventBus<ProgressEvent>,
    scheduler: TaskScheduler,
    store: Option<Arc<dyn SessionStore>>,
}

/// How a chunk-upload task begins.
enum TaskStart {
    Run {
        plan: Arc<ChunkPlan>,
        fingerprint: String,
        file: UploadFile,
        /// `None` asks the server for already stored chunks.
        from: Option<PauseCheckpoint>,
    },
    /// The session was paused while the task waited for a slot.
    Paused,
    Stop,
}

enum PauseAction {
    Ignore,
    Suspend,
    Resume,
}

impl Engine {
    fn emit(&self, event: ProgressEvent) {
        debug!(session = %event.session_id(), state = %event.state(), "state transition");
        self.bus.emit(PROGRESS_CHANNEL, event);
    }

    fn submit<S: AsRef<str>>(
        self: &Arc<Self>,
        file: UploadFile,
        attributes: &[S],
    ) -> Result<UploadHandle, UploaderError> {
        let fingerprinter = self
            .fingerprinter
            .clone()
            .ok_or(UploaderError::FingerprinterUnavailable)?;
        let attributes = parse_attributes(attributes)?;

        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let prepare = ProgressEvent::Prepare {
            session_id: session_id.clone(),
            file_name: file.name().to_string(),
            file_size: file.size(),
        };
        info!(session = %session_id, file = %file.name(), size = file.size(), "upload submitted");
        self.registry
            .insert(Session::new(session_id.clone(), file, attributes, tx));
        self.emit(prepare);

        let engine = Arc::clone(self);
        let id = session_id.clone();
        tokio::spawn(async move { engine.fingerprint_and_start(id, fingerprinter).await });

        Ok(UploadHandle::new(session_id, rx))
    }

    async fn fingerprint_and_start(
        self: Arc<Self>,
        session_id: String,
        fingerprinter: Arc<dyn Fingerprinter>,
    ) {
        let file = self
            .registry
            .with_session(&session_id, |s| {
                s.state = UploadState::HashWaiting;
                s.file.clone()
            });
        let Some(file) = file else { return };
        self.emit(ProgressEvent::HashWaiting {
            session_id: session_id.clone(),
        });

        let fingerprint = match fingerprinter.fingerprint(&file).await {
            Ok(fp) => fp,
            Err(e) => {
                warn!(session = %session_id, error = %e, "fingerprint failed");
                self.finish(
                    &session_id,
                    ProgressEvent::RetryFailed {
                        session_id: session_id.clone(),
                        retry_count: 0,
                    },
                    Err(UploadError::Fingerprint(e.to_string())),
                );
                return;
            }
        };
        debug!(session = %session_id, fingerprint = %fingerprint, "fingerprint computed");

        match self.registry.join_dedup(&session_id, &fingerprint) {
            None => {}
            Some(DedupRole::Follower) => {
                info!(
                    session = %session_id,
                    fingerprint = %fingerprint,
                    "identical upload in progress, waiting for it"
                );
                self.emit(ProgressEvent::OtherUploading {
                    session_id,
                    fingerprint,
                });
            }
            Some(DedupRole::Uploader) => self.start_upload(session_id).await,
        }
    }

    /// Checks whether the content is already stored, otherwise queues the
    /// chunk-upload task. Also the restart path of promoted dedup peers.
    async fn start_upload(self: Arc<Self>, session_id: String) {
        let fingerprint = self
            .registry
            .with_session(&session_id, |s| s.fingerprint.clone())
            .flatten();
        let Some(fingerprint) = fingerprint else { return };

        let exists = match self.api.verify_exists(&fingerprint).await {
            Ok(resp) => resp.success,
            Err(e) => {
                warn!(session = %session_id, error = %e, "verify request failed");
                false
            }
        };
        if exists {
            info!(session = %session_id, fingerprint = %fingerprint, "content already stored");
            self.finish(
                &session_id,
                ProgressEvent::QuickUpload {
                    session_id: session_id.clone(),
                },
                Ok(true),
            );
            return;
        }

        let tiers = self.config.chunk_tiers;
        let entered_waiting = self.registry.with_session(&session_id, |s| {
            if s.plan.is_none() {
                s.plan = Some(Arc::new(tiers.plan(s.file.size(), &fingerprint)));
            }
            if s.state == UploadState::HashWaiting {
                s.state = UploadState::Waiting;
                true
            } else {
                false
            }
        });
        match entered_waiting {
            None => return,
            Some(true) => self.emit(ProgressEvent::Waiting {
                session_id: session_id.clone(),
            }),
            Some(false) => {}
        }
        self.spawn_task(&session_id);
    }

    fn spawn_start(self: &Arc<Self>, session_id: String) {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.start_upload(session_id).await });
    }

    /// Queues a chunk-upload task unless one already owns the session.
    fn spawn_task(self: &Arc<Self>, session_id: &str) {
        let generation = self
            .registry
            .with_session(session_id, Session::claim_task)
            .flatten();
        let Some(generation) = generation else { return };

        let engine = Arc::clone(self);
        let id = session_id.to_string();
        self.scheduler
            .submit(async move { engine.run_upload_task(id, generation).await });
    }

    async fn run_upload_task(self: Arc<Self>, session_id: String, generation: u64) {
        self.upload_session(&session_id, generation).await;
        self.registry
            .with_session(&session_id, |s| s.release_task(generation));
    }

    fn task_start(&self, session_id: &str) -> TaskStart {
        self.registry
            .with_session(session_id, |s| {
                let (Some(plan), Some(fingerprint)) = (s.plan.clone(), s.fingerprint.clone())
                else {
                    return TaskStart::Stop;
                };
                let from = match s.state {
                    UploadState::PauseRetry => {
                        Some(s.checkpoint.take().unwrap_or(PauseCheckpoint::Chunk(0)))
                    }
                    UploadState::Pause => return TaskStart::Paused,
                    state if state.allows_chunk_dispatch() => None,
                    _ => return TaskStart::Stop,
                };
                TaskStart::Run {
                    plan,
                    fingerprint,
                    file: s.file.clone(),
                    from,
                }
            })
            .unwrap_or(TaskStart::Stop)
    }

    async fn upload_session(self: &Arc<Self>, session_id: &str, generation: u64) {
        let (plan, fingerprint, file, from) = match self.task_start(session_id) {
            TaskStart::Run {
                plan,
                fingerprint,
                file,
                from,
            } => (plan, fingerprint, file, from),
            TaskStart::Paused => {
                self.pause_at(session_id, generation, PauseCheckpoint::Chunk(0));
                return;
            }
            TaskStart::Stop => return,
        };

        let mut index = match from {
            Some(PauseCheckpoint::Merge) => {
                self.merge(session_id, generation, &plan, &file, &fingerprint)
                    .await;
                return;
            }
            Some(PauseCheckpoint::Chunk(index)) => {
                info!(session = %session_id, index, "resuming from pause checkpoint");
                index
            }
            None => self.breakpoint(session_id, &fingerprint, &plan).await,
        };

        let step = plan.step();
        let mut retries = 0u32;
        while index < plan.len() {
            match self.registry.state(session_id) {
                None => return,
                Some(state) if !state.allows_chunk_dispatch() => break,
                Some(_) => {}
            }
            let Some(chunk) = plan.get(index) else { break };

            if self.send_chunk(session_id, &file, &fingerprint, chunk).await {
                let accepted = self.registry.with_session(session_id, |s| {
                    // A pause that arrived while the request was in flight
                    // wins over its result.
                    if !s.state.allows_chunk_dispatch() {
                        return false;
                    }
                    s.state = UploadState::Uploading;
                    s.progress += step;
                    s.uploaded_bytes += chunk.len();
                    s.retry_count = 0;
                    s.speed.record(chunk.len());
                    true
                });
                match accepted {
                    None => return,
                    Some(false) => {
                        debug!(session = %session_id, index, "discarding stale chunk result");
                    }
                    Some(true) => {
                        self.emit(ProgressEvent::Uploading {
                            session_id: session_id.to_string(),
                            chunk_index: index,
                            step,
                        });
                        index += 1;
                        retries = 0;
                    }
                }
                continue;
            }

            match self.registry.state(session_id) {
                None => return,
                Some(state) if !state.allows_chunk_dispatch() => continue,
                Some(_) => {}
            }
            if retries >= self.config.max_retries {
                warn!(session = %session_id, index, retries, "chunk retries exhausted");
                self.finish(
                    session_id,
                    ProgressEvent::RetryFailed {
                        session_id: session_id.to_string(),
                        retry_count: retries,
                    },
                    Err(UploadError::RetryFailed {
                        chunk_index: index,
                        retries,
                    }),
                );
                return;
            }

            retries += 1;
            let accepted = self.registry.with_session(session_id, |s| {
                if !s.state.allows_chunk_dispatch() {
                    return false;
                }
                s.state = UploadState::Retry;
                s.retry_count = retries;
                true
            });
            match accepted {
                None => return,
                Some(false) => {}
                Some(true) => {
                    self.emit(ProgressEvent::Retry {
                        session_id: session_id.to_string(),
                        chunk_index: index,
                        retry_count: retries,
                    });
                    let delay = self.config.retry_backoff.delay_for_attempt(retries);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if index < plan.len() {
            self.pause_at(session_id, generation, PauseCheckpoint::Chunk(index));
            return;
        }
        self.merge(session_id, generation, &plan, &file, &fingerprint)
            .await;
    }

    /// Returns the index of the first chunk the server does not hold yet.
    async fn breakpoint(&self, session_id: &str, fingerprint: &str, plan: &ChunkPlan) -> usize {
        let stored = match self.api.list_uploaded_chunks(fingerprint).await {
            Ok(resp) if resp.success => resp.data.map_or(0, |chunks| chunks.len()),
            Ok(_) => 0,
            Err(e) => {
                warn!(session = %session_id, error = %e, "chunk listing failed, starting from the first chunk");
                0
            }
        };
        if stored == 0 {
            return 0;
        }

        let count = stored.min(plan.len());
        let progress = count as f64 * plan.step();
        let bytes: u64 = plan.chunks()[..count].iter().map(Chunk::len).sum();
        let previous = self
            .registry
            .with_session(session_id, |s| {
                s.progress = progress;
                s.uploaded_bytes = bytes;
                if !s.state.allows_chunk_dispatch() {
                    return None;
                }
                let previous = s.state;
                s.state = UploadState::BreakPointUpload;
                Some(previous)
            })
            .flatten();
        let Some(previous) = previous else {
            return count;
        };

        info!(session = %session_id, resume_index = count, "server already holds chunks");
        self.emit(ProgressEvent::BreakPointUpload {
            session_id: session_id.to_string(),
            resume_index: count,
            progress,
        });
        let settle = self.config.breakpoint_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        self.registry.with_session(session_id, |s| {
            if s.state == UploadState::BreakPointUpload {
                s.state = previous;
            }
        });
        count
    }

    async fn send_chunk(
        &self,
        session_id: &str,
        file: &UploadFile,
        fingerprint: &str,
        chunk: &Chunk,
    ) -> bool {
        let data = match file.read_range(chunk.range.clone()).await {
            Ok(data) => data,
            Err(e) => {
                warn!(session = %session_id, index = chunk.index, error = %e, "failed to read chunk");
                return false;
            }
        };
        match self.api.upload_chunk(fingerprint, &chunk.name, data).await {
            Ok(resp) if resp.success => true,
            Ok(resp) => {
                warn!(
                    session = %session_id,
                    index = chunk.index,
                    code = resp.code,
                    message = %resp.message,
                    "chunk rejected"
                );
                false
            }
            Err(e) => {
                warn!(session = %session_id, index = chunk.index, error = %e, "chunk upload failed");
                false
            }
        }
    }

    async fn merge(
        self: &Arc<Self>,
        session_id: &str,
        generation: u64,
        plan: &ChunkPlan,
        file: &UploadFile,
        fingerprint: &str,
    ) {
        let entered = self.registry.with_session(session_id, |s| {
            if !s.state.allows_chunk_dispatch() {
                return false;
            }
            s.state = UploadState::Merge;
            true
        });
        match entered {
            None => return,
            Some(false) => {
                self.pause_at(session_id, generation, PauseCheckpoint::Chunk(plan.len()));
                return;
            }
            Some(true) => {}
        }
        self.emit(ProgressEvent::Merge {
            session_id: session_id.to_string(),
        });

        let merged_name = file.merged_name(fingerprint);
        let failure = match self.api.merge_chunks(fingerprint, &merged_name).await {
            Ok(resp) if resp.success => None,
            Ok(resp) => Some(format!("server returned code {}: {}", resp.code, resp.message)),
            Err(e) => Some(e.to_string()),
        };

        let Some(reason) = failure else {
            info!(session = %session_id, file = %merged_name, "upload complete");
            self.finish(
                session_id,
                ProgressEvent::Done {
                    session_id: session_id.to_string(),
                },
                Ok(false),
            );
            return;
        };

        if self.registry.state(session_id) == Some(UploadState::Pause) {
            self.pause_at(session_id, generation, PauseCheckpoint::Merge);
            return;
        }
        warn!(session = %session_id, reason = %reason, "merge failed");
        self.finish(
            session_id,
            ProgressEvent::MergeFailed {
                session_id: session_id.to_string(),
            },
            Err(UploadError::MergeFailed(reason)),
        );
    }

    /// Records the checkpoint of a paused session and gives up task
    /// ownership, so a resume can start a new task right away.
    ///
    /// Does nothing unless the session is in `Pause`.
    fn pause_at(&self, session_id: &str, generation: u64, checkpoint: PauseCheckpoint) {
        let recorded = self
            .registry
            .with_session(session_id, |s| {
                if s.state != UploadState::Pause {
                    return None;
                }
                let checkpoint = *s.checkpoint.get_or_insert(checkpoint);
                s.release_task(generation);
                Some(checkpoint)
            })
            .flatten();
        if let Some(checkpoint) = recorded {
            info!(session = %session_id, ?checkpoint, "upload paused");
            self.emit(ProgressEvent::Pause {
                session_id: session_id.to_string(),
                checkpoint,
            });
        }
    }

    fn pause(self: &Arc<Self>, session_id: &str) -> bool {
        let action = self.registry.with_session(session_id, |s| match s.state {
            UploadState::Pause if s.checkpoint.is_some() => {
                s.state = UploadState::PauseRetry;
                PauseAction::Resume
            }
            // The running task has not observed the pause yet.
            UploadState::Pause => PauseAction::Ignore,
            state if state.accepts_pause() => {
                s.state = UploadState::Pause;
                PauseAction::Suspend
            }
            _ => PauseAction::Ignore,
        });

        match action {
            None | Some(PauseAction::Ignore) => false,
            Some(PauseAction::Suspend) => {
                info!(session = %session_id, "pause requested");
                true
            }
            Some(PauseAction::Resume) => {
                info!(session = %session_id, "resuming paused upload");
                self.emit(ProgressEvent::PauseRetry {
                    session_id: session_id.to_string(),
                });
                self.spawn_task(session_id);
                true
            }
        }
    }

    /// Ends a session: evicts it, resolves its handle, publishes the
    /// terminal event and restarts promoted dedup peers.
    ///
    /// `result` is `Ok(quick)` for a stored upload. Returns `false` if the
    /// session had already finished.
    fn finish(
        self: &Arc<Self>,
        session_id: &str,
        event: ProgressEvent,
        result: Result<bool, UploadError>,
    ) -> bool {
        let terminal = event.state();
        let Some(Evicted {
            mut session,
            promoted,
        }) = self.registry.evict(session_id, terminal)
        else {
            return false;
        };

        let completion = result.map(|quick| {
            let fingerprint = session.fingerprint.clone().unwrap_or_default();
            UploadOutcome {
                session_id: session.id.clone(),
                stored_name: session.file.merged_name(&fingerprint),
                file_name: session.file.name().to_string(),
                fingerprint,
                quick,
            }
        });
        match &completion {
            Ok(_) => debug!(session = %session_id, state = %terminal, "session finished"),
            Err(e) => info!(session = %session_id, state = %terminal, error = %e, "session ended"),
        }
        if let Some(tx) = session.completion.take() {
            // The caller may have dropped its handle.
            let _ = tx.send(completion);
        }

        self.emit(event);

        for peer in promoted {
            info!(session = %peer, after = %session_id, "restarting dedup peer");
            self.emit(ProgressEvent::Waiting {
                session_id: peer.clone(),
            });
            self.spawn_start(peer);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_parse_in_pairs() {
        let attrs = parse_attributes(&["owner", "alice", "kind", "video"]).unwrap();
        assert_eq!(attrs["owner"], "alice");
        assert_eq!(attrs["kind"], "video");
        assert!(parse_attributes::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn odd_attributes_rejected() {
        let err = parse_attributes(&["owner", "alice", "dangling"]).unwrap_err();
        assert!(matches!(err, UploaderError::OddAttributes(3)));
    }
}
