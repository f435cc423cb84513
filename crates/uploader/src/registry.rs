//! Session and dedup bookkeeping.
//!
//! All session state, dedup groups and pause checkpoints live behind a
//! single mutex in [`SessionRegistry`]. Every transition is a
//! read-check-write under that lock, and the lock is never held across an
//! `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bigup_protocol::{PauseCheckpoint, SessionRecord, UploadState};
use bigup_transfer::{ChunkPlan, SpeedCalculator, UploadFile};
use tokio::sync::oneshot;

use crate::types::{Completion, SessionSnapshot};

// ---------------------------------------------------------------------------
// DedupRegistry
// ---------------------------------------------------------------------------

/// Groups of sessions uploading byte-identical content.
///
/// The first member of a group is the one that joined earliest. A group is
/// deleted when its last member leaves.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    groups: HashMap<String, Vec<String>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `session_id` to the group of `fingerprint`, creating it if needed.
    pub fn join(&mut self, fingerprint: &str, session_id: &str) {
        let members = self.groups.entry(fingerprint.to_string()).or_default();
        if !members.iter().any(|m| m == session_id) {
            members.push(session_id.to_string());
        }
    }

    /// Removes `session_id` from the group. Returns `false` if it was not a
    /// member.
    pub fn leave(&mut self, fingerprint: &str, session_id: &str) -> bool {
        let Some(members) = self.groups.get_mut(fingerprint) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| m != session_id);
        let removed = members.len() != before;
        if members.is_empty() {
            self.groups.remove(fingerprint);
        }
        removed
    }

    /// Members of the group in join order.
    pub fn peers_of(&self, fingerprint: &str) -> &[String] {
        self.groups.get(fingerprint).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if `session_id` belongs to any group.
    pub fn contains(&self, session_id: &str) -> bool {
        self.groups.values().any(|m| m.iter().any(|s| s == session_id))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Mutable state of one upload.
pub(crate) struct Session {
    pub id: String,
    pub file: UploadFile,
    pub attributes: BTreeMap<String, String>,
    pub fingerprint: Option<String>,
    pub state: UploadState,
    pub plan: Option<Arc<ChunkPlan>>,
    pub progress: f64,
    pub uploaded_bytes: u64,
    pub retry_count: u32,
    pub checkpoint: Option<PauseCheckpoint>,
    pub speed: SpeedCalculator,
    pub completion: Option<oneshot::Sender<Completion>>,
    /// Generation of the chunk-upload task that currently owns the session.
    task: Option<u64>,
    next_task: u64,
}

impl Session {
    pub fn new(
        id: String,
        file: UploadFile,
        attributes: BTreeMap<String, String>,
        completion: oneshot::Sender<Completion>,
    ) -> Self {
        Self {
            id,
            file,
            attributes,
            fingerprint: None,
            state: UploadState::Prepare,
            plan: None,
            progress: 0.0,
            uploaded_bytes: 0,
            retry_count: 0,
            checkpoint: None,
            speed: SpeedCalculator::default(),
            completion: Some(completion),
            task: None,
            next_task: 0,
        }
    }

    /// Claims ownership for a new chunk-upload task.
    ///
    /// Returns `None` while another task still owns the session.
    pub fn claim_task(&mut self) -> Option<u64> {
        if self.task.is_some() {
            return None;
        }
        let generation = self.next_task;
        self.next_task += 1;
        self.task = Some(generation);
        Some(generation)
    }

    /// Releases ownership if `generation` still holds it.
    pub fn release_task(&mut self, generation: u64) -> bool {
        if self.task == Some(generation) {
            self.task = None;
            true
        } else {
            false
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let remaining = self.file.size().saturating_sub(self.uploaded_bytes);
        SessionSnapshot {
            session_id: self.id.clone(),
            file_name: self.file.name().to_string(),
            file_size: self.file.size(),
            fingerprint: self.fingerprint.clone(),
            state: self.state,
            progress: self.progress,
            uploaded_bytes: self.uploaded_bytes,
            retry_count: self.retry_count,
            checkpoint: self.checkpoint,
            bytes_per_second: self.speed.bytes_per_second(),
            eta: self.speed.eta(remaining),
            attributes: self.attributes.clone(),
        }
    }

    fn record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.id.clone(),
            file_name: self.file.name().to_string(),
            file_size: self.file.size(),
            fingerprint: self.fingerprint.clone().unwrap_or_default(),
            state: self.state,
            progress: self.progress,
            checkpoint: self.checkpoint,
            retry_count: self.retry_count,
        }
    }
}

/// Outcome of [`SessionRegistry::join_dedup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DedupRole {
    /// First active member: performs the transfer.
    Uploader,
    /// Another member is already transferring the same content.
    Follower,
}

/// A session removed on reaching a terminal state.
pub(crate) struct Evicted {
    pub session: Session,
    /// Dedup peers moved to `Waiting` that must be restarted.
    pub promoted: Vec<String>,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

struct RegistryInner {
    sessions: HashMap<String, Session>,
    dedup: DedupRegistry,
}

/// Store of live sessions and their dedup groups.
///
/// A session is present from submission until it reaches a terminal state.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                dedup: DedupRegistry::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().sessions.contains_key(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.lock().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn state(&self, session_id: &str) -> Option<UploadState> {
        self.lock().sessions.get(session_id).map(|s| s.state)
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.lock().sessions.get(session_id).map(Session::snapshot)
    }

    pub fn record(&self, session_id: &str) -> Option<SessionRecord> {
        self.lock().sessions.get(session_id).map(Session::record)
    }

    /// Members of the dedup group of `fingerprint`, in join order.
    pub fn peers_of(&self, fingerprint: &str) -> Vec<String> {
        self.lock().dedup.peers_of(fingerprint).to_vec()
    }

    /// Returns `true` if `session_id` is a member of any dedup group.
    pub fn in_dedup_group(&self, session_id: &str) -> bool {
        self.lock().dedup.contains(session_id)
    }

    pub(crate) fn insert(&self, session: Session) {
        self.lock().sessions.insert(session.id.clone(), session);
    }

    /// Runs `f` on the session under the registry lock.
    ///
    /// Returns `None` if the session is no longer registered.
    pub(crate) fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        self.lock().sessions.get_mut(session_id).map(f)
    }

    /// Records the fingerprint and places the session in its dedup group.
    ///
    /// A session joining a group that already has members becomes a
    /// follower and moves to `OtherUploading`.
    pub(crate) fn join_dedup(&self, session_id: &str, fingerprint: &str) -> Option<DedupRole> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let session = inner.sessions.get_mut(session_id)?;
        session.fingerprint = Some(fingerprint.to_string());

        let role = if inner.dedup.peers_of(fingerprint).is_empty() {
            DedupRole::Uploader
        } else {
            session.state = UploadState::OtherUploading;
            DedupRole::Follower
        };
        inner.dedup.join(fingerprint, session_id);
        Some(role)
    }

    /// Removes a session that reached `terminal` and decides which dedup
    /// peers to restart.
    ///
    /// Only the group's uploader triggers promotion: on success every
    /// waiting follower is restarted, on failure the first waiting
    /// follower takes over unless another member is already active.
    /// Promoted peers are moved to `Waiting` under the same lock.
    pub(crate) fn evict(&self, session_id: &str, terminal: UploadState) -> Option<Evicted> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let mut session = inner.sessions.remove(session_id)?;
        let was_follower = session.state == UploadState::OtherUploading;
        session.state = terminal;

        let mut promoted = Vec::new();
        if let Some(fingerprint) = &session.fingerprint {
            inner.dedup.leave(fingerprint, session_id);

            if !was_follower {
                let mut waiting = Vec::new();
                let mut active = false;
                for peer in inner.dedup.peers_of(fingerprint) {
                    match inner.sessions.get(peer).map(|s| s.state) {
                        Some(UploadState::OtherUploading) => waiting.push(peer.clone()),
                        Some(_) => active = true,
                        None => {}
                    }
                }
                if terminal.is_success() {
                    promoted = waiting;
                } else if !active {
                    promoted.extend(waiting.into_iter().take(1));
                }
            }
            for peer in &promoted {
                if let Some(s) = inner.sessions.get_mut(peer) {
                    s.state = UploadState::Waiting;
                }
            }
        }

        Some(Evicted { session, promoted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> Session {
        let (tx, _rx) = oneshot::channel();
        Session::new(
            id.into(),
            UploadFile::from_bytes("f.bin", b"data".to_vec()),
            BTreeMap::new(),
            tx,
        )
    }

    #[test]
    fn dedup_join_leave_peers() {
        let mut dedup = DedupRegistry::new();
        dedup.join("fp", "a");
        dedup.join("fp", "b");
        dedup.join("fp", "a");
        assert_eq!(dedup.peers_of("fp"), ["a", "b"]);
        assert!(dedup.contains("b"));

        assert!(dedup.leave("fp", "a"));
        assert!(!dedup.leave("fp", "a"));
        assert_eq!(dedup.peers_of("fp"), ["b"]);

        assert!(dedup.leave("fp", "b"));
        assert_eq!(dedup.group_count(), 0);
        assert!(dedup.peers_of("fp").is_empty());
    }

    #[test]
    fn second_identical_session_follows() {
        let reg = SessionRegistry::new();
        reg.insert(session("a"));
        reg.insert(session("b"));

        assert_eq!(reg.join_dedup("a", "fp"), Some(DedupRole::Uploader));
        assert_eq!(reg.join_dedup("b", "fp"), Some(DedupRole::Follower));
        assert_eq!(reg.state("b"), Some(UploadState::OtherUploading));
        assert_eq!(reg.peers_of("fp"), ["a", "b"]);
        assert_eq!(reg.join_dedup("gone", "fp"), None);
    }

    #[test]
    fn success_promotes_every_follower() {
        let reg = SessionRegistry::new();
        for id in ["a", "b", "c"] {
            reg.insert(session(id));
            reg.join_dedup(id, "fp");
        }

        let evicted = reg.evict("a", UploadState::Done).unwrap();
        assert_eq!(evicted.session.state, UploadState::Done);
        assert_eq!(evicted.promoted, ["b", "c"]);
        assert_eq!(reg.state("b"), Some(UploadState::Waiting));
        assert_eq!(reg.state("c"), Some(UploadState::Waiting));
        assert!(!reg.contains("a"));
        assert!(!reg.in_dedup_group("a"));
    }

    #[test]
    fn failure_promotes_first_follower_only() {
        let reg = SessionRegistry::new();
        for id in ["a", "b", "c"] {
            reg.insert(session(id));
            reg.join_dedup(id, "fp");
        }

        let evicted = reg.evict("a", UploadState::Canceled).unwrap();
        assert_eq!(evicted.promoted, ["b"]);
        assert_eq!(reg.state("c"), Some(UploadState::OtherUploading));

        // b took over the transfer; when it fails as well, c is next.
        let evicted = reg.evict("b", UploadState::RetryFailed).unwrap();
        assert_eq!(evicted.promoted, ["c"]);
    }

    #[test]
    fn follower_leaving_promotes_nobody() {
        let reg = SessionRegistry::new();
        for id in ["a", "b"] {
            reg.insert(session(id));
            reg.join_dedup(id, "fp");
        }
        let evicted = reg.evict("b", UploadState::Canceled).unwrap();
        assert!(evicted.promoted.is_empty());
        assert_eq!(reg.peers_of("fp"), ["a"]);
    }

    #[test]
    fn evict_twice_is_noop() {
        let reg = SessionRegistry::new();
        reg.insert(session("a"));
        assert!(reg.evict("a", UploadState::Canceled).is_some());
        assert!(reg.evict("a", UploadState::Canceled).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn task_ownership_generations() {
        let mut s = session("a");
        let first = s.claim_task().unwrap();
        assert!(s.claim_task().is_none());
        assert!(s.release_task(first));

        let second = s.claim_task().unwrap();
        assert_ne!(first, second);
        assert!(!s.release_task(first));
        assert!(s.release_task(second));
    }

    #[test]
    fn snapshot_and_record_reflect_state() {
        let reg = SessionRegistry::new();
        reg.insert(session("a"));
        reg.join_dedup("a", "fp");
        reg.with_session("a", |s| {
            s.state = UploadState::Pause;
            s.progress = 40.0;
            s.checkpoint = Some(PauseCheckpoint::Chunk(2));
        });

        let snap = reg.snapshot("a").unwrap();
        assert_eq!(snap.fingerprint.as_deref(), Some("fp"));
        assert_eq!(snap.file_size, 4);
        let rec = reg.record("a").unwrap();
        assert_eq!(rec.state, UploadState::Pause);
        assert_eq!(rec.checkpoint, Some(PauseCheckpoint::Chunk(2)));
    }
}
