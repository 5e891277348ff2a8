//! Process-wide session map and progress fan-out, grounded on
//! `AppSession`/`Inner` (a `parking_lot::Mutex`-guarded shared state struct)
//! and `run_source` (spawn the background work, pump results back in).

use cache::FileCache;
use model::{ReplayState, ReplaySession, SessionIdentity};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telemetry_adapter::UpstreamAdapter;
use tokio::sync::mpsc;

use crate::config::Config;

#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub state: ReplayState,
    pub progress_pct: u8,
    pub message: Option<String>,
}

pub struct SessionEntry {
    pub identity: SessionIdentity,
    pub session: SyncMutex<ReplaySession>,
    pub cancelled: AtomicBool,
    /// Present only when the frame count is at or below the
    /// pre-serialization threshold; otherwise frames are serialized on
    /// demand as they're streamed.
    pub serialized_frames: SyncMutex<Option<Vec<Vec<u8>>>>,
    subscribers: SyncMutex<Vec<mpsc::UnboundedSender<ProgressEvent>>>,
}

impl SessionEntry {
    fn new(identity: SessionIdentity) -> Self {
        Self {
            session: SyncMutex::new(ReplaySession::new(identity.clone())),
            identity,
            cancelled: AtomicBool::new(false),
            serialized_frames: SyncMutex::new(None),
            subscribers: SyncMutex::new(Vec::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ReplayState {
        self.session.lock().state
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Updates session state and fans the event out to every subscriber.
    /// A subscriber whose receiver has been dropped is pruned; a send
    /// failure for one subscriber never affects the others.
    pub fn emit_progress(&self, state: ReplayState, pct: u8, message: Option<String>) {
        {
            let mut guard = self.session.lock();
            guard.state = state;
            guard.progress_pct = pct;
            if let Some(msg) = &message {
                if state == ReplayState::Error {
                    guard.metadata.error = Some(msg.clone());
                }
            }
        }
        let event = ProgressEvent { state, progress_pct: pct, message };
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

pub struct SessionManager {
    pub adapter: Arc<dyn UpstreamAdapter>,
    pub cache: Arc<FileCache>,
    pub config: Config,
    sessions: SyncMutex<HashMap<String, Arc<SessionEntry>>>,
}

impl SessionManager {
    pub fn new(adapter: Arc<dyn UpstreamAdapter>, cache: Arc<FileCache>, config: Config) -> Arc<Self> {
        Arc::new(Self { adapter, cache, config, sessions: SyncMutex::new(HashMap::new()) })
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Creates (or returns the existing) session. With `refresh = true` the
    /// prior loader, if still running, is cancelled cooperatively and a
    /// fresh entry replaces it.
    pub fn create_session(self: &Arc<Self>, identity: SessionIdentity, refresh: bool) -> Arc<SessionEntry> {
        let session_id = identity.session_id();
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&session_id) {
            if !refresh {
                return existing.clone();
            }
            existing.cancelled.store(true, Ordering::Relaxed);
        }
        let entry = Arc::new(SessionEntry::new(identity.clone()));
        sessions.insert(session_id, entry.clone());
        drop(sessions);

        let manager = self.clone();
        let entry_for_task = entry.clone();
        tokio::spawn(async move {
            crate::loader::run_load(manager, entry_for_task).await;
        });
        entry
    }
}
