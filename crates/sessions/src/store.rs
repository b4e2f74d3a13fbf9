use std::sync::Arc;

use {
    dashmap::{DashMap, DashSet, mapref::entry::Entry},
    tokio::sync::{Mutex, MutexGuard},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use concierge_metrics::{gauge, sessions as session_metrics};

use crate::session::{Role, Session, SessionLimits, Turn};

/// Process-wide map of sender → session.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone, Default)]
pub struct SessionStore {
    limits: SessionLimits,
    sessions: Arc<DashMap<String, Arc<Mutex<Session>>>>,
    notified: Arc<DashSet<String>>,
}

/// A sender's session plus whether this lookup is the sender's first contact.
pub struct SessionHandle {
    sender: String,
    session: Arc<Mutex<Session>>,
    first_contact: bool,
}

impl SessionHandle {
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// `true` at most once per sender for the lifetime of the store: only for
    /// the lookup that created the session.
    #[must_use]
    pub fn first_contact(&self) -> bool {
        self.first_contact
    }

    /// Lock the sender's session. Hold the guard for the whole event so turns
    /// from concurrent deliveries for one sender never interleave.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            sessions: Arc::new(DashMap::new()),
            notified: Arc::new(DashSet::new()),
        }
    }

    #[must_use]
    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Return the sender's session, creating an empty one if needed.
    pub fn get_or_create(&self, sender: &str) -> SessionHandle {
        let (session, created) = self.entry(sender);
        // Only the call that created the session can claim first contact, and
        // the notified set makes that claim stick even if creation raced.
        let first_contact = created && self.notified.insert(sender.to_string());
        if first_contact {
            debug!(sender, sessions = self.sessions.len(), "session created");
        }
        SessionHandle {
            sender: sender.to_string(),
            session,
            first_contact,
        }
    }

    /// Append a turn to the sender's session (created if missing).
    pub async fn append_turn(&self, sender: &str, role: Role, content: impl Into<String>) {
        let (session, _) = self.entry(sender);
        session.lock().await.append_turn(role, content);
    }

    pub async fn record_last_reply(&self, sender: &str, text: impl Into<String>) {
        let (session, _) = self.entry(sender);
        session.lock().await.record_last_reply(text);
    }

    pub async fn last_reply(&self, sender: &str) -> Option<String> {
        let session = self.existing(sender)?;
        let guard = session.lock().await;
        guard.last_reply().map(str::to_string)
    }

    /// Snapshot of the sender's retained turns; empty for unknown senders.
    pub async fn history(&self, sender: &str) -> Vec<Turn> {
        match self.existing(sender) {
            Some(session) => session.lock().await.history(),
            None => Vec::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, sender: &str) -> bool {
        self.sessions.contains_key(sender)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn existing(&self, sender: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(sender).map(|s| Arc::clone(s.value()))
    }

    fn entry(&self, sender: &str) -> (Arc<Mutex<Session>>, bool) {
        let result = match self.sessions.entry(sender.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let session = Arc::new(Mutex::new(Session::new(self.limits)));
                entry.insert(Arc::clone(&session));
                (session, true)
            },
        };
        #[cfg(feature = "metrics")]
        {
            if result.1 {
                gauge!(session_metrics::ACTIVE).set(self.sessions.len() as f64);
            }
        }
        result
    }
}
