//! Session registry.
//!
//! Maps session id → session. A session is created on first client attach
//! and destroyed when its last client leaves or an explicit end arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info};

use lingcast_transport::{Listener, ListenerHub};

use crate::entitlements::Entitlements;

/// One live event.
pub struct Session {
    session_id: String,
    tenant_id: Option<String>,
    hub: ListenerHub,
    entitlements: Entitlements,
    created_at: Instant,
}

impl Session {
    /// Creates a session with its entitlement snapshot.
    pub fn new(
        session_id: impl Into<String>,
        tenant_id: Option<String>,
        entitlements: Entitlements,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tenant_id,
            hub: ListenerHub::new(),
            entitlements,
            created_at: Instant::now(),
        }
    }

    /// Returns the session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the owning tenant id, if any.
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Returns the listener hub.
    pub fn hub(&self) -> &ListenerHub {
        &self.hub
    }

    /// Returns the entitlement snapshot cached at attach time.
    pub fn entitlements(&self) -> &Entitlements {
        &self.entitlements
    }

    /// Returns how long the session has existed.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

/// Outcome of removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// The listener was present and has been removed.
    pub removed: bool,
    /// The session had no listeners left and has been destroyed.
    pub session_closed: bool,
}

/// Registry of live sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `session_id`, creating it on first attach.
    ///
    /// `make` supplies the tenant id and entitlement snapshot when the
    /// session does not exist yet.
    pub fn get_or_create<F>(&self, session_id: &str, make: F) -> Arc<Session>
    where
        F: FnOnce() -> (Option<String>, Entitlements),
    {
        if let Some(session) = self.sessions.read().get(session_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write();
        // Lost the race: someone created it between the locks.
        if let Some(session) = sessions.get(session_id) {
            return session.clone();
        }

        let (tenant_id, entitlements) = make();
        let session = Arc::new(Session::new(session_id, tenant_id, entitlements));
        sessions.insert(session_id.to_string(), session.clone());
        info!(session_id, "session created");
        session
    }

    /// Looks up a session.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true when no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Adds a listener to a session. Returns false when the session does
    /// not exist.
    pub fn add_listener(&self, session_id: &str, listener: Arc<Listener>) -> bool {
        match self.get(session_id) {
            Some(session) => {
                session.hub().insert(listener);
                true
            }
            None => false,
        }
    }

    /// Removes a listener; destroys the session when it was the last one.
    pub fn remove_listener(&self, session_id: &str, client_id: &str) -> RemoveOutcome {
        let Some(session) = self.get(session_id) else {
            return RemoveOutcome {
                removed: false,
                session_closed: false,
            };
        };

        let removed = session.hub().remove(client_id).is_some();
        let session_closed = removed && session.hub().is_empty();
        if session_closed {
            self.sessions.write().remove(session_id);
            info!(session_id, "last listener left, session destroyed");
        } else if removed {
            debug!(session_id, client_id, "listener removed");
        }

        RemoveOutcome {
            removed,
            session_closed,
        }
    }

    /// Updates a listener's language subscription.
    pub fn update_listener_language(
        &self,
        session_id: &str,
        client_id: &str,
        lang: Option<String>,
    ) -> bool {
        self.get(session_id)
            .map(|s| s.hub().update_language(client_id, lang))
            .unwrap_or(false)
    }

    /// Lists listeners of a session whose subscription matches `lang`.
    pub fn listeners_by_language(&self, session_id: &str, lang: &str) -> Vec<Arc<Listener>> {
        self.get(session_id)
            .map(|s| s.hub().listeners_by_language(lang))
            .unwrap_or_default()
    }

    /// Returns the distinct languages subscribed on a session.
    pub fn session_languages(&self, session_id: &str) -> Vec<String> {
        self.get(session_id)
            .map(|s| s.hub().languages())
            .unwrap_or_default()
    }

    /// Removes a session explicitly, returning it for teardown.
    pub fn end_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().remove(session_id);
        if session.is_some() {
            info!(session_id, "session ended");
        }
        session
    }
}
