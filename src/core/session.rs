//! Server-side browser sessions.
//!
//! A session moves through three states:
//!
//! ```text
//! Anonymous --login--> Authenticated(user) --chat view--> Active(user, character)
//!     ^                                                         |
//!     +---------------------- logout / expiry ------------------+
//! ```
//!
//! The browser only holds an opaque session id; everything else lives in a
//! [`SessionStore`]. Request handlers receive the resolved state as a [`SessionContext`]
//! instead of reaching for ambient globals.

use crate::config::AppConfig;
use crate::core::error::ChatError;
use di::{Ref, injectable};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Who a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated(Identity),
    Active {
        identity: Identity,
        character_code: String,
    },
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticated(identity) => Some(identity),
            SessionState::Active { identity, .. } => Some(identity),
        }
    }

    pub fn active_character(&self) -> Option<&str> {
        match self {
            SessionState::Active { character_code, .. } => Some(character_code),
            _ => None,
        }
    }
}

/// Owner of all session data. The only place the active character may be changed.
pub trait SessionStore: Send + Sync {
    /// Starts a fresh authenticated session.
    fn start(&self, identity: Identity) -> SessionId;

    /// Resolves a session id, renewing its lifetime. Unknown or expired ids are
    /// anonymous.
    fn load(&self, id: SessionId) -> SessionState;

    /// Returns `false` when the session is gone.
    fn set_active_character(&self, id: SessionId, character_code: &str) -> bool;

    fn destroy(&self, id: SessionId);

    /// Drops every expired session and reports how many went.
    fn purge_expired(&self) -> usize;
}

struct SessionRecord {
    identity: Identity,
    active_character: Option<String>,
    last_seen: Instant,
}

impl SessionRecord {
    fn state(&self) -> SessionState {
        match &self.active_character {
            Some(code) => SessionState::Active {
                identity: self.identity.clone(),
                character_code: code.clone(),
            },
            None => SessionState::Authenticated(self.identity.clone()),
        }
    }
}

/// Process-local session store with a sliding inactivity timeout.
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

#[injectable(SessionStore)]
impl MemorySessionStore {
    #[inject]
    pub fn create(config: Ref<AppConfig>) -> MemorySessionStore {
        MemorySessionStore::with_ttl(config.session_ttl)
    }
}

impl MemorySessionStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        MemorySessionStore {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, record: &SessionRecord, now: Instant) -> bool {
        now.duration_since(record.last_seen) >= self.ttl
    }
}

impl SessionStore for MemorySessionStore {
    fn start(&self, identity: Identity) -> SessionId {
        let id = Uuid::new_v4();
        debug!("session {id} started for {}", identity.username);

        self.sessions().insert(
            id,
            SessionRecord {
                identity,
                active_character: None,
                last_seen: Instant::now(),
            },
        );

        id
    }

    fn load(&self, id: SessionId) -> SessionState {
        let now = Instant::now();
        let mut sessions = self.sessions();

        match sessions.get_mut(&id) {
            Some(record) if !self.is_expired(record, now) => {
                record.last_seen = now;
                record.state()
            }
            Some(_) => {
                debug!("session {id} expired");
                sessions.remove(&id);
                SessionState::Anonymous
            }
            None => SessionState::Anonymous,
        }
    }

    fn set_active_character(&self, id: SessionId, character_code: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.sessions();

        match sessions.get_mut(&id) {
            Some(record) if !self.is_expired(record, now) => {
                record.active_character = Some(character_code.to_owned());
                record.last_seen = now;
                true
            }
            _ => false,
        }
    }

    fn destroy(&self, id: SessionId) {
        self.sessions().remove(&id);
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, record| now.duration_since(record.last_seen) < self.ttl);
        before - sessions.len()
    }
}

/// The caller's session as seen by one request.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: Option<SessionId>,
    state: SessionState,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        SessionContext {
            id: None,
            state: SessionState::Anonymous,
        }
    }

    pub fn resolve(store: &dyn SessionStore, id: Option<SessionId>) -> Self {
        match id {
            Some(id) => SessionContext {
                id: Some(id),
                state: store.load(id),
            },
            None => SessionContext::anonymous(),
        }
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn require_authenticated(&self) -> Result<&Identity, ChatError> {
        self.state.identity().ok_or(ChatError::Unauthorized)
    }

    /// Send-message gate: a signed-in user who has opened a chat view.
    pub fn require_active(&self) -> Result<(&Identity, &str), ChatError> {
        let identity = self.require_authenticated()?;
        let character = self
            .state
            .active_character()
            .ok_or(ChatError::NoActiveCharacter)?;
        Ok((identity, character))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "alice".to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_walks_through_states() {
        let store = MemorySessionStore::with_ttl(Duration::from_secs(3600));
        let identity = alice();

        let id = store.start(identity.clone());
        assert_eq!(store.load(id), SessionState::Authenticated(identity.clone()));

        assert!(store.set_active_character(id, "eldrin"));
        assert_eq!(
            store.load(id),
            SessionState::Active {
                identity,
                character_code: "eldrin".to_owned()
            }
        );

        store.destroy(id);
        assert_eq!(store.load(id), SessionState::Anonymous);
        assert!(!store.set_active_character(id, "eldrin"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_after_inactivity() {
        let store = MemorySessionStore::with_ttl(Duration::from_secs(3600));
        let id = store.start(alice());

        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(store.load(id), SessionState::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_renews_sliding_window() {
        let store = MemorySessionStore::with_ttl(Duration::from_secs(3600));
        let id = store.start(alice());

        tokio::time::advance(Duration::from_secs(3000)).await;
        assert!(store.load(id).identity().is_some());

        tokio::time::advance(Duration::from_secs(3000)).await;
        assert!(store.load(id).identity().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_only_expired_sessions() {
        let store = MemorySessionStore::with_ttl(Duration::from_secs(60));
        store.start(alice());

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = store.start(alice());

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.load(fresh).identity().is_some());
    }

    #[test]
    fn test_context_gates() {
        let anonymous = SessionContext::anonymous();
        assert!(matches!(
            anonymous.require_authenticated(),
            Err(ChatError::Unauthorized)
        ));
        assert!(matches!(
            anonymous.require_active(),
            Err(ChatError::Unauthorized)
        ));

        let signed_in = SessionContext {
            id: Some(Uuid::new_v4()),
            state: SessionState::Authenticated(alice()),
        };
        assert!(signed_in.require_authenticated().is_ok());
        assert!(matches!(
            signed_in.require_active(),
            Err(ChatError::NoActiveCharacter)
        ));

        let active = SessionContext {
            id: Some(Uuid::new_v4()),
            state: SessionState::Active {
                identity: alice(),
                character_code: "eldrin".to_owned(),
            },
        };
        let (identity, character) = active.require_active().unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(character, "eldrin");
    }

    #[test]
    fn test_resolve_unknown_id_is_anonymous() {
        let store = MemorySessionStore::with_ttl(Duration::from_secs(60));
        let ctx = SessionContext::resolve(&store, Some(Uuid::new_v4()));
        assert_eq!(ctx.state(), &SessionState::Anonymous);
    }
}
