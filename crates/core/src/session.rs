//! Session lifecycle: pure state transitions over [`ConversationSession`]
//! plus the storage port the runtime persists through.
//!
//! Transitions are total functions returning `bool`. A refused transition
//! (wrong state) leaves the session untouched; callers log and move on
//! rather than treating it as an error.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::message::{ChannelId, UserId};
use crate::domain::session::{
    ConversationSession, MessagePlatform, SenderRole, SessionEntry, SessionId, SessionState,
};

/// active -> assigned. Sets `assigned_to` and `ai_disabled` together; the
/// two are never observable in an inconsistent combination.
pub fn assign(
    session: &mut ConversationSession,
    agent_id: &str,
    agent_name: &str,
    now: DateTime<Utc>,
) -> bool {
    if session.state != SessionState::Active {
        return false;
    }
    session.state = SessionState::Assigned;
    session.assigned_to = Some(agent_id.to_string());
    session.assigned_name = Some(agent_name.to_string());
    session.ai_disabled = true;
    session.updated_at = now;
    true
}

/// active or assigned -> closed. Closed is terminal.
pub fn close(session: &mut ConversationSession, now: DateTime<Utc>) -> bool {
    if session.state == SessionState::Closed {
        return false;
    }
    session.state = SessionState::Closed;
    session.updated_at = now;
    true
}

/// Append a history entry with a server-assigned timestamp. Refused on
/// closed sessions.
pub fn append(
    session: &mut ConversationSession,
    sender: SenderRole,
    sender_id: &str,
    text: &str,
    platform: MessagePlatform,
    now: DateTime<Utc>,
) -> bool {
    if session.state == SessionState::Closed {
        return false;
    }
    session.history.push(SessionEntry {
        sender,
        sender_id: sender_id.to_string(),
        text: text.to_string(),
        platform,
        recorded_at: now,
    });
    session.updated_at = now;
    true
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("open session already exists for user {0}")]
    Conflict(String),
    #[error("session record corrupt: {0}")]
    Corrupt(String),
}

/// Storage port for session records. The runtime depends on this trait,
/// never on a concrete store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Result<Option<ConversationSession>, SessionStoreError>;

    /// The user's open (active or assigned) session, if any. At most one
    /// exists per user.
    async fn find_open_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationSession>, SessionStoreError>;

    /// Open sessions assigned to the given agent identity, for relaying
    /// agent replies back to the customer.
    async fn find_assigned_to_agent(
        &self,
        agent_id: &str,
    ) -> Result<Vec<ConversationSession>, SessionStoreError>;

    /// Insert a new session. Returns [`SessionStoreError::Conflict`] when
    /// the user already has an open session.
    async fn insert(&self, session: &ConversationSession) -> Result<(), SessionStoreError>;

    /// Persist the session's current state, flags, and history.
    async fn update(&self, session: &ConversationSession) -> Result<(), SessionStoreError>;

    /// Maintenance: delete closed sessions last updated before the cutoff.
    /// Returns the number of sessions removed.
    async fn purge_closed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, SessionStoreError>;
}

/// Create a session for the user, or append to the existing open one.
///
/// Serializes the check-then-act through the store's conflict detection:
/// losing an insert race degrades to append-to-existing, so concurrent
/// escalations for one user converge on a single session.
pub async fn create_or_append(
    store: &dyn SessionStore,
    user_id: &UserId,
    channel_id: &ChannelId,
    reason: &str,
    entry: SessionEntry,
) -> Result<ConversationSession, SessionStoreError> {
    if let Some(mut existing) = store.find_open_by_user(user_id).await? {
        append_entry_and_update(store, &mut existing, entry).await?;
        return Ok(existing);
    }

    let mut session = ConversationSession::open(user_id.clone(), channel_id.clone(), reason);
    session.history.push(entry.clone());
    match store.insert(&session).await {
        Ok(()) => Ok(session),
        Err(SessionStoreError::Conflict(_)) => {
            // Lost the race; the winner's session is the session.
            let mut existing = store
                .find_open_by_user(user_id)
                .await?
                .ok_or_else(|| SessionStoreError::Corrupt(format!(
                    "conflict reported but no open session for user {}",
                    user_id.0
                )))?;
            append_entry_and_update(store, &mut existing, entry).await?;
            Ok(existing)
        }
        Err(other) => Err(other),
    }
}

async fn append_entry_and_update(
    store: &dyn SessionStore,
    session: &mut ConversationSession,
    entry: SessionEntry,
) -> Result<(), SessionStoreError> {
    append(
        session,
        entry.sender,
        &entry.sender_id,
        &entry.text,
        entry.platform,
        entry.recorded_at,
    );
    store.update(session).await
}

/// Mutex-backed store for tests and single-process setups.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, ConversationSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ConversationSession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<ConversationSession>, SessionStoreError> {
        Ok(self.lock().get(&id.0).cloned())
    }

    async fn find_open_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationSession>, SessionStoreError> {
        Ok(self
            .lock()
            .values()
            .find(|s| s.user_id == *user_id && s.state.is_open())
            .cloned())
    }

    async fn find_assigned_to_agent(
        &self,
        agent_id: &str,
    ) -> Result<Vec<ConversationSession>, SessionStoreError> {
        Ok(self
            .lock()
            .values()
            .filter(|s| {
                s.state == SessionState::Assigned && s.assigned_to.as_deref() == Some(agent_id)
            })
            .cloned()
            .collect())
    }

    async fn insert(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        let mut sessions = self.lock();
        let open_exists = sessions
            .values()
            .any(|s| s.user_id == session.user_id && s.state.is_open());
        if open_exists {
            return Err(SessionStoreError::Conflict(session.user_id.0.clone()));
        }
        sessions.insert(session.id.0.clone(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        self.lock().insert(session.id.0.clone(), session.clone());
        Ok(())
    }

    async fn purge_closed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, SessionStoreError> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.state != SessionState::Closed || s.updated_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::domain::message::{ChannelId, UserId};
    use crate::domain::session::{ConversationSession, MessagePlatform, SenderRole, SessionState};

    fn entry(text: &str) -> SessionEntry {
        SessionEntry {
            sender: SenderRole::Customer,
            sender_id: "U100".to_string(),
            text: text.to_string(),
            platform: MessagePlatform::Widget,
            recorded_at: Utc::now(),
        }
    }

    fn open_session() -> ConversationSession {
        ConversationSession::open(
            UserId("U100".to_string()),
            ChannelId("C1".to_string()),
            "test reason",
        )
    }

    #[test]
    fn assign_moves_active_to_assigned_and_disables_ai_atomically() {
        let mut session = open_session();
        assert!(assign(&mut session, "A1", "Agent Smith", Utc::now()));
        assert_eq!(session.state, SessionState::Assigned);
        assert!(session.ai_disabled);
        assert_eq!(session.assigned_to.as_deref(), Some("A1"));
        assert_eq!(session.assigned_name.as_deref(), Some("Agent Smith"));
    }

    #[test]
    fn assign_refuses_non_active_states() {
        let mut session = open_session();
        assign(&mut session, "A1", "Agent Smith", Utc::now());
        assert!(!assign(&mut session, "A2", "Agent Jones", Utc::now()));
        assert_eq!(session.assigned_to.as_deref(), Some("A1"));

        let mut closed = open_session();
        close(&mut closed, Utc::now());
        assert!(!assign(&mut closed, "A1", "Agent Smith", Utc::now()));
        assert_eq!(closed.state, SessionState::Closed);
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = open_session();
        assert!(close(&mut session, Utc::now()));
        assert!(!close(&mut session, Utc::now()));
        assert!(!assign(&mut session, "A1", "Agent", Utc::now()));
        assert!(!append(
            &mut session,
            SenderRole::Customer,
            "U100",
            "hello?",
            MessagePlatform::Widget,
            Utc::now()
        ));
        assert_eq!(session.state, SessionState::Closed);
        assert!(session.history.is_empty());
    }

    #[test]
    fn direct_close_from_active_is_valid() {
        let mut session = open_session();
        assert!(close(&mut session, Utc::now()));
        assert_eq!(session.state, SessionState::Closed);
    }

    #[test]
    fn append_is_accepted_in_any_open_state() {
        let mut session = open_session();
        assert!(append(
            &mut session,
            SenderRole::Bot,
            "bot",
            "connecting you",
            MessagePlatform::Widget,
            Utc::now()
        ));
        assign(&mut session, "A1", "Agent", Utc::now());
        assert!(append(
            &mut session,
            SenderRole::HumanAgent,
            "A1",
            "hi, taking over",
            MessagePlatform::Slack,
            Utc::now()
        ));
        assert_eq!(session.history.len(), 2);
    }

    #[tokio::test]
    async fn repeated_escalations_converge_on_one_session() {
        let store = InMemorySessionStore::new();
        let user = UserId("U100".to_string());
        let channel = ChannelId("C1".to_string());

        let first = create_or_append(&store, &user, &channel, "reason one", entry("help!"))
            .await
            .unwrap();
        let second = create_or_append(&store, &user, &channel, "reason two", entry("still broken"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.history.len(), 2);
        assert_eq!(second.history[1].text, "still broken");
        let open = store.find_open_by_user(&user).await.unwrap().unwrap();
        assert_eq!(open.history.len(), 2);
    }

    #[tokio::test]
    async fn closing_a_session_allows_a_fresh_one() {
        let store = InMemorySessionStore::new();
        let user = UserId("U100".to_string());
        let channel = ChannelId("C1".to_string());

        let mut first = create_or_append(&store, &user, &channel, "first", entry("one"))
            .await
            .unwrap();
        close(&mut first, Utc::now());
        store.update(&first).await.unwrap();

        let second = create_or_append(&store, &user, &channel, "second", entry("two"))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.history.len(), 1);
    }

    #[tokio::test]
    async fn insert_conflict_degrades_to_append() {
        let store = InMemorySessionStore::new();
        let user = UserId("U100".to_string());
        let channel = ChannelId("C1".to_string());

        let winner = ConversationSession::open(user.clone(), channel.clone(), "winner");
        store.insert(&winner).await.unwrap();

        let loser = ConversationSession::open(user.clone(), channel.clone(), "loser");
        match store.insert(&loser).await {
            Err(SessionStoreError::Conflict(uid)) => assert_eq!(uid, "U100"),
            other => panic!("expected conflict, got {other:?}"),
        }

        let converged = create_or_append(&store, &user, &channel, "loser", entry("racing"))
            .await
            .unwrap();
        assert_eq!(converged.id, winner.id);
    }

    #[tokio::test]
    async fn purge_removes_only_old_closed_sessions() {
        let store = InMemorySessionStore::new();
        let channel = ChannelId("C1".to_string());

        let mut old_closed =
            ConversationSession::open(UserId("U1".to_string()), channel.clone(), "old");
        close(&mut old_closed, Utc::now() - Duration::days(120));
        store.update(&old_closed).await.unwrap();

        let open = ConversationSession::open(UserId("U2".to_string()), channel.clone(), "open");
        store.insert(&open).await.unwrap();

        let purged = store
            .purge_closed_before(Utc::now() - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(&old_closed.id).await.unwrap().is_none());
        assert!(store.get(&open.id).await.unwrap().is_some());
    }
}
