use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use triage_core::domain::message::{ChannelId, UserId};
use triage_core::domain::session::{
    ConversationSession, MessagePlatform, SenderRole, SessionEntry, SessionId, SessionState,
};
use triage_core::session::{SessionStore, SessionStoreError};

use crate::DbPool;

pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<SessionEntry>, SessionStoreError> {
        let rows = sqlx::query(
            "SELECT sender, sender_id, content, platform, recorded_at
             FROM session_entries WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn load_with_history(
        &self,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<ConversationSession, SessionStoreError> {
        let mut session = row_to_session(row)?;
        session.history = self.load_history(&session.id.0).await?;
        Ok(session)
    }
}

const SESSION_COLUMNS: &str = "id, user_id, channel_id, thread_ref, state, assigned_to, \
     assigned_name, escalation_reason, escalated_at, ai_disabled, created_at, updated_at";

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<ConversationSession>, SessionStoreError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(ref r) => Ok(Some(self.load_with_history(r).await?)),
            None => Ok(None),
        }
    }

    async fn find_open_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationSession>, SessionStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = ? AND state IN ('active', 'assigned')"
        ))
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        match row {
            Some(ref r) => Ok(Some(self.load_with_history(r).await?)),
            None => Ok(None),
        }
    }

    async fn find_assigned_to_agent(
        &self,
        agent_id: &str,
    ) -> Result<Vec<ConversationSession>, SessionStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE state = 'assigned' AND assigned_to = ?
             ORDER BY updated_at DESC"
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(self.load_with_history(row).await?);
        }
        Ok(sessions)
    }

    async fn insert(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let inserted = sqlx::query(
            "INSERT INTO sessions (id, user_id, channel_id, thread_ref, state, assigned_to,
                                   assigned_name, escalation_reason, escalated_at, ai_disabled,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id.0)
        .bind(&session.user_id.0)
        .bind(&session.channel_id.0)
        .bind(&session.thread_ref)
        .bind(session.state.as_str())
        .bind(&session.assigned_to)
        .bind(&session.assigned_name)
        .bind(&session.escalation_reason)
        .bind(session.escalated_at.to_rfc3339())
        .bind(session.ai_disabled)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            let unique = error
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            return if unique {
                Err(SessionStoreError::Conflict(session.user_id.0.clone()))
            } else {
                Err(unavailable(error))
            };
        }

        insert_entries(&mut tx, &session.id.0, &session.history).await?;
        tx.commit().await.map_err(unavailable)
    }

    async fn update(&self, session: &ConversationSession) -> Result<(), SessionStoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query(
            "UPDATE sessions SET
                 thread_ref = ?, state = ?, assigned_to = ?, assigned_name = ?,
                 escalation_reason = ?, ai_disabled = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&session.thread_ref)
        .bind(session.state.as_str())
        .bind(&session.assigned_to)
        .bind(&session.assigned_name)
        .bind(&session.escalation_reason)
        .bind(session.ai_disabled)
        .bind(session.updated_at.to_rfc3339())
        .bind(&session.id.0)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        // History is append-only: persist only the entries beyond what the
        // table already holds.
        let stored: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM session_entries WHERE session_id = ?")
                .bind(&session.id.0)
                .fetch_one(&mut *tx)
                .await
                .map_err(unavailable)?
                .get("count");

        let new_entries = session.history.get(stored as usize..).unwrap_or(&[]);
        insert_entries(&mut tx, &session.id.0, new_entries).await?;
        tx.commit().await.map_err(unavailable)
    }

    async fn purge_closed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, SessionStoreError> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE state = 'closed' AND updated_at < ?")
                .bind(cutoff.to_rfc3339())
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
        Ok(result.rows_affected())
    }
}

async fn insert_entries(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session_id: &str,
    entries: &[SessionEntry],
) -> Result<(), SessionStoreError> {
    for entry in entries {
        sqlx::query(
            "INSERT INTO session_entries (session_id, sender, sender_id, content, platform, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(entry.sender.as_str())
        .bind(&entry.sender_id)
        .bind(&entry.text)
        .bind(entry.platform.as_str())
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?;
    }
    Ok(())
}

fn unavailable(error: sqlx::Error) -> SessionStoreError {
    SessionStoreError::Unavailable(error.to_string())
}

fn corrupt(detail: impl std::fmt::Display) -> SessionStoreError {
    SessionStoreError::Corrupt(detail.to_string())
}

fn parse_state(value: &str) -> Result<SessionState, SessionStoreError> {
    match value {
        "active" => Ok(SessionState::Active),
        "assigned" => Ok(SessionState::Assigned),
        "closed" => Ok(SessionState::Closed),
        other => Err(corrupt(format!("unknown session state `{other}`"))),
    }
}

fn parse_sender(value: &str) -> Result<SenderRole, SessionStoreError> {
    match value {
        "customer" => Ok(SenderRole::Customer),
        "bot" => Ok(SenderRole::Bot),
        "human_agent" => Ok(SenderRole::HumanAgent),
        other => Err(corrupt(format!("unknown sender role `{other}`"))),
    }
}

fn parse_platform(value: &str) -> Result<MessagePlatform, SessionStoreError> {
    match value {
        "widget" => Ok(MessagePlatform::Widget),
        "slack" => Ok(MessagePlatform::Slack),
        other => Err(corrupt(format!("unknown message platform `{other}`"))),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SessionStoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("invalid timestamp `{value}`: {e}")))
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationSession, SessionStoreError> {
    let id: String = row.try_get("id").map_err(corrupt)?;
    let user_id: String = row.try_get("user_id").map_err(corrupt)?;
    let channel_id: String = row.try_get("channel_id").map_err(corrupt)?;
    let thread_ref: Option<String> = row.try_get("thread_ref").map_err(corrupt)?;
    let state: String = row.try_get("state").map_err(corrupt)?;
    let assigned_to: Option<String> = row.try_get("assigned_to").map_err(corrupt)?;
    let assigned_name: Option<String> = row.try_get("assigned_name").map_err(corrupt)?;
    let escalation_reason: String = row.try_get("escalation_reason").map_err(corrupt)?;
    let escalated_at: String = row.try_get("escalated_at").map_err(corrupt)?;
    let ai_disabled: bool = row.try_get("ai_disabled").map_err(corrupt)?;
    let created_at: String = row.try_get("created_at").map_err(corrupt)?;
    let updated_at: String = row.try_get("updated_at").map_err(corrupt)?;

    Ok(ConversationSession {
        id: SessionId(id),
        user_id: UserId(user_id),
        channel_id: ChannelId(channel_id),
        thread_ref,
        state: parse_state(&state)?,
        assigned_to,
        assigned_name,
        escalation_reason,
        escalated_at: parse_timestamp(&escalated_at)?,
        history: Vec::new(),
        ai_disabled,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<SessionEntry, SessionStoreError> {
    let sender: String = row.try_get("sender").map_err(corrupt)?;
    let sender_id: String = row.try_get("sender_id").map_err(corrupt)?;
    let content: String = row.try_get("content").map_err(corrupt)?;
    let platform: String = row.try_get("platform").map_err(corrupt)?;
    let recorded_at: String = row.try_get("recorded_at").map_err(corrupt)?;

    Ok(SessionEntry {
        sender: parse_sender(&sender)?,
        sender_id,
        text: content,
        platform: parse_platform(&platform)?,
        recorded_at: parse_timestamp(&recorded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use triage_core::domain::message::{ChannelId, UserId};
    use triage_core::domain::session::{
        ConversationSession, MessagePlatform, SenderRole, SessionEntry, SessionState,
    };
    use triage_core::session::{self, SessionStore, SessionStoreError};

    use super::SqlSessionStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlSessionStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlSessionStore::new(pool)
    }

    fn sample_session(user: &str) -> ConversationSession {
        let mut session = ConversationSession::open(
            UserId(user.to_string()),
            ChannelId("C1".to_string()),
            "api errors in production",
        );
        session.history.push(SessionEntry {
            sender: SenderRole::Customer,
            sender_id: user.to_string(),
            text: "the API is down".to_string(),
            platform: MessagePlatform::Widget,
            recorded_at: Utc::now(),
        });
        session
    }

    #[tokio::test]
    async fn insert_and_get_round_trips_session_with_history() {
        let store = store().await;
        let session = sample_session("U100");
        store.insert(&session).await.expect("insert");

        let loaded = store.get(&session.id).await.expect("get").expect("present");
        assert_eq!(loaded.user_id, session.user_id);
        assert_eq!(loaded.state, SessionState::Active);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].text, "the API is down");
        assert!(!loaded.ai_disabled);
    }

    #[tokio::test]
    async fn second_open_insert_for_same_user_conflicts() {
        let store = store().await;
        store.insert(&sample_session("U100")).await.expect("first insert");

        match store.insert(&sample_session("U100")).await {
            Err(SessionStoreError::Conflict(user)) => assert_eq!(user, "U100"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_persists_transition_and_appends_only_new_entries() {
        let store = store().await;
        let mut session = sample_session("U100");
        store.insert(&session).await.expect("insert");

        session::assign(&mut session, "A1", "Agent Smith", Utc::now());
        session::append(
            &mut session,
            SenderRole::HumanAgent,
            "A1",
            "taking a look now",
            MessagePlatform::Slack,
            Utc::now(),
        );
        store.update(&session).await.expect("update");
        // Second update with no new entries must not duplicate history.
        store.update(&session).await.expect("idempotent update");

        let loaded = store.get(&session.id).await.expect("get").expect("present");
        assert_eq!(loaded.state, SessionState::Assigned);
        assert!(loaded.ai_disabled);
        assert_eq!(loaded.assigned_name.as_deref(), Some("Agent Smith"));
        assert_eq!(loaded.history.len(), 2);
    }

    #[tokio::test]
    async fn find_open_by_user_ignores_closed_sessions() {
        let store = store().await;
        let mut session = sample_session("U100");
        store.insert(&session).await.expect("insert");

        session::close(&mut session, Utc::now());
        store.update(&session).await.expect("close");

        assert!(store.find_open_by_user(&UserId("U100".to_string())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_assigned_to_agent_returns_only_that_agents_sessions() {
        let store = store().await;
        let mut mine = sample_session("U100");
        store.insert(&mine).await.expect("insert");
        session::assign(&mut mine, "A1", "Agent Smith", Utc::now());
        store.update(&mine).await.expect("assign");

        let mut other = sample_session("U200");
        store.insert(&other).await.expect("insert other");
        session::assign(&mut other, "A2", "Agent Jones", Utc::now());
        store.update(&other).await.expect("assign other");

        let assigned = store.find_assigned_to_agent("A1").await.expect("query");
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, mine.id);
    }

    #[tokio::test]
    async fn purge_deletes_old_closed_sessions_and_their_entries() {
        let store = store().await;
        let mut session = sample_session("U100");
        store.insert(&session).await.expect("insert");
        session::close(&mut session, Utc::now() - Duration::days(120));
        store.update(&session).await.expect("close");

        let purged =
            store.purge_closed_before(Utc::now() - Duration::days(90)).await.expect("purge");
        assert_eq!(purged, 1);
        assert!(store.get(&session.id).await.unwrap().is_none());
    }
}
