use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::message::{ChannelId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Assigned,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Assigned => "assigned",
            Self::Closed => "closed",
        }
    }

    /// Active and assigned sessions are "open": they accept history entries
    /// and count toward the one-open-session-per-user invariant.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Customer,
    Bot,
    HumanAgent,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Bot => "bot",
            Self::HumanAgent => "human_agent",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePlatform {
    Widget,
    Slack,
}

impl MessagePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Widget => "widget",
            Self::Slack => "slack",
        }
    }
}

/// One append-only history entry. Timestamps are assigned server-side when
/// the entry is appended, never trusted from the sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub sender: SenderRole,
    pub sender_id: String,
    pub text: String,
    pub platform: MessagePlatform,
    pub recorded_at: DateTime<Utc>,
}

/// The durable escalation record tracking a conversation across the
/// AI/human ownership boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub thread_ref: Option<String>,
    pub state: SessionState,
    pub assigned_to: Option<String>,
    pub assigned_name: Option<String>,
    pub escalation_reason: String,
    pub escalated_at: DateTime<Utc>,
    pub history: Vec<SessionEntry>,
    pub ai_disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn open(
        user_id: UserId,
        channel_id: ChannelId,
        escalation_reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            user_id,
            channel_id,
            thread_ref: None,
            state: SessionState::Active,
            assigned_to: None,
            assigned_name: None,
            escalation_reason: escalation_reason.into(),
            escalated_at: now,
            history: Vec::new(),
            ai_disabled: false,
            created_at: now,
            updated_at: now,
        }
    }
}
