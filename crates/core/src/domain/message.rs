use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

/// One inbound unit of conversation. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub thread_ref: Option<String>,
}

impl Message {
    pub fn new(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(Uuid::new_v4().to_string()),
            channel_id: ChannelId(channel_id.into()),
            user_id: UserId(user_id.into()),
            display_name: None,
            email: None,
            text: text.into(),
            received_at: Utc::now(),
            thread_ref: None,
        }
    }

    pub fn with_thread_ref(mut self, thread_ref: impl Into<String>) -> Self {
        self.thread_ref = Some(thread_ref.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}
