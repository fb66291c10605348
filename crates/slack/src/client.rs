//! Outbound chat surface. [`ChatClient`] abstracts the Web API call; the
//! adapters below map the engine's messenger ports onto it.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use triage_agent::services::{CustomerNotifier, HumanMessenger};
use triage_core::domain::session::ConversationSession;

use crate::blocks::{customer_relay_message, escalation_card, plain_message, MessageTemplate};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat api call failed: {0}")]
    Api(String),
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message, optionally into a thread. Returns the posted
    /// message's timestamp, which doubles as the thread reference.
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<String, ChatError>;
}

/// Stands in when no Slack workspace is configured. Posts nowhere and hands
/// back a synthetic timestamp so session plumbing still works.
#[derive(Default)]
pub struct NoopChatClient;

#[async_trait]
impl ChatClient for NoopChatClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<String, ChatError> {
        debug!(channel, thread_ts = thread_ts.unwrap_or(""), fallback = %message.fallback_text, "chat client in preview mode, message dropped");
        Ok("0000000000.000000".to_owned())
    }
}

/// Human side of the relay: escalation cards into the support channel and
/// customer messages into the session's thread.
pub struct SlackMessenger {
    client: Arc<dyn ChatClient>,
    escalation_channel: String,
}

impl SlackMessenger {
    pub fn new(client: Arc<dyn ChatClient>, escalation_channel: impl Into<String>) -> Self {
        Self { client, escalation_channel: escalation_channel.into() }
    }
}

#[async_trait]
impl HumanMessenger for SlackMessenger {
    async fn post_escalation(&self, session: &ConversationSession) -> Result<String> {
        let card = escalation_card(session);
        let ts = self
            .client
            .post_message(&self.escalation_channel, None, &card)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(ts)
    }

    async fn relay_to_agent(&self, session: &ConversationSession, text: &str) -> Result<()> {
        let Some(thread_ref) = session.thread_ref.as_deref() else {
            bail!("session {} has no escalation thread to relay into", session.id.0);
        };
        self.client
            .post_message(&self.escalation_channel, Some(thread_ref), &customer_relay_message(text))
            .await?;
        Ok(())
    }
}

/// Customer side of the relay when the customer surface is itself a Slack
/// channel.
pub struct SlackNotifier {
    client: Arc<dyn ChatClient>,
}

impl SlackNotifier {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CustomerNotifier for SlackNotifier {
    async fn notify(&self, channel_id: &str, text: &str) -> Result<()> {
        self.client.post_message(channel_id, None, &plain_message(text)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use triage_agent::services::{CustomerNotifier, HumanMessenger};
    use triage_core::domain::message::{ChannelId, UserId};
    use triage_core::domain::session::ConversationSession;

    use super::{ChatClient, ChatError, SlackMessenger, SlackNotifier};
    use crate::blocks::MessageTemplate;

    #[derive(Default)]
    struct RecordingChatClient {
        posts: Mutex<Vec<(String, Option<String>, String)>>,
    }

    #[async_trait]
    impl ChatClient for RecordingChatClient {
        async fn post_message(
            &self,
            channel: &str,
            thread_ts: Option<&str>,
            message: &MessageTemplate,
        ) -> Result<String, ChatError> {
            self.posts.lock().await.push((
                channel.to_owned(),
                thread_ts.map(str::to_owned),
                message.fallback_text.clone(),
            ));
            Ok("1730000000.1000".to_owned())
        }
    }

    fn session() -> ConversationSession {
        ConversationSession::open(
            UserId("U42".to_owned()),
            ChannelId("C-customer".to_owned()),
            "customer asked for a human",
        )
    }

    #[tokio::test]
    async fn escalation_card_goes_to_the_support_channel() {
        let client = Arc::new(RecordingChatClient::default());
        let messenger = SlackMessenger::new(client.clone(), "#support-escalations");

        let ts = messenger.post_escalation(&session()).await.expect("post");
        assert_eq!(ts, "1730000000.1000");

        let posts = client.posts.lock().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "#support-escalations");
        assert_eq!(posts[0].1, None);
    }

    #[tokio::test]
    async fn customer_messages_relay_into_the_session_thread() {
        let client = Arc::new(RecordingChatClient::default());
        let messenger = SlackMessenger::new(client.clone(), "#support-escalations");

        let mut session = session();
        session.thread_ref = Some("1730000000.1000".to_owned());
        messenger.relay_to_agent(&session, "still broken over here").await.expect("relay");

        let posts = client.posts.lock().await;
        assert_eq!(posts[0].1.as_deref(), Some("1730000000.1000"));
        assert!(posts[0].2.contains("still broken over here"));
    }

    #[tokio::test]
    async fn relay_without_thread_ref_is_an_error() {
        let messenger =
            SlackMessenger::new(Arc::new(RecordingChatClient::default()), "#support-escalations");
        let result = messenger.relay_to_agent(&session(), "hello").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn notifier_posts_to_the_customer_channel() {
        let client = Arc::new(RecordingChatClient::default());
        let notifier = SlackNotifier::new(client.clone());
        notifier.notify("C-customer", "an agent will be with you shortly").await.expect("notify");

        let posts = client.posts.lock().await;
        assert_eq!(posts[0].0, "C-customer");
    }
}
