//! Block Kit message construction. Templates are plain data; posting them is
//! the chat client's job.

use serde::Serialize;

use triage_core::domain::session::{ConversationSession, SenderRole};

pub const ACTION_TAKE_SESSION: &str = "session.take.v1";
pub const ACTION_CLOSE_SESSION: &str = "session.close.v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

const HISTORY_PREVIEW_LINES: usize = 3;

/// Escalation card posted to the support channel when a conversation is
/// routed to humans. The take/close buttons carry the session id as their
/// value.
pub fn escalation_card(session: &ConversationSession) -> MessageTemplate {
    let mut builder =
        MessageBuilder::new(format!("Escalation from <@{}>: {}", session.user_id.0, session.escalation_reason))
            .section("escalation.header.v1", |section| {
                section.mrkdwn(format!(
                    "*New escalation* from <@{}>\n*Reason:* {}",
                    session.user_id.0, session.escalation_reason
                ));
            });

    let preview = history_preview(session);
    if !preview.is_empty() {
        builder = builder.section("escalation.history.v1", |section| {
            section.mrkdwn(preview);
        });
    }

    builder
        .actions("escalation.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(ACTION_TAKE_SESSION, "Take it")
                        .style(ButtonStyle::Primary)
                        .value(session.id.0.clone()),
                )
                .button(
                    ButtonElement::new(ACTION_CLOSE_SESSION, "Close")
                        .style(ButtonStyle::Danger)
                        .value(session.id.0.clone()),
                );
        })
        .context("escalation.meta.v1", |context| {
            context.plain(format!(
                "Session {} | escalated {}",
                session.id.0,
                session.escalated_at.format("%Y-%m-%d %H:%M UTC")
            ));
        })
        .build()
}

fn history_preview(session: &ConversationSession) -> String {
    session
        .history
        .iter()
        .rev()
        .take(HISTORY_PREVIEW_LINES)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|entry| {
            let who = match entry.sender {
                SenderRole::Customer => "Customer",
                SenderRole::Bot => "Bot",
                SenderRole::HumanAgent => "Agent",
            };
            format!("> *{who}:* {}", entry.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Confirmation posted into the escalation thread when an agent takes the
/// session.
pub fn session_claimed_message(session_id: &str, agent_name: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{agent_name} took session {session_id}"))
        .section("session.claimed.v1", |section| {
            section.mrkdwn(format!(
                "*{agent_name}* is now handling this conversation. The bot has stepped back."
            ));
        })
        .context("session.claimed.meta.v1", |context| {
            context.plain(format!("Session {session_id}"));
        })
        .build()
}

pub fn session_closed_message(session_id: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Session {session_id} closed"))
        .section("session.closed.v1", |section| {
            section.plain("This conversation has been closed. New messages from the customer will start fresh with the bot.");
        })
        .context("session.closed.meta.v1", |context| {
            context.plain(format!("Session {session_id}"));
        })
        .build()
}

/// Customer message relayed into the escalation thread.
pub fn customer_relay_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Customer: {text}"))
        .section("relay.customer.v1", |section| {
            section.mrkdwn(format!("*Customer:* {text}"));
        })
        .build()
}

pub fn plain_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(text)
        .section("message.plain.v1", |section| {
            section.plain(text);
        })
        .build()
}

#[cfg(test)]
mod tests {
    use triage_core::domain::message::{ChannelId, UserId};
    use triage_core::domain::session::{ConversationSession, MessagePlatform, SenderRole, SessionEntry};

    use super::{escalation_card, session_claimed_message, Block, ACTION_CLOSE_SESSION, ACTION_TAKE_SESSION};

    fn session_with_history() -> ConversationSession {
        let mut session = ConversationSession::open(
            UserId("U42".to_owned()),
            ChannelId("C1".to_owned()),
            "customer asked for a human",
        );
        for text in ["hello", "I need help", "connect me to a person"] {
            session.history.push(SessionEntry {
                sender: SenderRole::Customer,
                sender_id: "U42".to_owned(),
                text: text.to_owned(),
                platform: MessagePlatform::Widget,
                recorded_at: chrono::Utc::now(),
            });
        }
        session
    }

    #[test]
    fn escalation_card_carries_session_id_on_both_buttons() {
        let session = session_with_history();
        let card = escalation_card(&session);

        let buttons: Vec<_> = card
            .blocks
            .iter()
            .filter_map(|block| match block {
                Block::Actions { elements, .. } => Some(elements),
                _ => None,
            })
            .flatten()
            .collect();

        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0].action_id, ACTION_TAKE_SESSION);
        assert_eq!(buttons[1].action_id, ACTION_CLOSE_SESSION);
        for button in buttons {
            assert_eq!(button.value.as_deref(), Some(session.id.0.as_str()));
        }
    }

    #[test]
    fn escalation_card_previews_recent_history() {
        let card = escalation_card(&session_with_history());
        let serialized = serde_json::to_string(&card).expect("serialize");
        assert!(serialized.contains("connect me to a person"));
        assert!(serialized.contains("customer asked for a human"));
    }

    #[test]
    fn claimed_message_names_the_agent() {
        let message = session_claimed_message("sess-1", "Dana");
        assert!(message.fallback_text.contains("Dana"));
        assert!(message.fallback_text.contains("sess-1"));
    }
}
