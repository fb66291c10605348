//! Slack integration for the triage bot: Block Kit escalation cards,
//! socket-mode ingress for agent replies and card buttons, and the outbound
//! chat adapters the conversation engine posts through.

pub mod blocks;
pub mod client;
pub mod events;
pub mod socket;

pub use blocks::{
    escalation_card, plain_message, session_claimed_message, session_closed_message,
    MessageBuilder, MessageTemplate, ACTION_CLOSE_SESSION, ACTION_TAKE_SESSION,
};
pub use client::{ChatClient, ChatError, NoopChatClient, SlackMessenger, SlackNotifier};
pub use events::{
    default_dispatcher, AgentReplyService, BlockActionEvent, BlockActionHandler, EventContext,
    EventDispatcher, EventHandler, HandlerResult, NoopAgentReplyService, NoopSessionActionService,
    SessionActionOutcome, SessionActionService, SlackEnvelope, SlackEvent, SlackEventType,
    ThreadMessageEvent, ThreadMessageHandler,
};
pub use socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner, SocketTransport};
