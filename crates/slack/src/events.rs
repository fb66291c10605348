//! Socket-mode event model and dispatch.
//!
//! Two event families matter to the relay: thread messages (agents replying
//! inside an escalation thread) and block actions (the take/close buttons on
//! escalation cards). Everything else is acknowledged and dropped.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{
    session_claimed_message, session_closed_message, MessageTemplate, ACTION_CLOSE_SESSION,
    ACTION_TAKE_SESSION,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    ThreadMessage(ThreadMessageEvent),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::ThreadMessage(_) => SlackEventType::ThreadMessage,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    ThreadMessage,
    BlockAction,
    Unsupported,
}

/// A message posted inside a thread the bot watches. `thread_ts` is the
/// thread reference stored on the session when the escalation card was
/// posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadMessageEvent {
    pub channel_id: String,
    pub thread_ts: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub text: String,
    pub is_bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub thread_ts: Option<String>,
    pub user_id: String,
    pub user_name: Option<String>,
    pub action_id: String,
    pub value: Option<String>,
}

impl BlockActionEvent {
    /// The session id carried on take/close buttons.
    pub fn session_id(&self) -> Option<&str> {
        self.value.as_deref().filter(|value| !value.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("agent reply handler failure: {0}")]
    AgentReply(String),
    #[error("session action handler failure: {0}")]
    SessionAction(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ThreadMessageHandler::new(NoopAgentReplyService));
    dispatcher.register(BlockActionHandler::new(NoopSessionActionService));
    dispatcher
}

/// Delivers an agent's thread reply to the customer side of the relay.
#[async_trait]
pub trait AgentReplyService: Send + Sync {
    async fn handle_agent_reply(
        &self,
        event: &ThreadMessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError>;
}

pub struct ThreadMessageHandler<S> {
    service: S,
}

impl<S> ThreadMessageHandler<S>
where
    S: AgentReplyService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ThreadMessageHandler<S>
where
    S: AgentReplyService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ThreadMessage
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ThreadMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        // The bot's own thread posts (relayed customer messages) must not
        // echo back to the customer.
        if event.is_bot {
            return Ok(HandlerResult::Processed);
        }

        let message = self.service.handle_agent_reply(event, ctx).await?;
        Ok(match message {
            Some(message) => HandlerResult::Responded(message),
            None => HandlerResult::Processed,
        })
    }
}

#[derive(Default)]
pub struct NoopAgentReplyService;

#[async_trait]
impl AgentReplyService for NoopAgentReplyService {
    async fn handle_agent_reply(
        &self,
        _event: &ThreadMessageEvent,
        _ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        Ok(None)
    }
}

/// Outcome of a take/close button press, as decided by the session machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionActionOutcome {
    Assigned { session_id: String, agent_name: String },
    Closed { session_id: String },
    Refused { session_id: String, detail: String },
}

#[async_trait]
pub trait SessionActionService: Send + Sync {
    async fn take_session(
        &self,
        session_id: &str,
        agent_id: &str,
        agent_name: &str,
        ctx: &EventContext,
    ) -> Result<SessionActionOutcome, EventHandlerError>;

    async fn close_session(
        &self,
        session_id: &str,
        ctx: &EventContext,
    ) -> Result<SessionActionOutcome, EventHandlerError>;
}

pub struct BlockActionHandler<S> {
    service: S,
}

impl<S> BlockActionHandler<S>
where
    S: SessionActionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: SessionActionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(session_id) = event.session_id() else {
            return Err(EventHandlerError::SessionAction(format!(
                "action `{}` carried no session id",
                event.action_id
            )));
        };

        let outcome = match event.action_id.as_str() {
            ACTION_TAKE_SESSION => {
                let agent_name = event.user_name.clone().unwrap_or_else(|| event.user_id.clone());
                self.service.take_session(session_id, &event.user_id, &agent_name, ctx).await?
            }
            ACTION_CLOSE_SESSION => self.service.close_session(session_id, ctx).await?,
            _ => return Ok(HandlerResult::Processed),
        };

        Ok(match outcome {
            SessionActionOutcome::Assigned { session_id, agent_name } => {
                HandlerResult::Responded(session_claimed_message(&session_id, &agent_name))
            }
            SessionActionOutcome::Closed { session_id } => {
                HandlerResult::Responded(session_closed_message(&session_id))
            }
            SessionActionOutcome::Refused { session_id, detail } => HandlerResult::Responded(
                crate::blocks::plain_message(&format!("Session {session_id}: {detail}")),
            ),
        })
    }
}

#[derive(Default)]
pub struct NoopSessionActionService;

#[async_trait]
impl SessionActionService for NoopSessionActionService {
    async fn take_session(
        &self,
        session_id: &str,
        _agent_id: &str,
        agent_name: &str,
        _ctx: &EventContext,
    ) -> Result<SessionActionOutcome, EventHandlerError> {
        Ok(SessionActionOutcome::Assigned {
            session_id: session_id.to_owned(),
            agent_name: agent_name.to_owned(),
        })
    }

    async fn close_session(
        &self,
        session_id: &str,
        _ctx: &EventContext,
    ) -> Result<SessionActionOutcome, EventHandlerError> {
        Ok(SessionActionOutcome::Closed { session_id: session_id.to_owned() })
    }
}
