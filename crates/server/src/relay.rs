//! Glue between socket-mode events and the conversation runtime: agent
//! thread replies flow back to the customer, card buttons drive the session
//! machine.

use std::sync::Arc;

use async_trait::async_trait;

use triage_agent::runtime::TriageRuntime;
use triage_core::domain::session::SessionId;
use triage_slack::blocks::MessageTemplate;
use triage_slack::events::{
    AgentReplyService, EventContext, EventHandlerError, SessionActionOutcome,
    SessionActionService, ThreadMessageEvent,
};

#[derive(Clone)]
pub struct RuntimeAgentGateway {
    runtime: Arc<TriageRuntime>,
}

impl RuntimeAgentGateway {
    pub fn new(runtime: Arc<TriageRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl AgentReplyService for RuntimeAgentGateway {
    async fn handle_agent_reply(
        &self,
        event: &ThreadMessageEvent,
        _ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        self.runtime
            .relay_agent_reply(&event.user_id, &event.text, Some(&event.thread_ts))
            .await
            .map_err(|error| EventHandlerError::AgentReply(error.to_string()))?;
        Ok(None)
    }
}

#[async_trait]
impl SessionActionService for RuntimeAgentGateway {
    async fn take_session(
        &self,
        session_id: &str,
        agent_id: &str,
        agent_name: &str,
        _ctx: &EventContext,
    ) -> Result<SessionActionOutcome, EventHandlerError> {
        let id = SessionId(session_id.to_owned());
        let assigned = self
            .runtime
            .assign_session(&id, agent_id, agent_name)
            .await
            .map_err(|error| EventHandlerError::SessionAction(error.to_string()))?;

        Ok(if assigned {
            SessionActionOutcome::Assigned {
                session_id: session_id.to_owned(),
                agent_name: agent_name.to_owned(),
            }
        } else {
            SessionActionOutcome::Refused {
                session_id: session_id.to_owned(),
                detail: "already assigned or closed".to_owned(),
            }
        })
    }

    async fn close_session(
        &self,
        session_id: &str,
        _ctx: &EventContext,
    ) -> Result<SessionActionOutcome, EventHandlerError> {
        let id = SessionId(session_id.to_owned());
        let closed = self
            .runtime
            .close_session(&id)
            .await
            .map_err(|error| EventHandlerError::SessionAction(error.to_string()))?;

        Ok(if closed {
            SessionActionOutcome::Closed { session_id: session_id.to_owned() }
        } else {
            SessionActionOutcome::Refused {
                session_id: session_id.to_owned(),
                detail: "already closed or unknown".to_owned(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use triage_agent::classify::FallbackClassifier;
    use triage_agent::handlers::{
        EscalationHandler, HandlerSet, KnowledgeHandler, SchedulerHandler, TechnicalHandler,
    };
    use triage_agent::runtime::{RuntimeDeps, TriageRuntime};
    use triage_agent::services::{
        NoopCalendarService, NoopCustomerNotifier, NoopHumanMessenger, NoopKnowledgeService,
    };
    use triage_core::audit::InMemoryAuditSink;
    use triage_core::config::AppConfig;
    use triage_core::session::InMemorySessionStore;
    use triage_slack::events::{EventContext, SessionActionOutcome, SessionActionService};

    use super::RuntimeAgentGateway;

    fn runtime() -> Arc<TriageRuntime> {
        let config = AppConfig::default();
        Arc::new(TriageRuntime::new(
            config.routing.clone(),
            RuntimeDeps {
                classifier: Arc::new(FallbackClassifier::pattern_only(config.routing.clone())),
                handlers: HandlerSet {
                    knowledge: KnowledgeHandler::new(
                        Arc::new(NoopKnowledgeService),
                        &config.knowledge,
                    ),
                    scheduler: SchedulerHandler::new(
                        Arc::new(NoopCalendarService),
                        &config.calendar,
                    ),
                    technical: TechnicalHandler,
                    escalation: EscalationHandler,
                },
                sessions: Arc::new(InMemorySessionStore::new()),
                messenger: Arc::new(NoopHumanMessenger),
                notifier: Arc::new(NoopCustomerNotifier),
                audit: Arc::new(InMemoryAuditSink::default()),
            },
        ))
    }

    #[tokio::test]
    async fn taking_an_unknown_session_is_refused_not_an_error() {
        let gateway = RuntimeAgentGateway::new(runtime());
        let outcome = gateway
            .take_session("no-such-session", "A1", "Dana", &EventContext::default())
            .await
            .expect("take");
        assert!(matches!(outcome, SessionActionOutcome::Refused { .. }));
    }

    #[tokio::test]
    async fn taking_an_open_session_assigns_it() {
        let rt = runtime();
        let escalated = rt
            .process_customer_message(triage_core::domain::message::Message::new(
                "C1",
                "U1",
                "connect me to a human please",
            ))
            .await;
        let session_id = escalated.session_id.expect("session");

        let gateway = RuntimeAgentGateway::new(rt);
        let outcome = gateway
            .take_session(&session_id, "A1", "Dana", &EventContext::default())
            .await
            .expect("take");
        assert_eq!(
            outcome,
            SessionActionOutcome::Assigned { session_id, agent_name: "Dana".to_owned() }
        );
    }
}
