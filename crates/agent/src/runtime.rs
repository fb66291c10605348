//! Message pipeline orchestration: relay gating, moderation, classification,
//! planning, handler execution, the escalation gate, and response assembly.
//!
//! The runtime owns every side effect in the pipeline. Classification,
//! planning, and gating stay pure; sessions, relays, and audit all happen
//! here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use triage_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use triage_core::config::RoutingConfig;
use triage_core::domain::intent::{CategoryScores, ClassificationMethod, Intent, IntentMetadata, IntentResult};
use triage_core::domain::message::Message;
use triage_core::domain::response::{HandlerKind, HandlerResponse, OutboundResponse, SlotOption};
use triage_core::domain::session::{
    ConversationSession, MessagePlatform, SenderRole, SessionEntry, SessionId,
};
use triage_core::gate::{EscalationGate, GateDecision};
use triage_core::moderation::{ModerationFilter, ModerationResult};
use triage_core::planner::{ExecutionPlan, ExecutionPlanner};
use triage_core::session::{self, SessionStore, SessionStoreError};

use crate::classify::IntentClassifier;
use crate::handlers::{HandlerContext, HandlerSet};
use crate::services::{CustomerNotifier, HumanMessenger};

/// Everything the runtime orchestrates, injected at construction.
pub struct RuntimeDeps {
    pub classifier: Arc<dyn IntentClassifier>,
    pub handlers: HandlerSet,
    pub sessions: Arc<dyn SessionStore>,
    pub messenger: Arc<dyn HumanMessenger>,
    pub notifier: Arc<dyn CustomerNotifier>,
    pub audit: Arc<dyn AuditSink>,
}

pub struct TriageRuntime {
    classifier: Arc<dyn IntentClassifier>,
    moderation: ModerationFilter,
    planner: ExecutionPlanner,
    gate: EscalationGate,
    handlers: HandlerSet,
    sessions: Arc<dyn SessionStore>,
    messenger: Arc<dyn HumanMessenger>,
    notifier: Arc<dyn CustomerNotifier>,
    audit: Arc<dyn AuditSink>,
    handler_timeout: Duration,
    message_budget: Duration,
}

struct PipelineOutcome {
    decision: GateDecision,
    plan: Option<ExecutionPlan>,
    responses: Vec<HandlerResponse>,
    urgent: bool,
    suggested: Option<String>,
}

impl TriageRuntime {
    pub fn new(routing: RoutingConfig, deps: RuntimeDeps) -> Self {
        Self {
            classifier: deps.classifier,
            moderation: ModerationFilter::new(),
            planner: ExecutionPlanner::new(routing.clone()),
            gate: EscalationGate::new(routing.clone()),
            handlers: deps.handlers,
            sessions: deps.sessions,
            messenger: deps.messenger,
            notifier: deps.notifier,
            audit: deps.audit,
            handler_timeout: Duration::from_secs(routing.handler_timeout_secs),
            message_budget: Duration::from_secs(routing.message_budget_secs),
        }
    }

    /// Process one inbound customer message end to end. Never fails: every
    /// internal error degrades to an escalation response.
    pub async fn process_customer_message(&self, message: Message) -> OutboundResponse {
        let started = Instant::now();
        let correlation_id = Uuid::new_v4().to_string();
        self.audit.emit(AuditEvent::new(
            None,
            Some(message.id.0.clone()),
            correlation_id.clone(),
            "message.received",
            AuditCategory::Ingress,
            "runtime",
            AuditOutcome::Success,
        ));

        // Relay gating comes before everything else. Once a human owns the
        // conversation the classifier never sees the customer's words.
        match self.sessions.find_open_by_user(&message.user_id).await {
            Ok(Some(session)) if session.ai_disabled => {
                return self
                    .relay_customer_message(&message, session, &correlation_id, started)
                    .await;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(error = %error, "session lookup failed, continuing without relay check");
            }
        }

        let outcome = match tokio::time::timeout(
            self.message_budget,
            self.run_pipeline(&message, &correlation_id),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(message_id = %message.id.0, "message budget exhausted");
                PipelineOutcome {
                    decision: GateDecision::Escalate {
                        reason: "the assistant took too long to respond".to_string(),
                        source: None,
                    },
                    plan: None,
                    responses: Vec::new(),
                    urgent: false,
                    suggested: None,
                }
            }
        };

        match outcome.decision {
            GateDecision::Answer(chosen) => {
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        Some(message.id.0.clone()),
                        correlation_id.clone(),
                        "gate.answered",
                        AuditCategory::Gate,
                        chosen.handler.as_str(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("confidence", format!("{:.2}", chosen.confidence)),
                );
                let (text, options) = compose_answer(outcome.plan.as_ref(), &chosen, &outcome.responses);
                OutboundResponse {
                    text,
                    options,
                    escalated: false,
                    session_id: None,
                    processing_ms: started.elapsed().as_millis() as u64,
                }
            }
            GateDecision::Escalate { reason, source } => {
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        Some(message.id.0.clone()),
                        correlation_id.clone(),
                        "gate.escalated",
                        AuditCategory::Gate,
                        source.map(|s| s.as_str()).unwrap_or("gate"),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("reason", reason.clone()),
                );
                let (mut text, session_id) = self
                    .escalate_customer(&message, &reason, outcome.urgent, &correlation_id)
                    .await;
                if let Some(suggestion) = outcome.suggested {
                    text = format!("{suggestion} {text}");
                }
                if let Some(interim) =
                    fallback_interim_answer(outcome.plan.as_ref(), &outcome.responses)
                {
                    text = format!("{text}\n\nIn the meantime: {interim}");
                }
                OutboundResponse {
                    text,
                    options: Vec::new(),
                    escalated: true,
                    session_id: session_id.map(|id| id.0),
                    processing_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    async fn run_pipeline(&self, message: &Message, correlation_id: &str) -> PipelineOutcome {
        let moderation = self.moderation.analyze(&message.text);

        // A hostile message never reaches the classifier; it already has a
        // destination.
        let intent = if moderation.is_hostile {
            synthetic_escalation_intent()
        } else {
            self.classifier.classify(&message.text).await
        };
        self.audit.emit(
            AuditEvent::new(
                None,
                Some(message.id.0.clone()),
                correlation_id.to_string(),
                "intent.classified",
                AuditCategory::Classification,
                "classifier",
                AuditOutcome::Success,
            )
            .with_metadata("intent", intent.intent.as_str())
            .with_metadata("confidence", format!("{:.2}", intent.confidence)),
        );

        let plan = self.planner.plan(&message.text, &intent, &moderation);
        self.audit.emit(
            AuditEvent::new(
                None,
                Some(message.id.0.clone()),
                correlation_id.to_string(),
                "plan.created",
                AuditCategory::Planning,
                "planner",
                AuditOutcome::Success,
            )
            .with_metadata("primary", plan.primary.as_str())
            .with_metadata("handler_count", plan.handlers.len().to_string()),
        );

        let context = HandlerContext { message, intent: &intent, moderation: &moderation };
        let mut responses = if plan.sequential {
            let mut collected = Vec::with_capacity(plan.handlers.len());
            for kind in &plan.handlers {
                collected.push(self.invoke(*kind, &context).await);
            }
            collected
        } else {
            futures::future::join_all(
                plan.handlers.iter().map(|kind| self.invoke(*kind, &context)),
            )
            .await
        };

        // The fallback handler only runs once the primary has voted to
        // escalate; its answer supplements the handoff text rather than
        // replacing the escalation.
        if let Some(fallback) = plan.fallback {
            let primary_escalated =
                responses.iter().any(|r| r.handler == plan.primary && r.should_escalate);
            if primary_escalated && !plan.handlers.contains(&fallback) {
                debug!(
                    fallback = fallback.as_str(),
                    "primary escalated, consulting fallback handler"
                );
                responses.push(self.invoke(fallback, &context).await);
            }
        }
        for response in &responses {
            self.audit.emit(
                AuditEvent::new(
                    None,
                    Some(message.id.0.clone()),
                    correlation_id.to_string(),
                    "handler.completed",
                    AuditCategory::Handler,
                    response.handler.as_str(),
                    if response.should_escalate { AuditOutcome::Rejected } else { AuditOutcome::Success },
                )
                .with_metadata("confidence", format!("{:.2}", response.confidence)),
            );
        }

        let decision = self.gate.decide(plan.primary, &responses);
        PipelineOutcome {
            decision,
            plan: Some(plan),
            responses,
            urgent: intent.metadata.urgent,
            suggested: moderation.suggested_response,
        }
    }

    async fn invoke(&self, kind: HandlerKind, context: &HandlerContext<'_>) -> HandlerResponse {
        match tokio::time::timeout(self.handler_timeout, self.handlers.handle(kind, context)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(handler = kind.as_str(), error = %error, "handler failed");
                HandlerResponse::handler_failure(kind)
            }
            Err(_) => {
                warn!(handler = kind.as_str(), "handler timed out");
                HandlerResponse::handler_failure(kind)
            }
        }
    }

    /// Route the conversation to a human: open (or rejoin) the session, post
    /// the escalation card, and compose the customer-facing handoff text.
    ///
    /// A session-store outage never silences the customer. The handoff text
    /// still goes out, just without a reference id, and the card is posted
    /// best-effort against an unpersisted session.
    async fn escalate_customer(
        &self,
        message: &Message,
        reason: &str,
        urgent: bool,
        correlation_id: &str,
    ) -> (String, Option<SessionId>) {
        let entry = SessionEntry {
            sender: SenderRole::Customer,
            sender_id: message.user_id.0.clone(),
            text: message.text.clone(),
            platform: MessagePlatform::Widget,
            recorded_at: Utc::now(),
        };

        match session::create_or_append(
            self.sessions.as_ref(),
            &message.user_id,
            &message.channel_id,
            reason,
            entry,
        )
        .await
        {
            Ok(mut session) => {
                if session.thread_ref.is_none() {
                    match self.messenger.post_escalation(&session).await {
                        Ok(thread_ref) if !thread_ref.is_empty() => {
                            session.thread_ref = Some(thread_ref);
                            if let Err(error) = self.sessions.update(&session).await {
                                warn!(error = %error, "failed to persist escalation thread ref");
                            }
                        }
                        Ok(_) => {}
                        Err(error) => {
                            warn!(error = %error, "failed to post escalation card");
                        }
                    }
                }

                self.audit.emit(
                    AuditEvent::new(
                        Some(session.id.clone()),
                        Some(message.id.0.clone()),
                        correlation_id.to_string(),
                        "session.escalated",
                        AuditCategory::Session,
                        "runtime",
                        AuditOutcome::Success,
                    )
                    .with_metadata("reason", reason.to_string()),
                );

                let text =
                    self.gate.escalation_message(Some(&session.id), reason, urgent, Utc::now());
                session::append(
                    &mut session,
                    SenderRole::Bot,
                    "triage-bot",
                    &text,
                    MessagePlatform::Widget,
                    Utc::now(),
                );
                if let Err(error) = self.sessions.update(&session).await {
                    warn!(error = %error, "failed to record handoff reply in session history");
                }
                (text, Some(session.id))
            }
            Err(store_error) => {
                error!(error = %store_error, "session store unavailable during escalation");
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        Some(message.id.0.clone()),
                        correlation_id.to_string(),
                        "session.escalation_failed",
                        AuditCategory::Session,
                        "runtime",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", store_error.to_string()),
                );

                let ephemeral = ConversationSession::open(
                    message.user_id.clone(),
                    message.channel_id.clone(),
                    reason,
                );
                if let Err(error) = self.messenger.post_escalation(&ephemeral).await {
                    warn!(error = %error, "best-effort escalation card also failed");
                }
                (self.gate.escalation_message(None, reason, urgent, Utc::now()), None)
            }
        }
    }

    /// Forward a customer message into the assigned agent's thread. No bot
    /// reply is produced while a human owns the conversation.
    async fn relay_customer_message(
        &self,
        message: &Message,
        mut session: ConversationSession,
        correlation_id: &str,
        started: Instant,
    ) -> OutboundResponse {
        session::append(
            &mut session,
            SenderRole::Customer,
            &message.user_id.0,
            &message.text,
            MessagePlatform::Widget,
            Utc::now(),
        );
        if let Err(error) = self.sessions.update(&session).await {
            warn!(error = %error, "failed to persist relayed customer message");
        }
        if let Err(error) = self.messenger.relay_to_agent(&session, &message.text).await {
            warn!(error = %error, "failed to relay customer message to agent");
        }
        self.audit.emit(AuditEvent::new(
            Some(session.id.clone()),
            Some(message.id.0.clone()),
            correlation_id.to_string(),
            "relay.customer_to_agent",
            AuditCategory::Relay,
            "runtime",
            AuditOutcome::Success,
        ));

        OutboundResponse {
            text: String::new(),
            options: Vec::new(),
            escalated: true,
            session_id: Some(session.id.0),
            processing_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Relay a human agent's reply back to the customer surface. When the
    /// agent has several assigned sessions, `thread_ref` disambiguates;
    /// otherwise the most recently updated session receives the reply.
    pub async fn relay_agent_reply(
        &self,
        agent_id: &str,
        text: &str,
        thread_ref: Option<&str>,
    ) -> Result<Option<SessionId>, SessionStoreError> {
        let mut assigned = self.sessions.find_assigned_to_agent(agent_id).await?;
        assigned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let session = match thread_ref {
            Some(wanted) => assigned.into_iter().find(|s| s.thread_ref.as_deref() == Some(wanted)),
            None => assigned.into_iter().next(),
        };
        let Some(mut session) = session else {
            debug!(agent_id, "no assigned session for agent reply");
            return Ok(None);
        };

        session::append(
            &mut session,
            SenderRole::HumanAgent,
            agent_id,
            text,
            MessagePlatform::Slack,
            Utc::now(),
        );
        self.sessions.update(&session).await?;
        if let Err(error) = self.notifier.notify(&session.channel_id.0, text).await {
            warn!(error = %error, "failed to deliver agent reply to customer");
        }
        self.audit.emit(AuditEvent::new(
            Some(session.id.clone()),
            None,
            Uuid::new_v4().to_string(),
            "relay.agent_to_customer",
            AuditCategory::Relay,
            agent_id,
            AuditOutcome::Success,
        ));
        Ok(Some(session.id))
    }

    /// A human takes the session. From here until close, the AI is out of
    /// the conversation.
    pub async fn assign_session(
        &self,
        session_id: &SessionId,
        agent_id: &str,
        agent_name: &str,
    ) -> Result<bool, SessionStoreError> {
        let Some(mut session) = self.sessions.get(session_id).await? else {
            return Ok(false);
        };
        if !session::assign(&mut session, agent_id, agent_name, Utc::now()) {
            debug!(session_id = %session_id.0, state = session.state.as_str(), "assign refused");
            return Ok(false);
        }
        self.sessions.update(&session).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(session.id.clone()),
                None,
                Uuid::new_v4().to_string(),
                "session.assigned",
                AuditCategory::Session,
                agent_id,
                AuditOutcome::Success,
            )
            .with_metadata("agent_name", agent_name.to_string()),
        );

        let greeting = format!("You're now chatting with {agent_name} from our team.");
        if let Err(error) = self.notifier.notify(&session.channel_id.0, &greeting).await {
            warn!(error = %error, "failed to announce agent takeover");
        }
        info!(session_id = %session.id.0, agent_id, "session assigned");
        Ok(true)
    }

    pub async fn close_session(&self, session_id: &SessionId) -> Result<bool, SessionStoreError> {
        let Some(mut session) = self.sessions.get(session_id).await? else {
            return Ok(false);
        };
        if !session::close(&mut session, Utc::now()) {
            return Ok(false);
        }
        self.sessions.update(&session).await?;
        self.audit.emit(AuditEvent::new(
            Some(session.id.clone()),
            None,
            Uuid::new_v4().to_string(),
            "session.closed",
            AuditCategory::Session,
            "runtime",
            AuditOutcome::Success,
        ));
        info!(session_id = %session.id.0, "session closed");
        Ok(true)
    }
}

/// Stands in for a classification when moderation already decided the route.
fn synthetic_escalation_intent() -> IntentResult {
    IntentResult {
        intent: Intent::Escalation,
        confidence: 1.0,
        scores: CategoryScores::default(),
        method: ClassificationMethod::Pattern,
        metadata: IntentMetadata::default(),
    }
}

/// The fallback handler's non-escalating answer, if one was collected. Rides
/// along with the handoff so the customer gets something useful while they
/// wait for a human.
fn fallback_interim_answer<'a>(
    plan: Option<&ExecutionPlan>,
    responses: &'a [HandlerResponse],
) -> Option<&'a str> {
    let fallback = plan?.fallback?;
    responses
        .iter()
        .find(|r| r.handler == fallback && !r.should_escalate && !r.text.is_empty())
        .map(|r| r.text.as_str())
}

/// Assemble the outbound text from the gate's pick. Sequential plans compose
/// the companion answer ahead of the primary's; slot options ride along as
/// structured data for the surface to render.
fn compose_answer(
    plan: Option<&ExecutionPlan>,
    chosen: &HandlerResponse,
    responses: &[HandlerResponse],
) -> (String, Vec<SlotOption>) {
    let mut text = chosen.text.clone();
    if plan.is_some_and(|p| p.sequential) {
        if let Some(companion) = responses
            .iter()
            .find(|r| r.handler != chosen.handler && !r.should_escalate && !r.text.is_empty())
        {
            text = format!("{}\n\n{}", companion.text, text);
        }
    }

    let options = chosen
        .metadata
        .get("slot_options")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();
    (text, options)
}
