//! Conversation engine for the support triage bot.
//!
//! Wires the pure pipeline stages from `triage-core` (moderation,
//! classification, planning, gating) to the side-effecting world: responder
//! handlers, external services, session persistence, and the human relay.
//! [`runtime::TriageRuntime`] is the single entry point; interfaces construct
//! it once and feed it messages.

pub mod classify;
pub mod handlers;
pub mod http;
pub mod llm;
pub mod runtime;
pub mod services;

pub use classify::{FallbackClassifier, IntentClassifier};
pub use handlers::{
    EscalationHandler, HandlerContext, HandlerSet, KnowledgeHandler, SchedulerHandler,
    TechnicalHandler,
};
pub use http::{HttpCalendarService, HttpKnowledgeService};
pub use llm::{HttpLlmClassifier, LlmClassification, LlmClassifier};
pub use runtime::{RuntimeDeps, TriageRuntime};
pub use services::{
    CalendarService, CustomerNotifier, HumanMessenger, KnowledgeAnswer, KnowledgeService,
    MeetingOutcome, MeetingRequest, NoopCalendarService, NoopCustomerNotifier, NoopHumanMessenger,
    NoopKnowledgeService, Slot,
};
