//! Responder handlers. A closed set selected by enum tag; the planner never
//! probes handlers for willingness.

use anyhow::Result;

use triage_core::domain::intent::IntentResult;
use triage_core::domain::message::Message;
use triage_core::domain::response::{HandlerKind, HandlerResponse};
use triage_core::moderation::ModerationResult;

pub mod escalation;
pub mod knowledge;
pub mod scheduler;
pub mod technical;

pub use escalation::EscalationHandler;
pub use knowledge::KnowledgeHandler;
pub use scheduler::SchedulerHandler;
pub use technical::TechnicalHandler;

/// Everything a handler may consult for one message.
pub struct HandlerContext<'a> {
    pub message: &'a Message,
    pub intent: &'a IntentResult,
    pub moderation: &'a ModerationResult,
}

pub struct HandlerSet {
    pub knowledge: KnowledgeHandler,
    pub scheduler: SchedulerHandler,
    pub technical: TechnicalHandler,
    pub escalation: EscalationHandler,
}

impl HandlerSet {
    pub async fn handle(
        &self,
        kind: HandlerKind,
        context: &HandlerContext<'_>,
    ) -> Result<HandlerResponse> {
        match kind {
            HandlerKind::Knowledge => self.knowledge.handle(context).await,
            HandlerKind::Scheduler => self.scheduler.handle(context).await,
            HandlerKind::Technical => self.technical.handle(context).await,
            HandlerKind::Escalation => self.escalation.handle(context).await,
        }
    }
}
