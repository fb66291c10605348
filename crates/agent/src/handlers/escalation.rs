use anyhow::Result;

use triage_core::domain::response::{HandlerKind, HandlerResponse};

use super::HandlerContext;

/// Never answers directly. Escalation is never uncertain, so confidence is
/// always 1.0; actual human routing belongs to the gate and session machine.
pub struct EscalationHandler;

impl EscalationHandler {
    pub async fn handle(&self, context: &HandlerContext<'_>) -> Result<HandlerResponse> {
        let reason = if context.moderation.is_hostile {
            "hostile language detected"
        } else if context.moderation.is_connection_request {
            "customer asked for a human"
        } else {
            "escalation requested"
        };

        let mut response = HandlerResponse::escalate(HandlerKind::Escalation, reason, 1.0);
        if let Some(suggested) = &context.moderation.suggested_response {
            response = response.with_metadata("suggested_response", suggested.clone());
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use triage_core::domain::intent::IntentResult;
    use triage_core::domain::message::Message;
    use triage_core::moderation::ModerationFilter;

    use super::EscalationHandler;
    use crate::handlers::HandlerContext;

    #[tokio::test]
    async fn always_escalates_with_full_confidence() {
        let message = Message::new("C1", "U1", "you guys are trash");
        let intent = IntentResult::default_information(0.60);
        let moderation = ModerationFilter::new().analyze(&message.text);
        let context = HandlerContext { message: &message, intent: &intent, moderation: &moderation };

        let response = EscalationHandler.handle(&context).await.expect("handle");
        assert!(response.should_escalate);
        assert!((response.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(response.escalation_reason.as_deref(), Some("hostile language detected"));
        assert!(response.metadata.contains_key("suggested_response"));
    }
}
