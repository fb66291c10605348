//! Escalation gate: the last pure decision point before a response leaves
//! the pipeline. Inspects the batch of handler responses for a message and
//! either releases the best answer or routes the conversation to a human.
//!
//! Session creation and persistence happen in the runtime; the gate only
//! decides and composes the user-facing escalation text.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::domain::response::{HandlerKind, HandlerResponse};
use crate::domain::session::SessionId;

/// Final routing decision for one message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GateDecision {
    /// Release the selected handler response to the customer.
    Answer(HandlerResponse),
    /// Hand the conversation to human assignment.
    Escalate { reason: String, source: Option<HandlerKind> },
}

impl GateDecision {
    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Escalate { .. })
    }
}

const BUSINESS_HOURS_START: u32 = 9;
const BUSINESS_HOURS_END: u32 = 18;

pub struct EscalationGate {
    thresholds: RoutingConfig,
}

impl EscalationGate {
    pub fn new(thresholds: RoutingConfig) -> Self {
        Self { thresholds }
    }

    /// Decide for a batch of handler responses, given in invocation order.
    ///
    /// Any escalation vote wins outright; the first escalating handler's
    /// reason is used. An empty batch escalates. Otherwise the primary
    /// handler's response is preferred when present, else the highest
    /// scoring response, and the result must still clear the confidence
    /// floor to be released.
    pub fn decide(&self, primary: HandlerKind, responses: &[HandlerResponse]) -> GateDecision {
        if let Some(escalating) = responses.iter().find(|r| r.should_escalate) {
            let reason = escalating
                .escalation_reason
                .clone()
                .unwrap_or_else(|| format!("{} handler requested escalation", escalating.handler.as_str()));
            return GateDecision::Escalate { reason, source: Some(escalating.handler) };
        }

        if responses.is_empty() {
            return GateDecision::Escalate {
                reason: "no valid handler response".to_string(),
                source: None,
            };
        }

        let best = responses
            .iter()
            .find(|r| r.handler == primary)
            .or_else(|| {
                responses.iter().max_by(|a, b| score(a).total_cmp(&score(b)))
            });

        match best {
            Some(response) if response.confidence >= self.thresholds.low_confidence_floor => {
                GateDecision::Answer(response.clone())
            }
            Some(response) => GateDecision::Escalate {
                reason: format!(
                    "low confidence response from {} handler",
                    response.handler.as_str()
                ),
                source: Some(response.handler),
            },
            None => GateDecision::Escalate {
                reason: "no valid handler response".to_string(),
                source: None,
            },
        }
    }

    /// Fixed-shape customer-facing escalation text. The handler's raw text
    /// is never exposed; only the reason and an expected response time.
    pub fn escalation_message(
        &self,
        session_id: Option<&SessionId>,
        reason: &str,
        urgent: bool,
        now: DateTime<Utc>,
    ) -> String {
        let expected = if urgent {
            "within 15 minutes"
        } else if is_business_hours(now) {
            "within 1 hour"
        } else {
            "on the next business day"
        };

        let mut message = format!(
            "I'm connecting you with a member of our team ({reason}). \
             You can expect a response {expected}."
        );
        if let Some(id) = session_id {
            message.push_str(&format!(" Your reference id is {}.", id.0));
        }
        message
    }
}

impl Default for EscalationGate {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

fn score(response: &HandlerResponse) -> f64 {
    // Small bonus keeps a direct answer ahead of an equally-confident
    // non-answer when the primary handler produced nothing.
    let bonus = if response.should_escalate { 0.0 } else { 0.05 };
    response.confidence + bonus
}

/// Weekday 09:00-18:00 UTC.
pub fn is_business_hours(now: DateTime<Utc>) -> bool {
    let weekday = now.weekday().number_from_monday();
    let hour = now.hour();
    weekday <= 5 && (BUSINESS_HOURS_START..BUSINESS_HOURS_END).contains(&hour)
}
