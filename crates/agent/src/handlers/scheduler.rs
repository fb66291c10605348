use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use triage_core::config::CalendarConfig;
use triage_core::domain::response::{HandlerKind, HandlerResponse, SlotOption};

use super::HandlerContext;
use crate::services::{CalendarService, MeetingRequest, Slot};

const MEETING_TYPE: &str = "demo";

/// Demo-booking responder. Tracks a small per-conversation state machine:
/// a fresh request offers slots, a follow-up selection books one. Never
/// escalates on the happy path; only when the calendar service is down or
/// a booking attempt fails.
pub struct SchedulerHandler {
    calendar: Arc<dyn CalendarService>,
    days_ahead: u32,
    max_slots: u32,
    pending_offers: Mutex<HashMap<String, Vec<Slot>>>,
}

impl SchedulerHandler {
    pub fn new(calendar: Arc<dyn CalendarService>, config: &CalendarConfig) -> Self {
        Self {
            calendar,
            days_ahead: config.days_ahead,
            max_slots: config.max_slots,
            pending_offers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, context: &HandlerContext<'_>) -> Result<HandlerResponse> {
        let user_key = context.message.user_id.0.clone();
        let pending = self.take_pending(&user_key);

        match pending {
            Some(offers) => match select_slot(context, &offers) {
                Some(slot) => self.book(context, slot).await,
                None => {
                    // Not a recognizable selection; re-offer the same slots.
                    self.store_pending(&user_key, offers.clone());
                    Ok(offer_response(&offers, "Here are the available times again:"))
                }
            },
            None => self.offer_slots(context, &user_key).await,
        }
    }

    async fn offer_slots(
        &self,
        _context: &HandlerContext<'_>,
        user_key: &str,
    ) -> Result<HandlerResponse> {
        if !self.calendar.is_available().await {
            return Ok(HandlerResponse::escalate(
                HandlerKind::Scheduler,
                "calendar service unavailable",
                0.0,
            ));
        }

        let slots = match self
            .calendar
            .get_available_slots(self.days_ahead, MEETING_TYPE, self.max_slots)
            .await
        {
            Ok(slots) => slots,
            Err(error) => {
                debug!(error = %error, "slot lookup failed");
                return Ok(HandlerResponse::escalate(
                    HandlerKind::Scheduler,
                    "calendar service unavailable",
                    0.0,
                ));
            }
        };

        if slots.is_empty() {
            return Ok(HandlerResponse::escalate(
                HandlerKind::Scheduler,
                "calendar returned no availability",
                0.0,
            ));
        }

        self.store_pending(user_key, slots.clone());
        Ok(offer_response(
            &slots,
            "I'd be happy to set up a demo. Here are the available times:",
        ))
    }

    async fn book(&self, context: &HandlerContext<'_>, slot: Slot) -> Result<HandlerResponse> {
        let request = MeetingRequest {
            slot_id: slot.slot_id.clone(),
            attendee_id: context.message.user_id.0.clone(),
            attendee_name: context.message.display_name.clone(),
            attendee_email: context.message.email.clone(),
            meeting_type: MEETING_TYPE.to_string(),
        };

        let outcome = match self.calendar.create_meeting(request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(error = %error, "booking call failed");
                return Ok(HandlerResponse::escalate(
                    HandlerKind::Scheduler,
                    "booking attempt failed",
                    0.0,
                ));
            }
        };

        if !outcome.success {
            return Ok(HandlerResponse::escalate(
                HandlerKind::Scheduler,
                format!(
                    "booking attempt failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown calendar error".to_string())
                ),
                0.0,
            ));
        }

        let mut response = HandlerResponse::answer(
            HandlerKind::Scheduler,
            format!("You're booked for {}. A calendar invite is on its way.", slot.label),
            0.95,
        );
        if let Some(event_id) = outcome.event_id {
            response = response.with_metadata("event_id", event_id);
        }
        Ok(response.with_metadata("slot_id", slot.slot_id))
    }

    fn take_pending(&self, user_key: &str) -> Option<Vec<Slot>> {
        self.lock_pending().remove(user_key)
    }

    fn store_pending(&self, user_key: &str, slots: Vec<Slot>) {
        self.lock_pending().insert(user_key.to_string(), slots);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Slot>>> {
        match self.pending_offers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Resolve a follow-up message against the offered slots: a numbered choice,
/// a day-name choice, or a bare confirmation taking the first offer.
fn select_slot(context: &HandlerContext<'_>, offers: &[Slot]) -> Option<Slot> {
    if let Some(index) = context.intent.metadata.slot_selection {
        return offers.get(index.saturating_sub(1) as usize).cloned();
    }

    let lower = context.message.text.to_lowercase();
    for slot in offers {
        let label = slot.label.to_lowercase();
        let day = label.split_whitespace().next().unwrap_or_default();
        if !day.is_empty() && lower.contains(day) {
            return Some(slot.clone());
        }
    }

    let confirmation = ["yes", "confirm", "sounds good", "that works", "ok", "sure"];
    let trimmed = lower.trim().trim_end_matches(['.', '!']);
    if confirmation.contains(&trimmed) {
        return offers.first().cloned();
    }

    None
}

fn offer_response(slots: &[Slot], lead: &str) -> HandlerResponse {
    let options: Vec<SlotOption> = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| SlotOption {
            index: (i + 1) as u32,
            label: slot.label.clone(),
            slot_id: slot.slot_id.clone(),
        })
        .collect();

    let mut lines = vec![lead.to_string()];
    for option in &options {
        lines.push(format!("{}. {}", option.index, option.label));
    }
    lines.push("Reply with a number to book one.".to_string());

    let response = HandlerResponse::answer(HandlerKind::Scheduler, lines.join("\n"), 0.90);
    match serde_json::to_string(&options) {
        Ok(encoded) => response.with_metadata("slot_options", encoded),
        Err(_) => response,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use triage_core::classifier::PatternClassifier;
    use triage_core::config::CalendarConfig;
    use triage_core::domain::message::Message;
    use triage_core::moderation::ModerationResult;

    use super::SchedulerHandler;
    use crate::handlers::HandlerContext;
    use crate::services::{CalendarService, MeetingOutcome, MeetingRequest, Slot};

    struct FakeCalendar {
        available: bool,
        booking_succeeds: bool,
    }

    #[async_trait]
    impl CalendarService for FakeCalendar {
        async fn get_available_slots(
            &self,
            _days_ahead: u32,
            _meeting_type: &str,
            max: u32,
        ) -> Result<Vec<Slot>> {
            if !self.available {
                return Err(anyhow!("calendar upstream down"));
            }
            Ok(vec![
                Slot {
                    slot_id: "slot-1".to_string(),
                    label: "Tuesday 10:00".to_string(),
                    starts_at: "2025-06-10T10:00:00Z".to_string(),
                },
                Slot {
                    slot_id: "slot-2".to_string(),
                    label: "Wednesday 14:00".to_string(),
                    starts_at: "2025-06-11T14:00:00Z".to_string(),
                },
            ]
            .into_iter()
            .take(max as usize)
            .collect())
        }

        async fn create_meeting(&self, request: MeetingRequest) -> Result<MeetingOutcome> {
            if self.booking_succeeds {
                Ok(MeetingOutcome {
                    success: true,
                    event_id: Some(format!("evt-{}", request.slot_id)),
                    error: None,
                })
            } else {
                Ok(MeetingOutcome {
                    success: false,
                    event_id: None,
                    error: Some("slot already taken".to_string()),
                })
            }
        }

        async fn is_available(&self) -> bool {
            self.available
        }
    }

    fn handler(available: bool, booking_succeeds: bool) -> SchedulerHandler {
        SchedulerHandler::new(
            Arc::new(FakeCalendar { available, booking_succeeds }),
            &CalendarConfig {
                base_url: String::new(),
                timeout_secs: 10,
                days_ahead: 7,
                max_slots: 5,
            },
        )
    }

    async fn run(handler: &SchedulerHandler, text: &str) -> triage_core::HandlerResponse {
        let message = Message::new("C1", "U1", text);
        let intent = PatternClassifier::default().classify(text);
        let moderation = ModerationResult::default();
        let context = HandlerContext { message: &message, intent: &intent, moderation: &moderation };
        handler.handle(&context).await.expect("handle")
    }

    #[tokio::test]
    async fn fresh_request_offers_slots_without_escalating() {
        let handler = handler(true, true);
        let response = run(&handler, "I want to schedule a demo").await;
        assert!(!response.should_escalate);
        assert!(response.text.contains("Tuesday 10:00"));
        assert!(response.metadata.contains_key("slot_options"));
    }

    #[tokio::test]
    async fn numbered_selection_books_the_offered_slot() {
        let handler = handler(true, true);
        run(&handler, "I want to schedule a demo").await;

        let response = run(&handler, "2").await;
        assert!(!response.should_escalate);
        assert!(response.text.contains("Wednesday 14:00"));
        assert_eq!(response.metadata.get("event_id").map(String::as_str), Some("evt-slot-2"));
    }

    #[tokio::test]
    async fn day_name_selection_books_the_matching_slot() {
        let handler = handler(true, true);
        run(&handler, "I want to schedule a demo").await;

        let response = run(&handler, "tuesday works best for me").await;
        assert!(!response.should_escalate);
        assert!(response.text.contains("Tuesday 10:00"));
    }

    #[tokio::test]
    async fn bare_confirmation_takes_the_first_slot() {
        let handler = handler(true, true);
        run(&handler, "I want to schedule a demo").await;

        let response = run(&handler, "sounds good").await;
        assert!(response.text.contains("Tuesday 10:00"));
    }

    #[tokio::test]
    async fn unrecognized_follow_up_reoffers_the_slots() {
        let handler = handler(true, true);
        run(&handler, "I want to schedule a demo").await;

        let response = run(&handler, "what was that?").await;
        assert!(!response.should_escalate);
        assert!(response.text.contains("available times again"));

        // The offers survive for the next attempt.
        let booked = run(&handler, "1").await;
        assert!(booked.text.contains("Tuesday 10:00"));
    }

    #[tokio::test]
    async fn calendar_outage_escalates_with_specific_reason() {
        let handler = handler(false, true);
        let response = run(&handler, "I want to schedule a demo").await;
        assert!(response.should_escalate);
        assert_eq!(response.escalation_reason.as_deref(), Some("calendar service unavailable"));
    }

    #[tokio::test]
    async fn failed_booking_escalates() {
        let handler = handler(true, false);
        run(&handler, "I want to schedule a demo").await;

        let response = run(&handler, "1").await;
        assert!(response.should_escalate);
        assert!(response.escalation_reason.as_deref().unwrap_or("").contains("booking attempt failed"));
    }
}
