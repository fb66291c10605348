//! Ports to the external collaborators the runtime orchestrates. Each has a
//! Noop implementation so the pipeline runs end to end without live
//! integrations.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use triage_core::domain::session::ConversationSession;

/// Answer from the knowledge-retrieval service, treated as an opaque oracle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub should_escalate: bool,
}

#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn query(&self, text: &str, topic_hint: Option<&str>) -> Result<KnowledgeAnswer>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: String,
    pub label: String,
    pub starts_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub slot_id: String,
    pub attendee_id: String,
    pub attendee_name: Option<String>,
    pub attendee_email: Option<String>,
    pub meeting_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeetingOutcome {
    pub success: bool,
    pub event_id: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn get_available_slots(
        &self,
        days_ahead: u32,
        meeting_type: &str,
        max: u32,
    ) -> Result<Vec<Slot>>;

    async fn create_meeting(&self, request: MeetingRequest) -> Result<MeetingOutcome>;

    async fn is_available(&self) -> bool;
}

/// Outbound half of the human-messaging platform: escalation cards to the
/// team channel and customer-message relays into assigned threads.
#[async_trait]
pub trait HumanMessenger: Send + Sync {
    /// Post a new escalation card. Returns a thread reference for follow-ups.
    async fn post_escalation(&self, session: &ConversationSession) -> Result<String>;

    /// Relay a customer message into the session's existing thread.
    async fn relay_to_agent(&self, session: &ConversationSession, text: &str) -> Result<()>;
}

/// Originating customer surface (web widget, platform thread). How slot
/// options render is the surface's concern.
#[async_trait]
pub trait CustomerNotifier: Send + Sync {
    async fn notify(&self, channel_id: &str, text: &str) -> Result<()>;
}

pub struct NoopKnowledgeService;

#[async_trait]
impl KnowledgeService for NoopKnowledgeService {
    async fn query(&self, _text: &str, _topic_hint: Option<&str>) -> Result<KnowledgeAnswer> {
        Ok(KnowledgeAnswer {
            answer: String::new(),
            confidence: 0.0,
            sources: Vec::new(),
            should_escalate: false,
        })
    }
}

pub struct NoopCalendarService;

#[async_trait]
impl CalendarService for NoopCalendarService {
    async fn get_available_slots(
        &self,
        _days_ahead: u32,
        _meeting_type: &str,
        _max: u32,
    ) -> Result<Vec<Slot>> {
        Ok(Vec::new())
    }

    async fn create_meeting(&self, _request: MeetingRequest) -> Result<MeetingOutcome> {
        Ok(MeetingOutcome { success: false, event_id: None, error: Some("not configured".into()) })
    }

    async fn is_available(&self) -> bool {
        false
    }
}

pub struct NoopHumanMessenger;

#[async_trait]
impl HumanMessenger for NoopHumanMessenger {
    async fn post_escalation(&self, _session: &ConversationSession) -> Result<String> {
        Ok(String::new())
    }

    async fn relay_to_agent(&self, _session: &ConversationSession, _text: &str) -> Result<()> {
        Ok(())
    }
}

pub struct NoopCustomerNotifier;

#[async_trait]
impl CustomerNotifier for NoopCustomerNotifier {
    async fn notify(&self, _channel_id: &str, _text: &str) -> Result<()> {
        Ok(())
    }
}
