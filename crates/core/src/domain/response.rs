use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The closed set of responder handlers. The planner routes by tag; there is
/// no open registry of handlers to probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Knowledge,
    Scheduler,
    Technical,
    Escalation,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Scheduler => "scheduler",
            Self::Technical => "technical",
            Self::Escalation => "escalation",
        }
    }
}

/// Output of one responder handler for one message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub handler: HandlerKind,
    pub text: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub should_escalate: bool,
    pub escalation_reason: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl HandlerResponse {
    pub fn answer(handler: HandlerKind, text: impl Into<String>, confidence: f64) -> Self {
        Self {
            handler,
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            sources: Vec::new(),
            should_escalate: false,
            escalation_reason: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn escalate(handler: HandlerKind, reason: impl Into<String>, confidence: f64) -> Self {
        let reason = reason.into();
        Self {
            handler,
            text: String::new(),
            confidence: confidence.clamp(0.0, 1.0),
            sources: Vec::new(),
            should_escalate: true,
            escalation_reason: Some(reason),
            metadata: BTreeMap::new(),
        }
    }

    /// Synthetic response standing in for a handler that failed outright.
    /// Keeps the gate total: a crashed handler is just a zero-confidence
    /// escalation vote.
    pub fn handler_failure(handler: HandlerKind) -> Self {
        Self::escalate(handler, format!("{} handler failed", handler.as_str()), 0.0)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A selectable meeting slot surfaced to the customer. How the originating
/// surface renders these (buttons, numbered list) is its own concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOption {
    pub index: u32,
    pub label: String,
    pub slot_id: String,
}

/// The single finalized outbound response for a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundResponse {
    pub text: String,
    pub options: Vec<SlotOption>,
    pub escalated: bool,
    pub session_id: Option<String>,
    pub processing_ms: u64,
}
