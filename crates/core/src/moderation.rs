//! Pre-classification message screening.
//!
//! Runs before intent classification. Hostility and explicit human-contact
//! requests force the planner onto the escalation path; legal/privacy flags
//! only suppress promotional content downstream.

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub is_hostile: bool,
    pub is_legal_privacy: bool,
    pub is_connection_request: bool,
    pub suggested_response: Option<String>,
}

impl ModerationResult {
    /// True when the planner must route to escalation regardless of intent.
    pub fn forces_escalation(&self) -> bool {
        self.is_hostile || self.is_connection_request
    }
}

pub struct ModerationFilter {
    hostile: Vec<Regex>,
    legal_privacy: Vec<Regex>,
    connection_request: Vec<Regex>,
}

impl ModerationFilter {
    pub fn new() -> Self {
        Self {
            hostile: compile(&[
                r"(?i)\b(trash|garbage|useless|terrible|awful|worst|scam|rip.?off)\b",
                r"(?i)\b(stupid|idiot|incompetent|pathetic)\b",
                r"(?i)\b(hate|sick of|fed up with)\s+(you|this|your)\b",
                r"(?i)\bf\W?u\W?c\W?k|\bs\W?h\W?i\W?t\b|\bdamn\s+(you|this)\b",
            ]),
            legal_privacy: compile(&[
                r"(?i)\b(delete|remove|erase)\b.{0,30}\b(my\s+)?(data|account|information|records)\b",
                r"(?i)\b(gdpr|ccpa|hipaa)\b.{0,40}\b(request|right|violation|complaint|lawyer|legal)\b",
                r"(?i)\b(lawyer|attorney|legal\s+action|lawsuit|sue)\b",
                r"(?i)\bright\s+to\s+be\s+forgotten\b",
            ]),
            connection_request: compile(&[
                r"(?i)\b(connect|transfer|put)\s+me\s+(to|through|with)\b",
                r"(?i)\b(talk|speak)\s+(to|with)\s+(a\s+)?(human|person|someone|real\s+person|agent|representative|rep)\b",
                r"(?i)\b(real|actual|live)\s+(human|person|agent)\b",
                r"(?i)\bhuman\s+(please|support|help)\b",
                r"(?i)\bstop\s+(the\s+)?bot\b",
            ]),
        }
    }

    /// Pure screen. Returns all-false when nothing matches.
    pub fn analyze(&self, text: &str) -> ModerationResult {
        let is_hostile = self.hostile.iter().any(|r| r.is_match(text));
        let is_legal_privacy = self.legal_privacy.iter().any(|r| r.is_match(text));
        let is_connection_request = self.connection_request.iter().any(|r| r.is_match(text));

        let suggested_response = if is_hostile {
            Some(
                "I'm sorry this has been frustrating. Let me connect you with a member \
                 of our team who can help directly."
                    .to_string(),
            )
        } else {
            None
        };

        ModerationResult {
            is_hostile,
            is_legal_privacy,
            is_connection_request,
            suggested_response,
        }
    }
}

impl Default for ModerationFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static moderation pattern compiles"))
        .collect()
}
