//! Pattern-rule intent classification.
//!
//! Each category carries a table of weighted regex rules compiled once at
//! construction. A category's score is the maximum weight among matched
//! rules, never a sum, so a pile of weak keyword hits cannot outvote one
//! explicit request. Disambiguation overrides then subtract a penalty when
//! a message is asking *about* a topic rather than requesting it.

use regex::Regex;

use crate::config::RoutingConfig;
use crate::domain::intent::{
    CategoryScores, ClassificationMethod, Intent, IntentMetadata, IntentResult, SupportType,
    TimePreference,
};

struct PatternRule {
    label: &'static str,
    regex: Regex,
    weight: f64,
}

impl PatternRule {
    fn new(label: &'static str, pattern: &str, weight: f64) -> Self {
        Self {
            label,
            regex: Regex::new(pattern).expect("static classifier pattern compiles"),
            weight,
        }
    }
}

/// Deterministic pattern classifier. `classify` never fails; when no rule
/// commits it degrades to a low-confidence information result.
pub struct PatternClassifier {
    scheduling_rules: Vec<PatternRule>,
    technical_rules: Vec<PatternRule>,
    information_rules: Vec<PatternRule>,
    scheduling_info_overrides: Vec<Regex>,
    technical_info_overrides: Vec<Regex>,
    slot_selection: Regex,
    bare_number: Regex,
    urgency: Regex,
    thresholds: RoutingConfig,
}

impl PatternClassifier {
    pub fn new(thresholds: RoutingConfig) -> Self {
        let scheduling_rules = vec![
            PatternRule::new(
                "explicit_schedule_request",
                r"(?i)\b(schedule|book|set\s*up|arrange)\b.{0,40}\b(demo|call|meeting|appointment|time)\b",
                0.95,
            ),
            PatternRule::new(
                "want_a_demo",
                r"(?i)\b(want|like|need)\b.{0,30}\b(a|the)\s+demo\b",
                0.90,
            ),
            PatternRule::new("reschedule", r"(?i)\breschedul", 0.85),
            PatternRule::new(
                "availability_probe",
                r"(?i)\b(available|availability|open)\b.{0,30}\b(slots?|times?|this week|next week)\b",
                0.80,
            ),
            PatternRule::new("talk_to_sales", r"(?i)\b(talk|speak)\s+(to|with)\s+sales\b", 0.70),
            PatternRule::new("demo_keyword", r"(?i)\bdemo\b", 0.60),
            PatternRule::new("calendar_keyword", r"(?i)\b(calendar|invite)\b", 0.60),
            PatternRule::new(
                "day_of_week",
                r"(?i)\b(monday|tuesday|wednesday|thursday|friday)\b",
                0.55,
            ),
        ];

        let technical_rules = vec![
            PatternRule::new(
                "http_errors",
                r"(?i)\b(5\d\d\s+errors?|50[0-9]\b|internal server error)",
                0.90,
            ),
            PatternRule::new("outage", r"(?i)\b(outage|is down|went down|can.?t connect)\b", 0.85),
            PatternRule::new("sso", r"(?i)\b(sso|single sign.?on|saml|okta)\b", 0.85),
            PatternRule::new(
                "login_failure",
                r"(?i)\b(can.?t|cannot|unable to)\s+(log\s*in|sign\s*in|authenticate)\b",
                0.85,
            ),
            PatternRule::new(
                "broken",
                r"(?i)\b(error|bug|broken|not working|failing|fails)\b",
                0.80,
            ),
            PatternRule::new("webhook", r"(?i)\bwebhooks?\b", 0.70),
            PatternRule::new("integration", r"(?i)\bintegrat(e|ion)\b", 0.65),
            PatternRule::new(
                "configuration",
                r"(?i)\b(configur(e|ation)|settings|set\s*up\s+fails?)\b",
                0.60,
            ),
            PatternRule::new("api_keyword", r"(?i)\bapi\b", 0.60),
            PatternRule::new("production_keyword", r"(?i)\bproduction\b", 0.60),
        ];

        let information_rules = vec![
            PatternRule::new("tell_me_about", r"(?i)\btell\s+me\s+(more\s+)?about\b", 0.80),
            PatternRule::new("pricing", r"(?i)\b(pricing|price|cost|how much)\b", 0.80),
            PatternRule::new(
                "question_opener",
                r"(?i)\b(what\s+(is|are|does)|how\s+(does|do|is)|can\s+you\s+explain)\b",
                0.75,
            ),
            PatternRule::new(
                "compliance",
                r"(?i)\b(soc\s*2|gdpr|hipaa|iso\s*27001|compliance|compliant)\b",
                0.75,
            ),
            PatternRule::new("documentation", r"(?i)\b(docs?|documentation|guide|whitepaper)\b", 0.70),
            PatternRule::new("features", r"(?i)\b(features?|capabilit|support\s+for)\b", 0.70),
            PatternRule::new("send_me", r"(?i)\bsend\s+(me|us|over)\b", 0.70),
            PatternRule::new("security_keyword", r"(?i)\bsecurity\b", 0.60),
        ];

        // "Asking about scheduling" rather than requesting it.
        let scheduling_info_overrides = vec![
            Regex::new(r"(?i)\bwhat\s+(is|are|does|happens)\b.{0,30}\bdemo\b").expect("pattern"),
            Regex::new(r"(?i)\bhow\s+(long|does|do)\b.{0,30}\b(demo|meeting)s?\b").expect("pattern"),
            Regex::new(r"(?i)\bdo\s+(you|i)\s+(offer|need)\b.{0,20}\bdemo\b").expect("pattern"),
        ];

        // Info-seeking about compliance/pricing that trips technical keywords.
        let technical_info_overrides = vec![
            Regex::new(
                r"(?i)\b(what\s+(is|are)|how\s+(does|do)|tell\s+me\s+about)\b.{0,50}\b(soc\s*2|gdpr|hipaa|compliance|pricing|price|certified|certification)\b",
            )
            .expect("pattern"),
            Regex::new(r"(?i)\b(is|are)\s+(your|the)\s+(api|platform)\s+(documented|rate.?limited|versioned)\b")
                .expect("pattern"),
        ];

        Self {
            scheduling_rules,
            technical_rules,
            information_rules,
            scheduling_info_overrides,
            technical_info_overrides,
            slot_selection: Regex::new(r"(?i)^\s*option\s+([1-9])\s*$").expect("pattern"),
            bare_number: Regex::new(r"^\s*([1-9])\s*\.?\s*$").expect("pattern"),
            urgency: Regex::new(r"(?i)\b(urgent|asap|immediately|right away|critical|emergency)\b")
                .expect("pattern"),
            thresholds,
        }
    }

    /// Classify a message. Infallible: degraded inputs produce a default
    /// low-confidence information result rather than an error.
    pub fn classify(&self, text: &str) -> IntentResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return IntentResult::default_information(0.30);
        }

        // Continuation-of-flow: a bare number or "option N" is a scheduling
        // slot selection regardless of anything else in the message.
        if let Some(index) = self.slot_selection_index(trimmed) {
            return IntentResult {
                intent: Intent::Scheduling,
                confidence: 0.95,
                scores: CategoryScores { scheduling: 0.95, ..CategoryScores::default() },
                method: ClassificationMethod::Pattern,
                metadata: IntentMetadata {
                    slot_selection: Some(index),
                    ..IntentMetadata::default()
                },
            };
        }

        let mut scores = CategoryScores {
            scheduling: max_rule_weight(&self.scheduling_rules, trimmed),
            technical: max_rule_weight(&self.technical_rules, trimmed),
            information: max_rule_weight(&self.information_rules, trimmed),
        };

        if self.scheduling_info_overrides.iter().any(|r| r.is_match(trimmed)) {
            scores.scheduling =
                (scores.scheduling - self.thresholds.scheduling_info_penalty).max(0.0);
        }
        if self.technical_info_overrides.iter().any(|r| r.is_match(trimmed)) {
            scores.technical = (scores.technical - self.thresholds.technical_info_penalty).max(0.0);
        }

        // Ties resolve in fixed preference order.
        let (intent, confidence) = if scores.scheduling >= scores.technical
            && scores.scheduling >= scores.information
            && scores.scheduling > 0.0
        {
            (Intent::Scheduling, scores.scheduling)
        } else if scores.technical >= scores.information && scores.technical > 0.0 {
            (Intent::TechnicalSupport, scores.technical)
        } else if scores.information > 0.0 {
            (Intent::Information, scores.information)
        } else {
            (Intent::Unknown, 0.0)
        };

        if confidence < self.thresholds.low_confidence_floor {
            // Below the floor the pattern layer refuses to commit; the
            // caller may consult an external model before accepting this.
            let mut result =
                IntentResult::default_information(self.thresholds.low_confidence_floor);
            result.scores = scores;
            result.metadata = self.extract_metadata(trimmed, Intent::Information);
            return result;
        }

        IntentResult {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            scores,
            method: ClassificationMethod::Pattern,
            metadata: self.extract_metadata(trimmed, intent),
        }
    }

    fn slot_selection_index(&self, text: &str) -> Option<u32> {
        let captures =
            self.bare_number.captures(text).or_else(|| self.slot_selection.captures(text))?;
        captures.get(1)?.as_str().parse().ok()
    }

    fn extract_metadata(&self, text: &str, intent: Intent) -> IntentMetadata {
        let lower = text.to_lowercase();
        let time_preference = if lower.contains("morning") {
            Some(TimePreference::Morning)
        } else if lower.contains("afternoon") {
            Some(TimePreference::Afternoon)
        } else if lower.contains("evening") {
            Some(TimePreference::Evening)
        } else {
            None
        };

        let support_type = match intent {
            Intent::TechnicalSupport => Some(detect_support_type(&lower)),
            _ => None,
        };

        let info_category = match intent {
            Intent::Information => Some(detect_info_category(&lower)),
            _ => None,
        };

        IntentMetadata {
            urgent: self.urgency.is_match(text),
            time_preference,
            slot_selection: None,
            support_type,
            info_category,
        }
    }

    /// Which matched rule won a category, for audit metadata.
    pub fn winning_rule(&self, text: &str, intent: Intent) -> Option<&'static str> {
        let rules = match intent {
            Intent::Scheduling => &self.scheduling_rules,
            Intent::TechnicalSupport => &self.technical_rules,
            Intent::Information => &self.information_rules,
            Intent::Escalation | Intent::Unknown => return None,
        };
        rules
            .iter()
            .filter(|rule| rule.regex.is_match(text))
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|rule| rule.label)
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

fn max_rule_weight(rules: &[PatternRule], text: &str) -> f64 {
    rules
        .iter()
        .filter(|rule| rule.regex.is_match(text))
        .map(|rule| rule.weight)
        .fold(0.0, f64::max)
}

fn detect_support_type(lower: &str) -> SupportType {
    if lower.contains("sso") || lower.contains("saml") || lower.contains("single sign") {
        SupportType::Sso
    } else if lower.contains("api") || lower.contains("webhook") {
        SupportType::Api
    } else if lower.contains("configur") || lower.contains("settings") || lower.contains("setup") {
        SupportType::Configuration
    } else if lower.contains("connect") || lower.contains("down") || lower.contains("outage") {
        SupportType::Connectivity
    } else {
        SupportType::Unknown
    }
}

fn detect_info_category(lower: &str) -> String {
    if lower.contains("pricing") || lower.contains("price") || lower.contains("cost") {
        "pricing".to_string()
    } else if lower.contains("soc") || lower.contains("gdpr") || lower.contains("hipaa")
        || lower.contains("compliance")
    {
        "compliance".to_string()
    } else if lower.contains("doc") || lower.contains("guide") {
        "documentation".to_string()
    } else if lower.contains("feature") || lower.contains("capabilit") {
        "features".to_string()
    } else {
        "general".to_string()
    }
}
