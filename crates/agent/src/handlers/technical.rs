use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

use triage_core::domain::intent::SupportType;
use triage_core::domain::response::{HandlerKind, HandlerResponse};

use super::HandlerContext;

/// Triage-grade technical responder. Offers first-line guidance for the
/// recognized issue families and hands everything else to a human. Severity
/// is checked before the issue family: a production outage escalates even
/// when the family is recognized.
pub struct TechnicalHandler;

fn critical_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\bproduction\b.{0,30}\b(down|broken|failing|outage)\b",
            r"(?i)\b(outage|sev\s*1|severity\s*1)\b",
            r"(?i)\b(all|every)\b.{0,20}\busers?\b.{0,30}\b(affected|impacted|down|locked)\b",
            r"(?i)\b5\d\d\b.{0,20}\berrors?\b",
            r"(?i)\bdata\s+loss\b",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("static pattern"))
        .collect()
    })
}

fn is_critical(text: &str) -> bool {
    critical_patterns().iter().any(|pattern| pattern.is_match(text))
}

impl TechnicalHandler {
    pub async fn handle(&self, context: &HandlerContext<'_>) -> Result<HandlerResponse> {
        if is_critical(&context.message.text) {
            return Ok(HandlerResponse::escalate(
                HandlerKind::Technical,
                "critical production issue reported",
                0.95,
            )
            .with_metadata("severity", "critical"));
        }

        let support_type = context
            .intent
            .metadata
            .support_type
            .unwrap_or(SupportType::Unknown);

        let guidance = match support_type {
            SupportType::Sso => Some(concat!(
                "Let's get your SSO connection sorted. First, confirm the identity ",
                "provider metadata URL in Settings > Authentication matches your IdP, ",
                "and that the certificate has not expired. If logins still fail, send ",
                "me the SAML trace and I'll take a closer look.",
            )),
            SupportType::Api => Some(concat!(
                "For API issues, start by checking that your key is active under ",
                "Settings > API Keys and that requests include the Authorization ",
                "header. A 401 means the key is wrong or revoked; a 429 means you've ",
                "hit the rate limit. What status code are you seeing?",
            )),
            SupportType::Configuration => Some(concat!(
                "Configuration problems are usually a stale cache or a setting that ",
                "hasn't propagated yet. Try saving the setting again and allow up to ",
                "five minutes for it to apply. Which setting are you changing?",
            )),
            SupportType::Connectivity => Some(concat!(
                "For connection problems, check https://status.example.com first. If ",
                "the status page is green, try from another network to rule out a ",
                "firewall or proxy on your side. Is the issue constant or intermittent?",
            )),
            SupportType::Unknown => None,
        };

        match guidance {
            Some(text) => Ok(HandlerResponse::answer(HandlerKind::Technical, text, 0.80)
                .with_metadata("support_type", support_type_label(support_type))),
            None => Ok(HandlerResponse::escalate(
                HandlerKind::Technical,
                "unrecognized technical issue",
                0.40,
            )),
        }
    }
}

fn support_type_label(support_type: SupportType) -> &'static str {
    match support_type {
        SupportType::Sso => "sso",
        SupportType::Api => "api",
        SupportType::Configuration => "configuration",
        SupportType::Connectivity => "connectivity",
        SupportType::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use triage_core::classifier::PatternClassifier;
    use triage_core::domain::message::Message;
    use triage_core::moderation::ModerationResult;

    use super::{is_critical, TechnicalHandler};
    use crate::handlers::HandlerContext;

    async fn run(text: &str) -> triage_core::HandlerResponse {
        let message = Message::new("C1", "U1", text);
        let intent = PatternClassifier::default().classify(text);
        let moderation = ModerationResult::default();
        let context = HandlerContext { message: &message, intent: &intent, moderation: &moderation };
        TechnicalHandler.handle(&context).await.expect("handle")
    }

    #[tokio::test]
    async fn production_outage_escalates_as_critical() {
        let response = run("production is down and we're getting 500 errors everywhere").await;
        assert!(response.should_escalate);
        assert_eq!(response.metadata.get("severity").map(String::as_str), Some("critical"));
        assert!(response
            .escalation_reason
            .as_deref()
            .unwrap_or("")
            .contains("production"));
    }

    #[tokio::test]
    async fn sso_issue_gets_scripted_guidance_without_escalating() {
        let response = run("our SSO login keeps failing for a couple of users").await;
        assert!(!response.should_escalate);
        assert!(response.text.contains("identity"));
        assert_eq!(response.metadata.get("support_type").map(String::as_str), Some("sso"));
    }

    #[tokio::test]
    async fn api_issue_gets_scripted_guidance() {
        let response = run("the api returns 401 for my integration").await;
        assert!(!response.should_escalate);
        assert!(response.text.contains("API Keys"));
    }

    #[tokio::test]
    async fn unrecognized_issue_escalates() {
        let response = run("something is broken but I can't tell what").await;
        assert!(response.should_escalate);
        assert_eq!(response.escalation_reason.as_deref(), Some("unrecognized technical issue"));
    }

    #[test]
    fn severity_patterns_flag_outage_language() {
        assert!(is_critical("we have a full outage"));
        assert!(is_critical("every user is locked out"));
        assert!(!is_critical("one user sees a weird font"));
    }
}
