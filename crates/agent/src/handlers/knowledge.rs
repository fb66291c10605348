use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use triage_core::cache::BoundedCache;
use triage_core::config::KnowledgeConfig;
use triage_core::domain::intent::Intent;
use triage_core::domain::response::{HandlerKind, HandlerResponse};

use super::HandlerContext;
use crate::services::{KnowledgeAnswer, KnowledgeService};

/// Appended to released information answers; legal- or privacy-flagged
/// conversations never carry promotional copy.
const DEMO_FOLLOW_UP: &str =
    "If you'd like a closer look, I can also set up a quick demo with our team.";

/// Retrieval-backed responder. Maps retrieval confidence straight to
/// response confidence; escalates under a per-topic threshold or when the
/// customer signals urgency.
pub struct KnowledgeHandler {
    service: Arc<dyn KnowledgeService>,
    cache: BoundedCache<String, KnowledgeAnswer>,
}

impl KnowledgeHandler {
    pub fn new(service: Arc<dyn KnowledgeService>, config: &KnowledgeConfig) -> Self {
        Self {
            service,
            cache: BoundedCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ),
        }
    }

    pub async fn handle(&self, context: &HandlerContext<'_>) -> Result<HandlerResponse> {
        let topic = context.intent.metadata.info_category.as_deref();
        let cache_key = cache_key(&context.message.text);

        let answer = match self.cache.get(&cache_key) {
            Some(cached) => {
                debug!(topic = topic.unwrap_or("general"), "knowledge cache hit");
                cached
            }
            None => {
                let fresh = match self.service.query(&context.message.text, topic).await {
                    Ok(answer) => answer,
                    // Service down is its own escalation reason, distinct
                    // from "no good answer".
                    Err(error) => {
                        debug!(error = %error, "knowledge service unavailable");
                        return Ok(HandlerResponse::escalate(
                            HandlerKind::Knowledge,
                            "knowledge service unavailable",
                            0.0,
                        ));
                    }
                };
                self.cache.insert(cache_key, fresh.clone());
                fresh
            }
        };

        let threshold = topic_threshold(topic);
        if answer.should_escalate || answer.confidence < threshold {
            return Ok(HandlerResponse::escalate(
                HandlerKind::Knowledge,
                format!(
                    "no confident answer for {} question",
                    topic.unwrap_or("general")
                ),
                answer.confidence,
            ));
        }

        if context.intent.metadata.urgent {
            return Ok(HandlerResponse::escalate(
                HandlerKind::Knowledge,
                "customer flagged the request as urgent",
                answer.confidence,
            ));
        }

        let mut text = answer.answer;
        if context.intent.intent == Intent::Information && !context.moderation.is_legal_privacy {
            text = format!("{text}\n\n{DEMO_FOLLOW_UP}");
        }

        let mut response = HandlerResponse::answer(HandlerKind::Knowledge, text, answer.confidence);
        for source in answer.sources {
            response = response.with_source(source);
        }
        Ok(response)
    }
}

/// Per-topic confidence floor. Compliance answers are held to a higher bar
/// than general questions.
fn topic_threshold(topic: Option<&str>) -> f64 {
    match topic {
        Some("compliance") => 0.65,
        Some("pricing") => 0.50,
        Some("features") => 0.45,
        Some("documentation") => 0.40,
        _ => 0.30,
    }
}

fn cache_key(text: &str) -> String {
    text.trim().to_lowercase()
}
