//! Classification entrypoint for the runtime: pattern rules first, external
//! model second, and only when the pattern layer refuses to commit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use triage_core::classifier::PatternClassifier;
use triage_core::config::RoutingConfig;
use triage_core::domain::intent::{ClassificationMethod, IntentResult};

use crate::llm::{disambiguation_prompt, LlmClassifier};

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> IntentResult;
}

pub struct FallbackClassifier {
    pattern: PatternClassifier,
    external: Option<Arc<dyn LlmClassifier>>,
    floor: f64,
    external_timeout: Duration,
}

impl FallbackClassifier {
    pub fn new(routing: RoutingConfig, external: Option<Arc<dyn LlmClassifier>>) -> Self {
        let floor = routing.low_confidence_floor;
        Self {
            pattern: PatternClassifier::new(routing),
            external,
            floor,
            external_timeout: Duration::from_secs(8),
        }
    }

    pub fn pattern_only(routing: RoutingConfig) -> Self {
        Self::new(routing, None)
    }
}

#[async_trait]
impl IntentClassifier for FallbackClassifier {
    async fn classify(&self, text: &str) -> IntentResult {
        let pattern_result = self.pattern.classify(text);

        // The pattern layer committed; the external model is never consulted
        // for confident results.
        let pattern_score = winning_score(&pattern_result);
        if pattern_score >= self.floor {
            return pattern_result;
        }

        let Some(external) = &self.external else {
            return pattern_result;
        };

        let summary = format!(
            "scheduling={:.2} technical={:.2} information={:.2}",
            pattern_result.scores.scheduling,
            pattern_result.scores.technical,
            pattern_result.scores.information,
        );
        let prompt = disambiguation_prompt(&summary);

        match tokio::time::timeout(self.external_timeout, external.classify(text, &prompt)).await {
            Ok(Ok(model)) if model.confidence > pattern_score => {
                debug!(
                    intent = model.intent.as_str(),
                    confidence = model.confidence,
                    "accepted external-model classification"
                );
                IntentResult {
                    intent: model.intent,
                    confidence: model.confidence,
                    scores: pattern_result.scores,
                    method: ClassificationMethod::ExternalModel,
                    metadata: pattern_result.metadata,
                }
            }
            Ok(Ok(_)) => pattern_result,
            Ok(Err(error)) => {
                // Recovered locally; the customer never sees model failures.
                warn!(error = %error, "external classification failed, keeping pattern result");
                pattern_result
            }
            Err(_) => {
                warn!("external classification timed out, keeping pattern result");
                pattern_result
            }
        }
    }
}

/// The raw pattern score backing the result, before the floor default was
/// applied. Used to compare against the external model's confidence.
fn winning_score(result: &IntentResult) -> f64 {
    result
        .scores
        .scheduling
        .max(result.scores.technical)
        .max(result.scores.information)
}
