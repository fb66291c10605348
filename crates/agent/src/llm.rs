//! External classification-model fallback. Only consulted when the pattern
//! classifier scores below its confidence floor.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use triage_core::config::LlmConfig;
use triage_core::domain::intent::Intent;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmClassification {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
}

#[async_trait]
pub trait LlmClassifier: Send + Sync {
    async fn classify(&self, text: &str, prompt: &str) -> Result<LlmClassification>;
}

/// Structured disambiguation prompt sent alongside the message text.
pub fn disambiguation_prompt(scores_summary: &str) -> String {
    format!(
        "Classify the customer message into exactly one intent: scheduling, \
         information, technical_support, or escalation. Pattern scores so far: \
         {scores_summary}. Respond as JSON with fields intent, confidence (0..1), \
         and reasoning."
    )
}

pub struct HttpLlmClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    intent: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

impl HttpLlmClassifier {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        use secrecy::ExposeSecret;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            max_retries: config.max_retries,
        })
    }

    async fn call_once(&self, text: &str, prompt: &str) -> Result<LlmClassification> {
        let mut request = self
            .client
            .post(format!("{}/v1/classify", self.base_url))
            .json(&ClassifyRequest { model: &self.model, prompt, message: text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: ClassifyResponse = response.json().await?;

        Ok(LlmClassification {
            intent: parse_intent(&body.intent)?,
            confidence: body.confidence.clamp(0.0, 1.0),
            reasoning: body.reasoning,
        })
    }
}

#[async_trait]
impl LlmClassifier for HttpLlmClassifier {
    async fn classify(&self, text: &str, prompt: &str) -> Result<LlmClassification> {
        let mut last_error = None;
        for _ in 0..=self.max_retries {
            match self.call_once(text, prompt).await {
                Ok(classification) => return Ok(classification),
                Err(error) => last_error = Some(error),
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("classification request never attempted")))
    }
}

fn parse_intent(value: &str) -> Result<Intent> {
    match value.trim().to_ascii_lowercase().as_str() {
        "scheduling" => Ok(Intent::Scheduling),
        "information" => Ok(Intent::Information),
        "technical_support" => Ok(Intent::TechnicalSupport),
        "escalation" => Ok(Intent::Escalation),
        "unknown" => Ok(Intent::Unknown),
        other => Err(anyhow!("model returned unknown intent `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use triage_core::domain::intent::Intent;

    use super::parse_intent;

    #[test]
    fn intent_parsing_is_case_insensitive_and_strict() {
        assert_eq!(parse_intent("Scheduling").ok(), Some(Intent::Scheduling));
        assert_eq!(parse_intent(" technical_support ").ok(), Some(Intent::TechnicalSupport));
        assert!(parse_intent("sales").is_err());
    }
}
