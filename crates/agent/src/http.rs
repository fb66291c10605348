//! HTTP clients for the knowledge-retrieval and calendar services.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use triage_core::config::{CalendarConfig, KnowledgeConfig};

use crate::services::{
    CalendarService, KnowledgeAnswer, KnowledgeService, MeetingOutcome, MeetingRequest, Slot,
};

pub struct HttpKnowledgeService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
}

impl HttpKnowledgeService {
    pub fn new(config: &KnowledgeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl KnowledgeService for HttpKnowledgeService {
    async fn query(&self, text: &str, topic_hint: Option<&str>) -> Result<KnowledgeAnswer> {
        let response = self
            .client
            .post(format!("{}/v1/query", self.base_url))
            .json(&QueryRequest { question: text, topic: topic_hint })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("knowledge service returned {}", response.status()));
        }
        Ok(response.json::<KnowledgeAnswer>().await?)
    }
}

pub struct HttpCalendarService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SlotsResponse {
    slots: Vec<Slot>,
}

impl HttpCalendarService {
    pub fn new(config: &CalendarConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl CalendarService for HttpCalendarService {
    async fn get_available_slots(
        &self,
        days_ahead: u32,
        meeting_type: &str,
        max: u32,
    ) -> Result<Vec<Slot>> {
        let response = self
            .client
            .get(format!("{}/v1/slots", self.base_url))
            .query(&[
                ("days_ahead", days_ahead.to_string()),
                ("meeting_type", meeting_type.to_string()),
                ("max", max.to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("calendar service returned {}", response.status()));
        }
        Ok(response.json::<SlotsResponse>().await?.slots)
    }

    async fn create_meeting(&self, request: MeetingRequest) -> Result<MeetingOutcome> {
        let response = self
            .client
            .post(format!("{}/v1/meetings", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("calendar service returned {}", response.status()));
        }
        Ok(response.json::<MeetingOutcome>().await?)
    }

    async fn is_available(&self) -> bool {
        match self.client.get(format!("{}/health", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(error = %error, "calendar health probe failed");
                false
            }
        }
    }
}
