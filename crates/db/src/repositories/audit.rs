use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::warn;

use triage_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use triage_core::domain::session::SessionId;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_events (event_id, session_id, message_id, correlation_id,
                                       event_type, category, actor, outcome, metadata, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.session_id.as_ref().map(|id| id.0.as_str()))
        .bind(&event.message_id)
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(category_as_str(&event.category))
        .bind(&event.actor)
        .bind(outcome_as_str(&event.outcome))
        .bind(metadata)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, session_id, message_id, correlation_id, event_type,
                    category, actor, outcome, metadata, occurred_at
             FROM audit_events ORDER BY occurred_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }

    pub async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, session_id, message_id, correlation_id, event_type,
                    category, actor, outcome, metadata, occurred_at
             FROM audit_events WHERE session_id = ? ORDER BY occurred_at ASC",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

/// Audit sink backed by the database. Writes are fire-and-forget so a slow
/// or failing database never blocks the message pipeline.
#[derive(Clone)]
pub struct SqlAuditSink {
    pool: DbPool,
}

impl SqlAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for SqlAuditSink {
    fn emit(&self, event: AuditEvent) {
        let repository = SqlAuditRepository::new(self.pool.clone());
        tokio::spawn(async move {
            if let Err(error) = repository.record(&event).await {
                warn!(
                    event_type = %event.event_type,
                    error = %error,
                    "failed to persist audit event"
                );
            }
        });
    }
}

fn category_as_str(category: &AuditCategory) -> &'static str {
    match category {
        AuditCategory::Ingress => "ingress",
        AuditCategory::Classification => "classification",
        AuditCategory::Planning => "planning",
        AuditCategory::Handler => "handler",
        AuditCategory::Gate => "gate",
        AuditCategory::Session => "session",
        AuditCategory::Relay => "relay",
        AuditCategory::System => "system",
    }
}

fn parse_category(value: &str) -> AuditCategory {
    match value {
        "ingress" => AuditCategory::Ingress,
        "classification" => AuditCategory::Classification,
        "planning" => AuditCategory::Planning,
        "handler" => AuditCategory::Handler,
        "gate" => AuditCategory::Gate,
        "session" => AuditCategory::Session,
        "relay" => AuditCategory::Relay,
        _ => AuditCategory::System,
    }
}

fn outcome_as_str(outcome: &AuditOutcome) -> &'static str {
    match outcome {
        AuditOutcome::Success => "success",
        AuditOutcome::Rejected => "rejected",
        AuditOutcome::Failed => "failed",
    }
}

fn parse_outcome(value: &str) -> AuditOutcome {
    match value {
        "rejected" => AuditOutcome::Rejected,
        "failed" => AuditOutcome::Failed,
        _ => AuditOutcome::Success,
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let event_id: String =
        row.try_get("event_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let session_id: Option<String> =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message_id: Option<String> =
        row.try_get("message_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correlation_id: String =
        row.try_get("correlation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_type: String =
        row.try_get("event_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String = row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let outcome: String =
        row.try_get("outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata_raw: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at_raw: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_raw)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(AuditEvent {
        event_id,
        session_id: session_id.map(SessionId),
        message_id,
        correlation_id,
        event_type,
        category: parse_category(&category),
        actor,
        outcome: parse_outcome(&outcome),
        metadata,
        occurred_at,
    })
}
