//! Customer-facing message intake. The web widget posts here; the response
//! body is the bot's single outbound reply for that message.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use triage_agent::runtime::TriageRuntime;
use triage_core::domain::message::Message;
use triage_core::domain::response::OutboundResponse;

#[derive(Clone)]
pub struct IntakeState {
    pub runtime: Arc<TriageRuntime>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IntakeError {
    pub error: String,
}

pub fn router(state: IntakeState) -> Router {
    Router::new().route("/api/messages", post(receive_message)).with_state(state)
}

async fn receive_message(
    State(state): State<IntakeState>,
    Json(inbound): Json<InboundMessage>,
) -> Result<Json<OutboundResponse>, (StatusCode, Json<IntakeError>)> {
    if inbound.channel_id.trim().is_empty() || inbound.user_id.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(IntakeError { error: "channel_id and user_id are required".to_string() }),
        ));
    }

    let mut message = Message::new(inbound.channel_id, inbound.user_id, inbound.text);
    if let Some(display_name) = inbound.display_name {
        message = message.with_display_name(display_name);
    }
    message.email = inbound.email;

    Ok(Json(state.runtime.process_customer_message(message).await))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    use triage_agent::classify::FallbackClassifier;
    use triage_agent::handlers::{
        EscalationHandler, HandlerSet, KnowledgeHandler, SchedulerHandler, TechnicalHandler,
    };
    use triage_agent::runtime::{RuntimeDeps, TriageRuntime};
    use triage_agent::services::{
        NoopCalendarService, NoopCustomerNotifier, NoopHumanMessenger, NoopKnowledgeService,
    };
    use triage_core::audit::InMemoryAuditSink;
    use triage_core::config::AppConfig;
    use triage_core::session::InMemorySessionStore;

    use super::{router, IntakeState};

    fn state() -> IntakeState {
        let config = AppConfig::default();
        IntakeState {
            runtime: Arc::new(TriageRuntime::new(
                config.routing.clone(),
                RuntimeDeps {
                    classifier: Arc::new(FallbackClassifier::pattern_only(config.routing.clone())),
                    handlers: HandlerSet {
                        knowledge: KnowledgeHandler::new(
                            Arc::new(NoopKnowledgeService),
                            &config.knowledge,
                        ),
                        scheduler: SchedulerHandler::new(
                            Arc::new(NoopCalendarService),
                            &config.calendar,
                        ),
                        technical: TechnicalHandler,
                        escalation: EscalationHandler,
                    },
                    sessions: Arc::new(InMemorySessionStore::new()),
                    messenger: Arc::new(NoopHumanMessenger),
                    notifier: Arc::new(NoopCustomerNotifier),
                    audit: Arc::new(InMemoryAuditSink::default()),
                },
            )),
        }
    }

    fn request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    #[tokio::test]
    async fn posting_a_message_returns_the_bot_reply() {
        let app = router(state());
        let response = app
            .oneshot(request(
                r#"{"channel_id":"C1","user_id":"U1","text":"connect me to a human please"}"#,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["escalated"], true);
        assert!(payload["session_id"].is_string());
    }

    #[tokio::test]
    async fn blank_identifiers_are_rejected() {
        let app = router(state());
        let response = app
            .oneshot(request(r#"{"channel_id":"","user_id":"U1","text":"hello"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
