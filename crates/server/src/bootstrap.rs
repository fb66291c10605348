use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use triage_agent::classify::FallbackClassifier;
use triage_agent::handlers::{
    EscalationHandler, HandlerSet, KnowledgeHandler, SchedulerHandler, TechnicalHandler,
};
use triage_agent::http::{HttpCalendarService, HttpKnowledgeService};
use triage_agent::llm::{HttpLlmClassifier, LlmClassifier};
use triage_agent::runtime::{RuntimeDeps, TriageRuntime};
use triage_agent::services::{CalendarService, KnowledgeService, NoopCalendarService, NoopKnowledgeService};
use triage_core::config::{AppConfig, ConfigError, LoadOptions};
use triage_db::repositories::{SqlAuditSink, SqlSessionStore};
use triage_db::{connect_with_settings, migrations, DbPool};
use triage_slack::client::{NoopChatClient, SlackMessenger, SlackNotifier};
use triage_slack::events::{BlockActionHandler, EventDispatcher, ThreadMessageHandler};
use triage_slack::socket::{NoopSocketTransport, ReconnectPolicy, SocketModeRunner};

use crate::relay::RuntimeAgentGateway;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<TriageRuntime>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("integration client construction failed: {0}")]
    Integration(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let sessions = Arc::new(SqlSessionStore::new(db_pool.clone()));
    let audit = Arc::new(SqlAuditSink::new(db_pool.clone()));

    // Outbound chat stays in preview mode until a real transport is wired;
    // the pipeline and session machine run identically either way.
    let chat_client = Arc::new(NoopChatClient);
    let messenger = Arc::new(SlackMessenger::new(
        chat_client.clone(),
        config.slack.escalation_channel.clone(),
    ));
    let notifier = Arc::new(SlackNotifier::new(chat_client));

    let external: Option<Arc<dyn LlmClassifier>> = if config.llm.enabled {
        Some(Arc::new(HttpLlmClassifier::new(&config.llm).map_err(BootstrapError::Integration)?))
    } else {
        None
    };
    let classifier = Arc::new(FallbackClassifier::new(config.routing.clone(), external));

    let knowledge: Arc<dyn KnowledgeService> = if config.knowledge.base_url.is_empty() {
        Arc::new(NoopKnowledgeService)
    } else {
        Arc::new(HttpKnowledgeService::new(&config.knowledge).map_err(BootstrapError::Integration)?)
    };
    let calendar: Arc<dyn CalendarService> = if config.calendar.base_url.is_empty() {
        Arc::new(NoopCalendarService)
    } else {
        Arc::new(HttpCalendarService::new(&config.calendar).map_err(BootstrapError::Integration)?)
    };

    let handlers = HandlerSet {
        knowledge: KnowledgeHandler::new(knowledge, &config.knowledge),
        scheduler: SchedulerHandler::new(calendar, &config.calendar),
        technical: TechnicalHandler,
        escalation: EscalationHandler,
    };

    let runtime = Arc::new(TriageRuntime::new(
        config.routing.clone(),
        RuntimeDeps {
            classifier,
            handlers,
            sessions,
            messenger,
            notifier,
            audit,
        },
    ));

    let gateway = RuntimeAgentGateway::new(runtime.clone());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ThreadMessageHandler::new(gateway.clone()));
    dispatcher.register(BlockActionHandler::new(gateway));
    let slack_runner =
        SocketModeRunner::new(Arc::new(NoopSocketTransport), dispatcher, ReconnectPolicy::default());

    Ok(Application { config, db_pool, runtime, slack_runner })
}

#[cfg(test)]
mod tests {
    use triage_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_malformed_slack_tokens() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                slack_app_token: Some("invalid-token".to_string()),
                slack_bot_token: Some("xoxb-valid".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_answers_through_the_pipeline() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('sessions', 'session_entries', 'audit_events')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables to be available after bootstrap");
        assert_eq!(table_count, 3, "bootstrap should expose the session and audit tables");

        // No knowledge backend is configured, so an information question
        // degrades to escalation and opens a session.
        let response = app
            .runtime
            .process_customer_message(triage_core::domain::message::Message::new(
                "C1",
                "U1",
                "What is your pricing?",
            ))
            .await;
        assert!(response.escalated);
        assert!(response.session_id.is_some());

        app.db_pool.close().await;
    }
}
