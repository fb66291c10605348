use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use triage_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "TRIAGE_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "TRIAGE_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "TRIAGE_DATABASE_TIMEOUT_SECS"),
    ));

    let app_token = redact_token(config.slack.app_token.expose_secret());
    let bot_token = redact_token(config.slack.bot_token.expose_secret());
    lines.push(render_line(
        "slack.app_token",
        &app_token,
        source("slack.app_token", "TRIAGE_SLACK_APP_TOKEN"),
    ));
    lines.push(render_line(
        "slack.bot_token",
        &bot_token,
        source("slack.bot_token", "TRIAGE_SLACK_BOT_TOKEN"),
    ));
    lines.push(render_line(
        "slack.escalation_channel",
        &config.slack.escalation_channel,
        source("slack.escalation_channel", "TRIAGE_SLACK_ESCALATION_CHANNEL"),
    ));

    lines.push(render_line(
        "llm.enabled",
        &config.llm.enabled.to_string(),
        source("llm.enabled", "TRIAGE_LLM_ENABLED"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "TRIAGE_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        if config.llm.base_url.is_empty() { "<unset>" } else { &config.llm.base_url },
        source("llm.base_url", "TRIAGE_LLM_BASE_URL"),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", "TRIAGE_LLM_API_KEY"),
    ));

    lines.push(render_line(
        "knowledge.base_url",
        if config.knowledge.base_url.is_empty() { "<unset>" } else { &config.knowledge.base_url },
        source("knowledge.base_url", "TRIAGE_KNOWLEDGE_BASE_URL"),
    ));
    lines.push(render_line(
        "calendar.base_url",
        if config.calendar.base_url.is_empty() { "<unset>" } else { &config.calendar.base_url },
        source("calendar.base_url", "TRIAGE_CALENDAR_BASE_URL"),
    ));

    // Routing knobs have no env override; file or default only.
    lines.push(render_line(
        "routing.low_confidence_floor",
        &config.routing.low_confidence_floor.to_string(),
        field_source(
            "routing.low_confidence_floor",
            None,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "routing.message_budget_secs",
        &config.routing.message_budget_secs.to_string(),
        field_source(
            "routing.message_budget_secs",
            None,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "TRIAGE_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "TRIAGE_SERVER_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "TRIAGE_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "TRIAGE_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("triage.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/triage.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
