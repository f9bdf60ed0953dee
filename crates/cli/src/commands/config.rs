use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agentmart_core::config::{AppConfig, LoadOptions};
use serde_json::{Map, Value as JsonValue};
use toml::Value;

use crate::commands::CommandResult;

/// Every reported key with the environment variables that can override it,
/// highest precedence first.
const FIELDS: &[(&str, &[&str])] = &[
    ("database.url", &["AGENTMART_DATABASE_URL"]),
    ("database.max_connections", &["AGENTMART_DATABASE_MAX_CONNECTIONS"]),
    ("database.timeout_secs", &["AGENTMART_DATABASE_TIMEOUT_SECS"]),
    ("server.bind_address", &["AGENTMART_SERVER_BIND_ADDRESS"]),
    ("server.port", &["AGENTMART_SERVER_PORT"]),
    ("server.health_check_port", &["AGENTMART_SERVER_HEALTH_CHECK_PORT"]),
    ("server.graceful_shutdown_secs", &["AGENTMART_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ("lead_webhook.url", &["AGENTMART_LEAD_WEBHOOK_URL"]),
    ("lead_webhook.timeout_secs", &["AGENTMART_LEAD_WEBHOOK_TIMEOUT_SECS"]),
    ("lead_webhook.secret", &["AGENTMART_LEAD_WEBHOOK_SECRET"]),
    ("auth.session_ttl_hours", &["AGENTMART_AUTH_SESSION_TTL_HOURS"]),
    ("auth.cookie_secure", &["AGENTMART_AUTH_COOKIE_SECURE"]),
    ("site.brand_name", &["AGENTMART_SITE_BRAND_NAME"]),
    ("logging.level", &["AGENTMART_LOGGING_LEVEL", "AGENTMART_LOG_LEVEL"]),
    ("logging.format", &["AGENTMART_LOGGING_FORMAT", "AGENTMART_LOG_FORMAT"]),
];

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let effective = config.redacted_summary();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut sources = Map::new();
    for (key_path, env_keys) in FIELDS {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        let value = lookup(&effective, key_path).map(render_value).unwrap_or_else(|| "<unset>".into());
        lines.push(render_line(key_path, &value, &source));
        sources.insert((*key_path).to_string(), JsonValue::String(source));
    }

    CommandResult::success_with_details(
        "config",
        lines.join("\n"),
        Some(serde_json::json!({ "effective": effective, "sources": sources })),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    ["agentmart.toml", "config/agentmart.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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

fn lookup<'a>(root: &'a JsonValue, key_path: &str) -> Option<&'a JsonValue> {
    key_path.split('.').try_fold(root, |current, key| current.get(key))
}

fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "<unset>".to_string(),
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}
