use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use routetracker_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Sources {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl Sources {
    fn detect() -> Self {
        let path = detect_config_path();
        let doc = load_config_file_doc(path.as_deref());
        Self { path, doc }
    }

    fn line(&self, key: &str, env_key: &str, value: &str) -> String {
        let source = field_source(key, Some(env_key), self.doc.as_ref(), self.path.as_deref());
        render_line(key, value, source)
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let sources = Sources::detect();

    let database = &config.database;
    let server = &config.server;
    let notifications = &config.notifications;
    let api_key = notifications
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        sources.line("database.url", "ROUTETRACKER_DATABASE_URL", &database.url),
        sources.line(
            "database.max_connections",
            "ROUTETRACKER_DATABASE_MAX_CONNECTIONS",
            &database.max_connections.to_string(),
        ),
        sources.line(
            "database.timeout_secs",
            "ROUTETRACKER_DATABASE_TIMEOUT_SECS",
            &database.timeout_secs.to_string(),
        ),
        sources.line("server.bind_address", "ROUTETRACKER_SERVER_BIND_ADDRESS", &server.bind_address),
        sources.line("server.port", "ROUTETRACKER_SERVER_PORT", &server.port.to_string()),
        sources.line(
            "server.graceful_shutdown_secs",
            "ROUTETRACKER_SERVER_GRACEFUL_SHUTDOWN_SECS",
            &server.graceful_shutdown_secs.to_string(),
        ),
        sources.line(
            "notifications.enabled",
            "ROUTETRACKER_NOTIFICATIONS_ENABLED",
            &notifications.enabled.to_string(),
        ),
        sources.line(
            "notifications.endpoint",
            "ROUTETRACKER_NOTIFICATIONS_ENDPOINT",
            notifications.endpoint.as_deref().unwrap_or("<unset>"),
        ),
        sources.line("notifications.api_key", "ROUTETRACKER_NOTIFICATIONS_API_KEY", &api_key),
        sources.line(
            "notifications.from_address",
            "ROUTETRACKER_NOTIFICATIONS_FROM_ADDRESS",
            &notifications.from_address,
        ),
        sources.line(
            "notifications.app_url",
            "ROUTETRACKER_NOTIFICATIONS_APP_URL",
            &notifications.app_url,
        ),
        sources.line(
            "notifications.timeout_ms",
            "ROUTETRACKER_NOTIFICATIONS_TIMEOUT_MS",
            &notifications.timeout_ms.to_string(),
        ),
        sources.line("logging.level", "ROUTETRACKER_LOGGING_LEVEL", &config.logging.level),
        sources.line(
            "logging.format",
            "ROUTETRACKER_LOGGING_FORMAT",
            &format!("{:?}", config.logging.format),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["routetracker.toml", "config/routetracker.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

    if let Some((prefix, _)) = trimmed.split_once('_') {
        return format!("{prefix}_***");
    }

    "<redacted>".to_string()
}
