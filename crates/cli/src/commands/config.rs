use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use sitelens_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct ConfigField {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source =
            field_source(field.key_path, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let field = |key_path: &'static str, env_keys: &'static [&'static str], value: String| ConfigField {
        key_path,
        env_keys,
        value,
    };

    vec![
        field("llm.base_url", &["SITELENS_LLM_BASE_URL"], config.llm.base_url.clone()),
        field("llm.api_key", &["SITELENS_LLM_API_KEY"], redact_secret(config.llm.api_key.as_ref())),
        field("llm.model", &["SITELENS_LLM_MODEL"], config.llm.model.clone()),
        field("llm.timeout_secs", &["SITELENS_LLM_TIMEOUT_SECS"], config.llm.timeout_secs.to_string()),
        field(
            "llm.max_rate_limit_retries",
            &["SITELENS_LLM_MAX_RATE_LIMIT_RETRIES"],
            config.llm.max_rate_limit_retries.to_string(),
        ),
        field(
            "llm.retry_base_delay_ms",
            &["SITELENS_LLM_RETRY_BASE_DELAY_MS"],
            config.llm.retry_base_delay_ms.to_string(),
        ),
        field(
            "llm.accept_invalid_certs",
            &["SITELENS_LLM_ACCEPT_INVALID_CERTS"],
            config.llm.accept_invalid_certs.to_string(),
        ),
        field(
            "analytics.api_base_url",
            &["SITELENS_ANALYTICS_API_BASE_URL"],
            config.analytics.api_base_url.clone(),
        ),
        field(
            "analytics.access_token",
            &["SITELENS_ANALYTICS_ACCESS_TOKEN"],
            redact_secret(config.analytics.access_token.as_ref()),
        ),
        field(
            "analytics.timeout_secs",
            &["SITELENS_ANALYTICS_TIMEOUT_SECS"],
            config.analytics.timeout_secs.to_string(),
        ),
        field(
            "analytics.demo_mode",
            &["SITELENS_ANALYTICS_DEMO_MODE", "SITELENS_DEMO_MODE"],
            config.analytics.demo_mode.to_string(),
        ),
        field(
            "dataset.csv_url",
            &["SITELENS_DATASET_CSV_URL"],
            config.dataset.csv_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field("dataset.timeout_secs", &["SITELENS_DATASET_TIMEOUT_SECS"], config.dataset.timeout_secs.to_string()),
        field("agent.max_attempts", &["SITELENS_AGENT_MAX_ATTEMPTS"], config.agent.max_attempts.to_string()),
        field(
            "agent.narration_row_limit",
            &["SITELENS_AGENT_NARRATION_ROW_LIMIT"],
            config.agent.narration_row_limit.to_string(),
        ),
        field("server.bind_address", &["SITELENS_SERVER_BIND_ADDRESS"], config.server.bind_address.clone()),
        field("server.port", &["SITELENS_SERVER_PORT"], config.server.port.to_string()),
        field("logging.level", &["SITELENS_LOGGING_LEVEL", "SITELENS_LOG_LEVEL"], config.logging.level.clone()),
        field(
            "logging.format",
            &["SITELENS_LOGGING_FORMAT", "SITELENS_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("sitelens.toml"), PathBuf::from("config/sitelens.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };

    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Keys like `sk-...` keep their vendor prefix.
    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
