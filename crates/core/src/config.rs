use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub analytics: AnalyticsConfig,
    pub dataset: DatasetConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_rate_limit_retries: u32,
    pub retry_base_delay_ms: u64,
    pub accept_invalid_certs: bool,
}

#[derive(Clone, Debug)]
pub struct AnalyticsConfig {
    pub api_base_url: String,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
    pub demo_mode: bool,
}

#[derive(Clone, Debug)]
pub struct DatasetConfig {
    pub csv_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_attempts: u32,
    pub narration_row_limit: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub analytics_access_token: Option<String>,
    pub analytics_demo_mode: Option<bool>,
    pub dataset_csv_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: "http://localhost:4000".to_string(),
                api_key: None,
                model: "gemini-2.5-flash".to_string(),
                timeout_secs: 120,
                max_rate_limit_retries: 5,
                retry_base_delay_ms: 1_000,
                accept_invalid_certs: false,
            },
            analytics: AnalyticsConfig {
                api_base_url: "https://analyticsdata.googleapis.com".to_string(),
                access_token: None,
                timeout_secs: 60,
                demo_mode: false,
            },
            dataset: DatasetConfig { csv_url: None, timeout_secs: 10 },
            agent: AgentConfig { max_attempts: 3, narration_row_limit: 10 },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("sitelens.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// True when an LLM key is configured and non-blank.
    pub fn has_llm_credentials(&self) -> bool {
        has_secret(self.llm.api_key.as_ref())
    }

    pub fn has_analytics_credentials(&self) -> bool {
        has_secret(self.analytics.access_token.as_ref())
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_rate_limit_retries) = llm.max_rate_limit_retries {
                self.llm.max_rate_limit_retries = max_rate_limit_retries;
            }
            if let Some(retry_base_delay_ms) = llm.retry_base_delay_ms {
                self.llm.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(accept_invalid_certs) = llm.accept_invalid_certs {
                self.llm.accept_invalid_certs = accept_invalid_certs;
            }
        }

        if let Some(analytics) = patch.analytics {
            if let Some(api_base_url) = analytics.api_base_url {
                self.analytics.api_base_url = api_base_url;
            }
            if let Some(access_token_value) = analytics.access_token {
                self.analytics.access_token = Some(secret_value(access_token_value));
            }
            if let Some(timeout_secs) = analytics.timeout_secs {
                self.analytics.timeout_secs = timeout_secs;
            }
            if let Some(demo_mode) = analytics.demo_mode {
                self.analytics.demo_mode = demo_mode;
            }
        }

        if let Some(dataset) = patch.dataset {
            if let Some(csv_url) = dataset.csv_url {
                self.dataset.csv_url = Some(csv_url);
            }
            if let Some(timeout_secs) = dataset.timeout_secs {
                self.dataset.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_attempts) = agent.max_attempts {
                self.agent.max_attempts = max_attempts;
            }
            if let Some(narration_row_limit) = agent.narration_row_limit {
                self.agent.narration_row_limit = narration_row_limit;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SITELENS_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("SITELENS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SITELENS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SITELENS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SITELENS_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SITELENS_LLM_MAX_RATE_LIMIT_RETRIES") {
            self.llm.max_rate_limit_retries =
                parse_u32("SITELENS_LLM_MAX_RATE_LIMIT_RETRIES", &value)?;
        }
        if let Some(value) = read_env("SITELENS_LLM_RETRY_BASE_DELAY_MS") {
            self.llm.retry_base_delay_ms = parse_u64("SITELENS_LLM_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("SITELENS_LLM_ACCEPT_INVALID_CERTS") {
            self.llm.accept_invalid_certs =
                parse_bool("SITELENS_LLM_ACCEPT_INVALID_CERTS", &value)?;
        }

        if let Some(value) = read_env("SITELENS_ANALYTICS_API_BASE_URL") {
            self.analytics.api_base_url = value;
        }
        if let Some(value) = read_env("SITELENS_ANALYTICS_ACCESS_TOKEN") {
            self.analytics.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SITELENS_ANALYTICS_TIMEOUT_SECS") {
            self.analytics.timeout_secs = parse_u64("SITELENS_ANALYTICS_TIMEOUT_SECS", &value)?;
        }
        let demo_mode =
            read_env("SITELENS_ANALYTICS_DEMO_MODE").or_else(|| read_env("SITELENS_DEMO_MODE"));
        if let Some(value) = demo_mode {
            self.analytics.demo_mode = parse_bool("SITELENS_ANALYTICS_DEMO_MODE", &value)?;
        }

        if let Some(value) = read_env("SITELENS_DATASET_CSV_URL") {
            self.dataset.csv_url = Some(value);
        }
        if let Some(value) = read_env("SITELENS_DATASET_TIMEOUT_SECS") {
            self.dataset.timeout_secs = parse_u64("SITELENS_DATASET_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SITELENS_AGENT_MAX_ATTEMPTS") {
            self.agent.max_attempts = parse_u32("SITELENS_AGENT_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("SITELENS_AGENT_NARRATION_ROW_LIMIT") {
            self.agent.narration_row_limit =
                parse_usize("SITELENS_AGENT_NARRATION_ROW_LIMIT", &value)?;
        }

        if let Some(value) = read_env("SITELENS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SITELENS_SERVER_PORT") {
            self.server.port = parse_u16("SITELENS_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("SITELENS_LOGGING_LEVEL").or_else(|| read_env("SITELENS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SITELENS_LOGGING_FORMAT").or_else(|| read_env("SITELENS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = base_url;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(access_token) = overrides.analytics_access_token {
            self.analytics.access_token = Some(secret_value(access_token));
        }
        if let Some(demo_mode) = overrides.analytics_demo_mode {
            self.analytics.demo_mode = demo_mode;
        }
        if let Some(csv_url) = overrides.dataset_csv_url {
            self.dataset.csv_url = Some(csv_url);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_analytics(&self.analytics)?;
        validate_dataset(&self.dataset)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn has_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false)
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sitelens.toml"), PathBuf::from("config/sitelens.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if !is_http_url(&llm.base_url) {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_rate_limit_retries == 0 {
        return Err(ConfigError::Validation(
            "llm.max_rate_limit_retries must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_analytics(analytics: &AnalyticsConfig) -> Result<(), ConfigError> {
    if !is_http_url(&analytics.api_base_url) {
        return Err(ConfigError::Validation(
            "analytics.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if analytics.timeout_secs == 0 || analytics.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "analytics.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_dataset(dataset: &DatasetConfig) -> Result<(), ConfigError> {
    if let Some(csv_url) = &dataset.csv_url {
        if !is_http_url(csv_url) {
            return Err(ConfigError::Validation(
                "dataset.csv_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if dataset.timeout_secs == 0 || dataset.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "dataset.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_attempts == 0 || agent.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "agent.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if agent.narration_row_limit == 0 {
        return Err(ConfigError::Validation(
            "agent.narration_row_limit must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    analytics: Option<AnalyticsPatch>,
    dataset: Option<DatasetPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_rate_limit_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    accept_invalid_certs: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsPatch {
    api_base_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
    demo_mode: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetPatch {
    csv_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_attempts: Option<u32>,
    narration_row_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.agent.max_attempts == 3, "default attempt ceiling should be 3")?;
        ensure(config.llm.max_rate_limit_retries == 5, "default rate-limit retries should be 5")?;
        ensure(config.llm.retry_base_delay_ms == 1_000, "default backoff base should be 1s")?;
        ensure(!config.llm.accept_invalid_certs, "tls verification must be on by default")?;
        ensure(!config.analytics.demo_mode, "demo mode must be off by default")?;
        ensure(config.dataset.csv_url.is_none(), "no dataset url by default")?;
        ensure(!config.has_llm_credentials(), "no llm key by default")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SITELENS_LLM_KEY", "sk-from-env");
        env::set_var("TEST_SITELENS_GA_TOKEN", "ya29.from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sitelens.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_SITELENS_LLM_KEY}"

[analytics]
access_token = "${TEST_SITELENS_GA_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "llm key should be loaded from environment",
            )?;
            ensure(config.has_analytics_credentials(), "analytics token should be present")?;
            Ok(())
        })();

        clear_vars(&["TEST_SITELENS_LLM_KEY", "TEST_SITELENS_GA_TOKEN"]);
        result
    }

    #[test]
    fn logging_and_demo_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITELENS_LOG_LEVEL", "warn");
        env::set_var("SITELENS_LOG_FORMAT", "pretty");
        env::set_var("SITELENS_DEMO_MODE", "TRUE");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            ensure(config.analytics.demo_mode, "demo mode alias should be honored")?;
            Ok(())
        })();

        clear_vars(&["SITELENS_LOG_LEVEL", "SITELENS_LOG_FORMAT", "SITELENS_DEMO_MODE"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITELENS_LLM_MODEL", "model-from-env");
        env::set_var("SITELENS_DATASET_CSV_URL", "https://env.example.com/export.csv");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("sitelens.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"
base_url = "https://llm.example.com"

[dataset]
csv_url = "https://file.example.com/export.csv"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    dataset_csv_url: Some("https://override.example.com/export.csv".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.dataset.csv_url.as_deref() == Some("https://override.example.com/export.csv"),
                "override dataset url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            ensure(config.llm.base_url == "https://llm.example.com", "file base url should load")?;
            Ok(())
        })();

        clear_vars(&["SITELENS_LLM_MODEL", "SITELENS_DATASET_CSV_URL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITELENS_DATASET_CSV_URL", "ftp://sheets.example.com/export.csv");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("dataset.csv_url")
            );
            ensure(has_message, "validation failure should mention dataset.csv_url")
        })();

        clear_vars(&["SITELENS_DATASET_CSV_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITELENS_AGENT_MAX_ATTEMPTS", "three");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "SITELENS_AGENT_MAX_ATTEMPTS"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["SITELENS_AGENT_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SITELENS_LLM_API_KEY", "sk-secret-value");
        env::set_var("SITELENS_ANALYTICS_ACCESS_TOKEN", "ya29.secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain llm key")?;
            ensure(
                !debug.contains("ya29.secret-value"),
                "debug output should not contain analytics token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["SITELENS_LLM_API_KEY", "SITELENS_ANALYTICS_ACCESS_TOKEN"]);
        result
    }
}
