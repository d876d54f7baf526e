use sitelens_agent::AgentRuntime;
use sitelens_core::config::{AppConfig, LoadOptions};
use sitelens_core::QueryResponse;
use tracing::Level;

use super::CommandResult;

const EXIT_CONFIG: u8 = 2;
const EXIT_RUNTIME_SETUP: u8 = 3;
const EXIT_QUERY_FAILED: u8 = 4;

pub fn run(query: &str, property_id: Option<&str>) -> CommandResult {
    if query.trim().is_empty() {
        return CommandResult::failure("query", "bad_request", "query must not be empty", EXIT_CONFIG);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "query",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };
    init_stderr_logging(&config);

    let agent_runtime = match AgentRuntime::from_config(&config) {
        Ok(agent_runtime) => agent_runtime,
        Err(error) => {
            return CommandResult::failure(
                "query",
                "runtime_setup",
                format!("agent runtime setup failed: {error}"),
                EXIT_RUNTIME_SETUP,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "query",
                "runtime_setup",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME_SETUP,
            );
        }
    };

    let response = runtime.block_on(agent_runtime.handle_query(query, property_id));
    render_response(&response)
}

/// Prints the response bundle exactly as the HTTP endpoint would return it.
pub fn render_response(response: &QueryResponse) -> CommandResult {
    let output = serde_json::to_string_pretty(&response.to_json()).unwrap_or_else(|error| {
        format!("{{\"error\":\"response serialization failed: {}\"}}", error.to_string().replace('"', "'"))
    });
    let exit_code = if response.is_error() { EXIT_QUERY_FAILED } else { 0 };
    CommandResult { exit_code, output }
}

// Agent logs go to stderr so stdout stays a single JSON document.
fn init_stderr_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sitelens_core::{Intent, QueryError, QueryResponse};

    use super::render_response;

    #[test]
    fn answers_exit_zero_with_the_bundle_on_stdout() {
        let result =
            render_response(&QueryResponse::answer("Two pages are missing titles.", json!([]), None));

        assert_eq!(result.exit_code, 0);
        let payload: Value = serde_json::from_str(&result.output).expect("json output");
        assert_eq!(payload["answer"], json!("Two pages are missing titles."));
    }

    #[test]
    fn error_bundles_exit_non_zero() {
        let error = QueryError::MissingSourceIdentifier { intent: Intent::Analytics };
        let result = render_response(&QueryResponse::error(&error, "sessions last week"));

        assert_eq!(result.exit_code, 4);
        let payload: Value = serde_json::from_str(&result.output).expect("json output");
        assert_eq!(payload["error"], json!("Property ID is required for analytics queries."));
        assert_eq!(payload["query"], json!("sessions last week"));
    }
}
