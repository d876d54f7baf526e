use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use sitelens_core::config::AppConfig;

#[derive(Clone)]
pub struct HealthState {
    llm_credentials: bool,
    analytics_credentials: bool,
    dataset_url: Option<String>,
}

impl HealthState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            llm_credentials: config.has_llm_credentials(),
            analytics_credentials: config.has_analytics_credentials(),
            dataset_url: config.dataset.csv_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: &str) -> Self {
        Self { status: "ready", detail: detail.to_string() }
    }

    fn degraded(detail: &str) -> Self {
        Self { status: "degraded", detail: detail.to_string() }
    }

    fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub llm_credentials: HealthCheck,
    pub analytics_credentials: HealthCheck,
    pub dataset_source: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Reports configuration readiness only; no collaborator is contacted.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let llm_credentials = if state.llm_credentials {
        HealthCheck::ready("llm api key configured")
    } else {
        HealthCheck::degraded("llm.api_key is not set")
    };
    let analytics_credentials = if state.analytics_credentials {
        HealthCheck::ready("analytics access token configured")
    } else {
        HealthCheck::degraded("analytics.access_token is not set; analytics and fusion queries will fail")
    };
    let dataset_source = match &state.dataset_url {
        Some(url) => HealthCheck::ready(&format!("crawl export at {url}")),
        None => HealthCheck::degraded("dataset.csv_url is not set; seo queries will fail"),
    };

    let ready = llm_credentials.is_ready() && analytics_credentials.is_ready() && dataset_source.is_ready();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck::ready("sitelens-server runtime initialized"),
        llm_credentials,
        analytics_credentials,
        dataset_source,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
