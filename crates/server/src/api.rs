//! Query endpoints: `POST /query` and the `GET /` service description.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sitelens_agent::AgentRuntime;
use sitelens_core::{InterfaceError, Intent};
use tracing::{error, info};
use uuid::Uuid;

const QUERY_ECHO_CHARS: usize = 100;

#[derive(Clone)]
pub struct ApiState {
    runtime: AgentRuntime,
}

impl ApiState {
    pub fn new(runtime: AgentRuntime) -> Self {
        Self { runtime }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, rename = "propertyId", alias = "property_id")]
    pub property_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub correlation_id: String,
}

impl ApiError {
    fn from_interface(interface: &InterfaceError, query: Option<&str>) -> Self {
        let message = match interface {
            InterfaceError::BadRequest { message, .. } | InterfaceError::Internal { message, .. } => {
                message.clone()
            }
        };
        Self {
            error: interface.user_message().to_string(),
            message,
            query: query.map(|query| query.chars().take(QUERY_ECHO_CHARS).collect()),
            correlation_id: interface.correlation_id().to_string(),
        }
    }
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/query", post(submit_query))
        .with_state(ApiState::new(runtime))
}

pub async fn submit_query(State(state): State<ApiState>, Json(body): Json<QueryRequest>) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    let query = body.query.trim().to_string();
    if query.is_empty() {
        let interface = InterfaceError::BadRequest {
            message: "query must not be empty".to_string(),
            correlation_id,
        };
        return (StatusCode::BAD_REQUEST, Json(ApiError::from_interface(&interface, None))).into_response();
    }

    info!(
        event_name = "api.query.received",
        correlation_id = %correlation_id,
        has_property_id = body.property_id.is_some(),
        "query request received"
    );

    // A panic inside the agents is contained to this task and reported as a 500.
    let runtime = state.runtime.clone();
    let task_query = query.clone();
    let task_correlation_id = correlation_id.clone();
    let property_id = body.property_id;
    let outcome = tokio::spawn(async move {
        runtime
            .handle_query_with_id(&task_query, property_id.as_deref(), &task_correlation_id)
            .await
    })
    .await;

    match outcome {
        Ok(response) => (StatusCode::OK, Json(response.to_json())).into_response(),
        Err(join_error) => {
            error!(
                event_name = "api.query.internal_error",
                correlation_id = %correlation_id,
                error = %join_error,
                "query task terminated unexpectedly"
            );
            let interface = InterfaceError::Internal { message: join_error.to_string(), correlation_id };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiError::from_interface(&interface, Some(&query))))
                .into_response()
        }
    }
}

pub async fn service_info() -> Json<Value> {
    Json(json!({
        "message": "Sitelens - analytics and SEO query service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "query": "POST /query",
            "health": "GET /health"
        },
        "tiers": Intent::ALL.iter().map(|intent| intent.as_str()).collect::<Vec<_>>(),
    }))
}
