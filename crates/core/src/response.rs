use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::QueryError;

/// Case-insensitive phrases that ask for structured output without narration.
pub const RAW_OUTPUT_TRIGGERS: &[&str] = &["json", "json format", "in json", "as json", "return json"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerBundle {
    pub answer: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_process: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBundle {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Every query ends in exactly one of these shapes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Answer(AnswerBundle),
    Raw { data: Value },
    Error(ErrorBundle),
}

impl QueryResponse {
    pub fn answer(answer: impl Into<String>, data: Value, thought_process: Option<Value>) -> Self {
        Self::Answer(AnswerBundle { answer: answer.into(), data, thought_process })
    }

    pub fn error(error: &QueryError, query: &str) -> Self {
        Self::Error(ErrorBundle { error: error.to_string(), query: Some(query.to_string()) })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|error| {
            serde_json::json!({ "error": format!("response could not be encoded: {error}") })
        })
    }
}

pub fn wants_raw_output(query: &str) -> bool {
    let lowered = query.to_lowercase();
    RAW_OUTPUT_TRIGGERS.iter().any(|trigger| lowered.contains(trigger))
}

/// Reduces an answer to `{data}` when the query asked for raw output. Error
/// bundles are returned unchanged.
pub fn format_output(query: &str, response: QueryResponse) -> QueryResponse {
    match response {
        QueryResponse::Answer(bundle) if wants_raw_output(query) => {
            QueryResponse::Raw { data: bundle.data }
        }
        other => other,
    }
}
