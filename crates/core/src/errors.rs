use thiserror::Error;

use crate::intent::Intent;

/// Unrecovered failures of a single query. Each one is rendered into an
/// `{ "error": ... }` bundle; none of them reaches the caller as a fault.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Property ID is required for {intent} queries.")]
    MissingSourceIdentifier { intent: Intent },
    #[error("Failed after {attempts} attempts. Last error: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },
    #[error("Credential Error: {0}")]
    Credentials(String),
    #[error("SEO data not available.")]
    DataUnavailable,
    #[error("Failed to plan fusion query: {0}")]
    Planning(String),
}

impl QueryError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::MissingSourceIdentifier { .. } => "missing_source_identifier",
            Self::AttemptsExhausted { .. } => "attempts_exhausted",
            Self::Credentials(_) => "credentials",
            Self::DataUnavailable => "data_unavailable",
            Self::Planning(_) => "planning",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Internal { .. } => "Internal server error",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}
