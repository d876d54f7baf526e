//! Self-correcting generate/validate/execute loop shared by the single-source
//! agents.
//!
//! Each attempt walks `Generate -> Validate -> Execute`. A failure in any step
//! returns to `Generate` carrying the failure text so the model can correct
//! itself, unless the failure is not retryable (bad credentials). The loop
//! never runs more than `max_attempts` attempts.

use async_trait::async_trait;
use sitelens_core::QueryError;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Generation(#[from] LlmError),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Execution(String),
    #[error("{0}")]
    Credentials(String),
}

impl StepError {
    /// Credential and authorization failures cannot be fixed by regenerating.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Credentials(_) => false,
            Self::Generation(error) => !error.is_credential_failure(),
            Self::Invalid(_) | Self::Execution(_) => true,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generate",
            Self::Invalid(_) => "validate",
            Self::Execution(_) | Self::Credentials(_) => "execute",
        }
    }
}

/// The three steps an agent plugs into the loop.
#[async_trait]
pub trait AttemptSteps: Send + Sync {
    type Plan: Send + Sync;
    type Output: Send;

    /// Asks the model for a plan. `previous_error` is the failure of the prior
    /// attempt, if any.
    async fn generate(&self, previous_error: Option<&str>) -> Result<String, StepError>;

    fn validate(&self, raw: &str) -> Result<Self::Plan, StepError>;

    async fn execute(&self, plan: &Self::Plan) -> Result<Self::Output, StepError>;
}

#[derive(Debug)]
pub enum AttemptOutcome<P, O> {
    Succeeded { attempts: u32, plan: P, output: O },
    Aborted { attempts: u32, error: StepError },
    Exhausted { attempts: u32, last_error: StepError },
}

impl<P, O> AttemptOutcome<P, O> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Aborted { attempts, .. }
            | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> Result<Completed<P, O>, QueryError> {
        match self {
            Self::Succeeded { attempts, plan, output } => Ok(Completed { attempts, plan, output }),
            Self::Aborted { error, .. } => Err(QueryError::Credentials(error.to_string())),
            Self::Exhausted { attempts, last_error } => Err(QueryError::AttemptsExhausted {
                attempts,
                last_error: last_error.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct Completed<P, O> {
    pub attempts: u32,
    pub plan: P,
    pub output: O,
}

enum AttemptState<P> {
    Generate { previous_error: Option<String> },
    Validate { raw: String },
    Execute { plan: P },
}

pub async fn run_attempts<S>(
    steps: &S,
    max_attempts: u32,
    agent: &'static str,
    correlation_id: &str,
) -> AttemptOutcome<S::Plan, S::Output>
where
    S: AttemptSteps + ?Sized,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    let mut state = AttemptState::Generate { previous_error: None };

    loop {
        let step = match state {
            AttemptState::Generate { previous_error } => steps
                .generate(previous_error.as_deref())
                .await
                .map(|raw| AttemptState::Validate { raw }),
            AttemptState::Validate { raw } => {
                steps.validate(&raw).map(|plan| AttemptState::Execute { plan })
            }
            AttemptState::Execute { plan } => match steps.execute(&plan).await {
                Ok(output) => {
                    info!(
                        event_name = "agent.attempt_succeeded",
                        correlation_id,
                        agent,
                        attempt,
                        "agent attempt succeeded"
                    );
                    return AttemptOutcome::Succeeded { attempts: attempt, plan, output };
                }
                Err(error) => Err(error),
            },
        };

        state = match step {
            Ok(next) => next,
            Err(error) => {
                warn!(
                    event_name = "agent.attempt_failed",
                    correlation_id,
                    agent,
                    attempt,
                    stage = error.stage(),
                    retryable = error.is_retryable(),
                    error = %error,
                    "agent attempt failed"
                );
                if !error.is_retryable() {
                    return AttemptOutcome::Aborted { attempts: attempt, error };
                }
                if attempt >= max_attempts {
                    return AttemptOutcome::Exhausted { attempts: attempt, last_error: error };
                }
                attempt += 1;
                AttemptState::Generate { previous_error: Some(error.to_string()) }
            }
        };
    }
}
