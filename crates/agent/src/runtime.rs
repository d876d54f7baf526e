use std::sync::Arc;

use sitelens_core::config::{AgentConfig, AppConfig};
use sitelens_core::{format_output, Intent, QueryError, QueryResponse};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::analytics::{AnalyticsAgent, AnalyticsBackend, AnalyticsError, DemoDataBackend, Ga4DataApiBackend};
use crate::classifier::RequestClassifier;
use crate::fusion::FusionOrchestrator;
use crate::llm::{LlmClient, LlmError, OpenAiCompatibleClient, RateLimitRetry};
use crate::seo::{CsvSheetSource, DatasetError, DatasetSource, SeoAgent};

#[derive(Debug, Error)]
pub enum RuntimeSetupError {
    #[error("text generation client: {0}")]
    Llm(#[from] LlmError),
    #[error("analytics backend: {0}")]
    Analytics(#[from] AnalyticsError),
    #[error("dataset source: {0}")]
    Dataset(#[from] DatasetError),
}

/// Front door for one query at a time. Collaborators are shared; agents are
/// created per request and hold no state between requests.
#[derive(Clone)]
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    backend: Arc<dyn AnalyticsBackend>,
    dataset: Arc<dyn DatasetSource>,
    config: AgentConfig,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        backend: Arc<dyn AnalyticsBackend>,
        dataset: Arc<dyn DatasetSource>,
        config: AgentConfig,
    ) -> Self {
        Self { llm, backend, dataset, config }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RuntimeSetupError> {
        let llm = RateLimitRetry::from_config(OpenAiCompatibleClient::from_config(&config.llm)?, &config.llm);

        let ga4 = Ga4DataApiBackend::from_config(&config.analytics)?;
        let backend: Arc<dyn AnalyticsBackend> = if config.analytics.demo_mode {
            Arc::new(DemoDataBackend::new(ga4))
        } else {
            Arc::new(ga4)
        };

        let dataset = CsvSheetSource::from_config(&config.dataset)?;

        Ok(Self::new(Arc::new(llm), backend, Arc::new(dataset), config.agent.clone()))
    }

    pub fn dataset(&self) -> &dyn DatasetSource {
        self.dataset.as_ref()
    }

    /// Classifies, dispatches and formats one query. Every failure is returned
    /// as an error bundle.
    pub async fn handle_query(&self, query: &str, property_id: Option<&str>) -> QueryResponse {
        let correlation_id = Uuid::new_v4().to_string();
        self.handle_query_with_id(query, property_id, &correlation_id).await
    }

    pub async fn handle_query_with_id(
        &self,
        query: &str,
        property_id: Option<&str>,
        correlation_id: &str,
    ) -> QueryResponse {
        let property_id = property_id.map(str::trim).filter(|id| !id.is_empty());
        info!(
            event_name = "query.received",
            correlation_id,
            query_chars = query.chars().count(),
            has_property_id = property_id.is_some(),
            "query received"
        );

        let intent = RequestClassifier::new(self.llm.as_ref())
            .classify(query, property_id.is_some(), correlation_id)
            .await;

        let response = match self.dispatch(intent, query, property_id, correlation_id).await {
            Ok(response) => response,
            Err(error) => {
                info!(
                    event_name = "query.failed",
                    correlation_id,
                    intent = %intent,
                    error_class = error.error_class(),
                    error = %error,
                    "query failed"
                );
                QueryResponse::error(&error, query)
            }
        };

        let response = format_output(query, response);
        info!(
            event_name = "query.completed",
            correlation_id,
            intent = %intent,
            is_error = response.is_error(),
            "query completed"
        );
        response
    }

    async fn dispatch(
        &self,
        intent: Intent,
        query: &str,
        property_id: Option<&str>,
        correlation_id: &str,
    ) -> Result<QueryResponse, QueryError> {
        let llm = self.llm.as_ref();
        let backend = self.backend.as_ref();
        let dataset = self.dataset.as_ref();

        match (intent, property_id) {
            (Intent::Seo, _) => SeoAgent::new(llm, dataset, &self.config)
                .process_query(query, correlation_id)
                .await
                .map(|answer| answer.into_response()),
            (Intent::Analytics, Some(property_id)) => AnalyticsAgent::new(llm, backend, &self.config)
                .process_query(query, property_id, correlation_id)
                .await
                .map(|answer| answer.into_response()),
            (Intent::Fusion, Some(_)) => FusionOrchestrator::new(llm, backend, dataset, &self.config)
                .process_query(query, property_id, correlation_id)
                .await
                .map(|answer| answer.into_response()),
            (intent, None) => Err(QueryError::MissingSourceIdentifier { intent }),
        }
    }
}
