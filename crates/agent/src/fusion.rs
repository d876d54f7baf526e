use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitelens_core::config::AgentConfig;
use sitelens_core::{fuse, FusedData, QueryError, QueryResponse};
use tracing::{info, warn};

use crate::analytics::{AnalyticsAgent, AnalyticsBackend};
use crate::llm::{strip_code_fence, LlmClient};
use crate::seo::{DatasetSource, SeoAgent};

/// Independent sub-queries for the two sources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionPlan {
    pub analytics_query: String,
    pub seo_query: String,
}

#[derive(Clone, Debug)]
pub struct FusionAnswer {
    pub answer: String,
    pub data: FusedData,
    pub plan: FusionPlan,
}

impl FusionAnswer {
    pub fn into_response(self) -> QueryResponse {
        let data = serde_json::to_value(&self.data).unwrap_or(Value::Null);
        QueryResponse::answer(self.answer, data, None)
    }
}

/// Answers questions that need traffic and crawl data together. Either side
/// may fail; the join then simply finds no partner rows for it.
pub struct FusionOrchestrator<'a> {
    llm: &'a dyn LlmClient,
    backend: &'a dyn AnalyticsBackend,
    dataset: &'a dyn DatasetSource,
    config: &'a AgentConfig,
}

impl<'a> FusionOrchestrator<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        backend: &'a dyn AnalyticsBackend,
        dataset: &'a dyn DatasetSource,
        config: &'a AgentConfig,
    ) -> Self {
        Self { llm, backend, dataset, config }
    }

    pub async fn process_query(
        &self,
        query: &str,
        property_id: Option<&str>,
        correlation_id: &str,
    ) -> Result<FusionAnswer, QueryError> {
        let property_id = property_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(QueryError::MissingSourceIdentifier { intent: sitelens_core::Intent::Fusion })?;

        let plan = self.decompose(query).await?;
        info!(
            event_name = "fusion.decomposed",
            correlation_id,
            analytics_query = %plan.analytics_query,
            seo_query = %plan.seo_query,
            "fusion query decomposed"
        );

        let analytics = AnalyticsAgent::new(self.llm, self.backend, self.config)
            .process_query(&plan.analytics_query, property_id, correlation_id)
            .await;
        let seo = SeoAgent::new(self.llm, self.dataset, self.config)
            .process_query(&plan.seo_query, correlation_id)
            .await;

        let (analytics_rows, analytics_error) = match analytics {
            Ok(answer) => (answer.data.rows, None),
            Err(error) => {
                warn!(
                    event_name = "fusion.side_failed",
                    correlation_id,
                    side = "analytics",
                    error = %error,
                    "analytics side failed; joining without it"
                );
                (Vec::new(), Some(error.to_string()))
            }
        };
        let (seo_rows, seo_error) = match seo {
            Ok(answer) => (answer.table.records(), None),
            Err(error) => {
                warn!(
                    event_name = "fusion.side_failed",
                    correlation_id,
                    side = "seo",
                    error = %error,
                    "seo side failed; joining without it"
                );
                (Vec::new(), Some(error.to_string()))
            }
        };

        let mut data = fuse(&analytics_rows, &seo_rows);
        data.analytics_error = analytics_error;
        data.seo_error = seo_error;
        info!(
            event_name = "fusion.joined",
            correlation_id,
            analytics_count = data.analytics_count,
            seo_count = data.seo_count,
            matched_count = data.matched_count,
            "fusion join complete"
        );

        let answer = self.narrate(query, &data, correlation_id).await;
        Ok(FusionAnswer { answer, data, plan })
    }

    async fn decompose(&self, query: &str) -> Result<FusionPlan, QueryError> {
        let prompt = format!(
            "You are a query planner.\n\
             Decompose the following complex query into two independent sub-queries:\n\
             1. An analytics query (for GA4 traffic data)\n\
             2. An SEO query (for the site crawl export)\n\n\
             Query: \"{query}\"\n\n\
             Respond with a JSON object:\n\
             {{\"analytics_query\": \"...\", \"seo_query\": \"...\"}}"
        );

        let raw = self.llm.complete(&prompt).await.map_err(|error| QueryError::Planning(error.to_string()))?;
        serde_json::from_str(strip_code_fence(&raw)).map_err(|error| QueryError::Planning(error.to_string()))
    }

    async fn narrate(&self, query: &str, data: &FusedData, correlation_id: &str) -> String {
        let view = serde_json::json!({
            "fused_data": data.narration_view(self.config.narration_row_limit),
            "analytics_count": data.analytics_count,
            "seo_count": data.seo_count,
            "matched_count": data.matched_count,
        });
        let prompt = format!(
            "You are a smart assistant.\n\
             User Query: \"{query}\"\n\
             Fused Data: {}\n\n\
             Provide a comprehensive answer combining insights from both Analytics and SEO data.\n\
             Correlate the data points (e.g., \"Pages with high traffic but poor SEO metadata\").\n\
             Explain the relationship between the metrics and provide actionable insights.",
            serde_json::to_string_pretty(&view).unwrap_or_default(),
        );

        match self.llm.complete(&prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(
                    event_name = "fusion.narration_failed",
                    correlation_id,
                    error = %error,
                    "narration failed; returning summary"
                );
                format!(
                    "Joined {} analytics rows with {} SEO rows; {} pages matched.",
                    data.analytics_count, data.seo_count, data.matched_count
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sitelens_core::config::AgentConfig;
    use sitelens_core::{Intent, QueryError, Record, ReportData};

    use super::FusionOrchestrator;
    use crate::analytics::testing::FakeBackend;
    use crate::analytics::AnalyticsError;
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::LlmError;
    use crate::seo::testing::{FakeDataset, CRAWL};

    const PLAN: &str = r#"```json
{"analytics_query": "top pages by views last 7 days", "seo_query": "all pages with their titles"}
```"#;
    const REPORT: &str = r#"{"dimensions": ["pagePath"], "metrics": ["screenPageViews"]}"#;
    const ALL_PAGES: &str = r#"{"select": ["Address", "Title 1"]}"#;

    fn agent_config() -> AgentConfig {
        AgentConfig { max_attempts: 3, narration_row_limit: 10 }
    }

    fn views(paths: &[&str]) -> ReportData {
        let rows = paths
            .iter()
            .map(|path| match json!({"pagePath": path, "screenPageViews": "100"}) {
                Value::Object(map) => map,
                _ => Record::new(),
            })
            .collect::<Vec<_>>();
        ReportData {
            headers: vec!["pagePath".to_string(), "screenPageViews".to_string()],
            row_count: rows.len() as u64,
            rows,
        }
    }

    #[tokio::test]
    async fn matched_count_counts_analytics_paths_found_in_the_crawl() {
        let llm = ScriptedLlm::new()
            .reply(PLAN)
            .reply(REPORT)
            .reply("analytics narration")
            .reply(ALL_PAGES)
            .reply("seo narration")
            .reply("Three of four top pages are in the crawl.");
        let backend = FakeBackend::returning(views(&["/about", "/blog/", "/", "/not-crawled"]));
        let dataset = FakeDataset::csv(CRAWL);
        let config = agent_config();
        let orchestrator = FusionOrchestrator::new(&llm, &backend, &dataset, &config);

        let answer = orchestrator
            .process_query("top pages by views with their title tags", Some("123456"), "f-1")
            .await
            .expect("fusion answer");

        assert_eq!(answer.plan.analytics_query, "top pages by views last 7 days");
        assert_eq!(answer.data.analytics_count, 4);
        assert_eq!(answer.data.seo_count, 5);
        assert_eq!(answer.data.matched_count, 3);
        assert_eq!(answer.data.fused_data[0].seo["Title 1"], json!("About us"));
        assert_eq!(answer.answer, "Three of four top pages are in the crawl.");
        assert_eq!(backend.requests()[0].1.metrics, vec!["screenPageViews".to_string()]);

        let response = answer.into_response().to_json();
        assert_eq!(response["data"]["matched_count"], json!(3));
        assert!(response.get("thought_process").is_none());
        assert!(response["data"].get("analytics_error").is_none());
    }

    #[tokio::test]
    async fn plans_wrapped_in_prose_are_still_decomposed() {
        let llm = ScriptedLlm::new()
            .reply(&format!("Here is how I would split it:\n{PLAN}\nLet me know if this works."))
            .reply(REPORT)
            .reply("analytics narration")
            .reply(&format!("The program:\n```json\n{ALL_PAGES}\n```"))
            .reply("seo narration")
            .reply("fusion narration");
        let backend = FakeBackend::returning(views(&["/about"]));
        let dataset = FakeDataset::csv(CRAWL);
        let config = agent_config();
        let orchestrator = FusionOrchestrator::new(&llm, &backend, &dataset, &config);

        let answer = orchestrator
            .process_query("top pages with titles", Some("123456"), "f-prose")
            .await
            .expect("prose around fences should not fail planning");

        assert_eq!(answer.plan.seo_query, "all pages with their titles");
        assert_eq!(answer.data.matched_count, 1);
        assert_eq!(llm.calls(), 6);
    }

    #[tokio::test]
    async fn analytics_failure_keeps_the_seo_side() {
        let llm = ScriptedLlm::new()
            .reply(PLAN)
            .reply(REPORT)
            .reply(ALL_PAGES)
            .reply("seo narration")
            .reply("Only crawl data is available.");
        let backend = FakeBackend::failing(|| AnalyticsError::MissingCredentials);
        let dataset = FakeDataset::csv(CRAWL);
        let config = agent_config();
        let orchestrator = FusionOrchestrator::new(&llm, &backend, &dataset, &config);

        let answer = orchestrator
            .process_query("top pages with titles", Some("123456"), "f-2")
            .await
            .expect("partial answer");

        assert_eq!(answer.data.analytics_count, 0);
        assert_eq!(answer.data.matched_count, 0);
        assert_eq!(answer.data.seo_count, 5);
        assert_eq!(answer.data.seo_data.len(), 5);
        assert_eq!(answer.data.seo_data[1]["Address"], json!("http://example.com/about"));
        assert!(answer
            .data
            .analytics_error
            .as_deref()
            .is_some_and(|error| error.starts_with("Credential Error")));
        assert!(answer.data.seo_error.is_none());
    }

    #[tokio::test]
    async fn seo_failure_keeps_analytics_rows_unmatched() {
        let llm = ScriptedLlm::new()
            .reply(PLAN)
            .reply(REPORT)
            .reply("analytics narration")
            .reply("Only traffic data is available.");
        let backend = FakeBackend::returning(views(&["/about", "/blog"]));
        let dataset = FakeDataset::unavailable();
        let config = agent_config();
        let orchestrator = FusionOrchestrator::new(&llm, &backend, &dataset, &config);

        let answer = orchestrator
            .process_query("top pages with titles", Some("123456"), "f-3")
            .await
            .expect("partial answer");

        assert_eq!(answer.data.analytics_count, 2);
        assert_eq!(answer.data.matched_count, 0);
        assert!(answer.data.fused_data.iter().all(|record| record.seo.is_empty()));
        assert_eq!(answer.data.seo_error.as_deref(), Some("SEO data not available."));
    }

    #[tokio::test]
    async fn missing_property_fails_before_any_call() {
        let llm = ScriptedLlm::new().reply(PLAN);
        let backend = FakeBackend::returning(views(&["/"]));
        let dataset = FakeDataset::csv(CRAWL);
        let config = agent_config();
        let orchestrator = FusionOrchestrator::new(&llm, &backend, &dataset, &config);

        let error = orchestrator.process_query("top pages", Some("  "), "f-4").await.expect_err("no id");

        assert_eq!(error, QueryError::MissingSourceIdentifier { intent: Intent::Fusion });
        assert_eq!(llm.calls(), 0);
        assert_eq!(dataset.fetches(), 0);
    }

    #[tokio::test]
    async fn decomposition_failures_are_planning_errors() {
        let llm = ScriptedLlm::new().reply("I cannot split this query.").fail(LlmError::Timeout);
        let backend = FakeBackend::returning(views(&["/"]));
        let dataset = FakeDataset::csv(CRAWL);
        let config = agent_config();
        let orchestrator = FusionOrchestrator::new(&llm, &backend, &dataset, &config);

        let error = orchestrator.process_query("top pages", Some("1"), "f-5").await.expect_err("bad plan");
        assert!(error.to_string().starts_with("Failed to plan fusion query:"));

        let error = orchestrator.process_query("top pages", Some("1"), "f-6").await.expect_err("timeout");
        assert_eq!(error, QueryError::Planning("text generation timed out".to_string()));
        assert!(backend.requests().is_empty());
    }
}
