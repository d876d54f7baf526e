//! Analytics agent: natural language to a structured report request, executed
//! against an analytics backend and narrated.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use rand::Rng;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sitelens_core::config::{AgentConfig, AnalyticsConfig};
use sitelens_core::report::{ACCEPTED_DIMENSIONS, ACCEPTED_METRICS};
use sitelens_core::{QueryError, QueryResponse, Record, ReportData, ReportRequest};
use thiserror::Error;
use tracing::{info, warn};

use crate::attempt::{run_attempts, AttemptSteps, StepError};
use crate::llm::{strip_code_fence, LlmClient};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics credentials are not configured; set analytics.access_token")]
    MissingCredentials,
    #[error("analytics API rejected the configured credentials ({status})")]
    InvalidCredentials { status: StatusCode },
    #[error("analytics API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("analytics API transport failed: {0}")]
    Transport(String),
    #[error("analytics API response could not be decoded: {0}")]
    Decode(String),
}

impl AnalyticsError {
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::MissingCredentials | Self::InvalidCredentials { .. })
    }
}

impl From<reqwest::Error> for AnalyticsError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<AnalyticsError> for StepError {
    fn from(error: AnalyticsError) -> Self {
        if error.is_credential_failure() {
            Self::Credentials(error.to_string())
        } else {
            Self::Execution(error.to_string())
        }
    }
}

/// Runs a validated report request scoped to one analytics property.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn run_report(
        &self,
        property_id: &str,
        request: &ReportRequest,
    ) -> Result<ReportData, AnalyticsError>;
}

/// GA4 Data API `runReport` over HTTPS with a bearer access token.
pub struct Ga4DataApiBackend {
    client: Client,
    api_base_url: String,
    access_token: Option<SecretString>,
}

impl Ga4DataApiBackend {
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self, AnalyticsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| AnalyticsError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn report_url(&self, property_id: &str) -> String {
        format!("{}/v1beta/properties/{}:runReport", self.api_base_url, property_id.trim())
    }
}

#[async_trait]
impl AnalyticsBackend for Ga4DataApiBackend {
    async fn run_report(
        &self,
        property_id: &str,
        request: &ReportRequest,
    ) -> Result<ReportData, AnalyticsError> {
        let token = self
            .access_token
            .as_ref()
            .map(|token| token.expose_secret().trim())
            .filter(|token| !token.is_empty())
            .ok_or(AnalyticsError::MissingCredentials)?;

        let response = self
            .client
            .post(self.report_url(property_id))
            .bearer_auth(token)
            .json(&RunReportBody::from(request))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AnalyticsError::InvalidCredentials { status });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyticsError::Status { status, body: body.chars().take(500).collect() });
        }

        let report: RunReportResponse = response.json().await?;
        Ok(report.into_report_data())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReportBody {
    date_ranges: Vec<Ga4DateRange>,
    dimensions: Vec<Ga4Named>,
    metrics: Vec<Ga4Named>,
    limit: String,
}

impl From<&ReportRequest> for RunReportBody {
    fn from(request: &ReportRequest) -> Self {
        Self {
            date_ranges: request
                .date_ranges
                .iter()
                .map(|range| Ga4DateRange {
                    start_date: range.start_date.clone(),
                    end_date: range.end_date.clone(),
                })
                .collect(),
            dimensions: request.dimensions.iter().map(|name| Ga4Named { name: name.clone() }).collect(),
            metrics: request.metrics.iter().map(|name| Ga4Named { name: name.clone() }).collect(),
            limit: request.limit.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Ga4DateRange {
    start_date: String,
    end_date: String,
}

#[derive(Deserialize, Serialize)]
struct Ga4Named {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    #[serde(default)]
    dimension_headers: Vec<Ga4Named>,
    #[serde(default)]
    metric_headers: Vec<Ga4Named>,
    #[serde(default)]
    rows: Vec<Ga4Row>,
    #[serde(default)]
    row_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ga4Row {
    #[serde(default)]
    dimension_values: Vec<Ga4Value>,
    #[serde(default)]
    metric_values: Vec<Ga4Value>,
}

#[derive(Deserialize)]
struct Ga4Value {
    #[serde(default)]
    value: String,
}

impl RunReportResponse {
    fn into_report_data(self) -> ReportData {
        let headers = self
            .dimension_headers
            .iter()
            .chain(self.metric_headers.iter())
            .map(|header| header.name.clone())
            .collect::<Vec<_>>();

        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                let dimensions = self.dimension_headers.iter().zip(row.dimension_values);
                let metrics = self.metric_headers.iter().zip(row.metric_values);
                dimensions
                    .chain(metrics)
                    .map(|(header, cell)| (header.name.clone(), Value::String(cell.value)))
                    .collect::<Record>()
            })
            .collect::<Vec<_>>();

        let row_count = self.row_count.unwrap_or(rows.len() as u64);
        ReportData { headers, rows, row_count }
    }
}

const DEMO_PAGE_PATHS: &[&str] =
    &["/", "/pricing", "/about", "/blog", "/contact", "/features", "/products", "/careers"];
const DEMO_COUNTRIES: &[&str] =
    &["United States", "United Kingdom", "Canada", "Australia", "Germany"];
const DEMO_DEVICES: &[&str] = &["desktop", "mobile", "tablet"];

/// Wraps a backend and replaces empty reports with plausible sample rows so a
/// property without traffic can still be demonstrated.
pub struct DemoDataBackend<B> {
    inner: B,
}

impl<B> DemoDataBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B> AnalyticsBackend for DemoDataBackend<B>
where
    B: AnalyticsBackend,
{
    async fn run_report(
        &self,
        property_id: &str,
        request: &ReportRequest,
    ) -> Result<ReportData, AnalyticsError> {
        let data = self.inner.run_report(property_id, request).await?;
        if !data.is_empty() {
            return Ok(data);
        }

        info!(
            event_name = "analytics.demo_rows_synthesized",
            property_id,
            dimensions = ?request.dimensions,
            metrics = ?request.metrics,
            "report was empty; synthesizing demo rows"
        );
        Ok(synthesize_report(request, Local::now().date_naive(), &mut rand::thread_rng()))
    }
}

/// Seven daily rows when `date` is a dimension, ten otherwise.
pub fn synthesize_report<R: Rng>(request: &ReportRequest, today: NaiveDate, rng: &mut R) -> ReportData {
    let row_total = if request.has_dimension("date") { 7 } else { 10 };

    let rows = (0..row_total)
        .map(|index| {
            let mut row = Record::new();
            for dimension in &request.dimensions {
                row.insert(dimension.clone(), Value::String(demo_dimension(dimension, index, row_total, today)));
            }
            for metric in &request.metrics {
                row.insert(metric.clone(), Value::String(demo_metric(metric, rng)));
            }
            row
        })
        .collect::<Vec<_>>();

    ReportData {
        headers: request.dimensions.iter().chain(request.metrics.iter()).cloned().collect(),
        row_count: rows.len() as u64,
        rows,
    }
}

fn demo_dimension(dimension: &str, index: usize, row_total: usize, today: NaiveDate) -> String {
    match dimension {
        "date" => today
            .checked_sub_days(Days::new((row_total - 1 - index) as u64))
            .unwrap_or(today)
            .format("%Y%m%d")
            .to_string(),
        "pagePath" | "pagePathPlusQueryString" => DEMO_PAGE_PATHS[index % DEMO_PAGE_PATHS.len()].to_string(),
        "country" => DEMO_COUNTRIES[index % DEMO_COUNTRIES.len()].to_string(),
        "deviceCategory" => DEMO_DEVICES[index % DEMO_DEVICES.len()].to_string(),
        other => format!("demo_{other}_{index}"),
    }
}

fn demo_metric<R: Rng>(metric: &str, rng: &mut R) -> String {
    if metric.contains("Users") || metric.contains("users") {
        rng.gen_range(150..=850).to_string()
    } else if metric == "sessions" {
        rng.gen_range(200..=1200).to_string()
    } else if metric.contains("PageViews") {
        rng.gen_range(400..=2000).to_string()
    } else if metric.contains("Rate") {
        format!("{:.2}", rng.gen_range(0.3..0.6))
    } else if metric.contains("Duration") {
        rng.gen_range(120..=600).to_string()
    } else {
        rng.gen_range(50..=500).to_string()
    }
}

/// A narrated analytics result.
#[derive(Clone, Debug)]
pub struct AnalyticsAnswer {
    pub answer: String,
    pub data: ReportData,
    pub request: ReportRequest,
    pub attempts: u32,
}

impl AnalyticsAnswer {
    pub fn into_response(self) -> QueryResponse {
        let data = serde_json::to_value(&self.data).unwrap_or(Value::Null);
        let thought_process = json!({ "steps": self.attempts, "final_params": self.request });
        QueryResponse::answer(self.answer, data, Some(thought_process))
    }
}

pub struct AnalyticsAgent<'a> {
    llm: &'a dyn LlmClient,
    backend: &'a dyn AnalyticsBackend,
    config: &'a AgentConfig,
}

impl<'a> AnalyticsAgent<'a> {
    pub fn new(llm: &'a dyn LlmClient, backend: &'a dyn AnalyticsBackend, config: &'a AgentConfig) -> Self {
        Self { llm, backend, config }
    }

    pub async fn process_query(
        &self,
        query: &str,
        property_id: &str,
        correlation_id: &str,
    ) -> Result<AnalyticsAnswer, QueryError> {
        let steps = ReportSteps { llm: self.llm, backend: self.backend, query, property_id };
        let completed =
            run_attempts(&steps, self.config.max_attempts, "analytics", correlation_id).await.into_result()?;

        let answer = self.narrate(query, &completed.output, correlation_id).await;
        Ok(AnalyticsAnswer {
            answer,
            data: completed.output,
            request: completed.plan,
            attempts: completed.attempts,
        })
    }

    async fn narrate(&self, query: &str, data: &ReportData, correlation_id: &str) -> String {
        if data.is_empty() {
            return empty_report_message(query);
        }

        let shown = &data.rows[..data.rows.len().min(self.config.narration_row_limit)];
        let summary = json!({ "headers": data.headers, "rows": shown, "row_count": data.row_count });
        let prompt = format!(
            "You are a data analyst.\n\
             User Query: \"{query}\"\n\
             GA4 Data (first {} rows of {} total): {}\n\n\
             Provide a clear, concise natural language answer to the user's query based on the data.\n\
             Highlight key trends or insights if applicable.\n\
             If comparing time periods, calculate and explain percentage changes.",
            shown.len(),
            data.row_count,
            serde_json::to_string_pretty(&summary).unwrap_or_default(),
        );

        match self.llm.complete(&prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(
                    event_name = "analytics.narration_failed",
                    correlation_id,
                    error = %error,
                    "narration failed; returning summary"
                );
                format!(
                    "The report returned {} rows ({}).",
                    data.row_count,
                    data.headers.join(", ")
                )
            }
        }
    }
}

struct ReportSteps<'a> {
    llm: &'a dyn LlmClient,
    backend: &'a dyn AnalyticsBackend,
    query: &'a str,
    property_id: &'a str,
}

#[async_trait]
impl AttemptSteps for ReportSteps<'_> {
    type Plan = ReportRequest;
    type Output = ReportData;

    async fn generate(&self, previous_error: Option<&str>) -> Result<String, StepError> {
        Ok(self.llm.complete(&report_prompt(self.query, previous_error)).await?)
    }

    fn validate(&self, raw: &str) -> Result<ReportRequest, StepError> {
        let request = ReportRequest::from_model_json(strip_code_fence(raw))
            .map_err(|error| StepError::Invalid(error.to_string()))?;
        request.validate().map_err(|error| StepError::Invalid(error.to_string()))?;
        Ok(request)
    }

    async fn execute(&self, request: &ReportRequest) -> Result<ReportData, StepError> {
        Ok(self.backend.run_report(self.property_id, request).await?)
    }
}

fn report_prompt(query: &str, previous_error: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an expert Google Analytics 4 (GA4) Data API developer.\n\
         Convert the following natural language query into a JSON object representing a GA4 report request.\n\n\
         Query: \"{query}\"\n\n\
         DATE FORMAT RULES:\n\
         - Use YYYY-MM-DD format (e.g., \"2024-12-18\")\n\
         - OR use relative dates: \"today\", \"yesterday\", \"NdaysAgo\" (e.g., \"7daysAgo\", \"30daysAgo\")\n\
         - For \"last X days\", use: start_date: \"XdaysAgo\", end_date: \"today\"\n\n\
         VALID METRICS (use exact names): {}\n\
         VALID DIMENSIONS (use exact names): {}\n\n\
         The JSON object must have this shape:\n\
         {{\"date_ranges\": [{{\"start_date\": \"...\", \"end_date\": \"...\"}}], \
         \"dimensions\": [{{\"name\": \"...\"}}], \"metrics\": [{{\"name\": \"...\"}}], \"limit\": 10}}\n\n\
         Respond ONLY with valid JSON. NO explanations.",
        ACCEPTED_METRICS.join(", "),
        ACCEPTED_DIMENSIONS.join(", "),
    );

    if let Some(error) = previous_error {
        prompt.push_str(&format!(
            "\n\nPREVIOUS ATTEMPT FAILED WITH ERROR: {error}\nFIX THE JSON PARAMETERS."
        ));
    }
    prompt
}

pub fn empty_report_message(query: &str) -> String {
    format!(
        "No traffic data is currently available for this analytics property.\n\n\
         Possible reasons:\n\
         1. New property: the property may be newly created with no historical data.\n\
         2. Processing delay: analytics data can take 24-48 hours to become queryable.\n\
         3. No real traffic: the property has not received visits in the requested period.\n\n\
         What you asked for: {query}\n\n\
         The report ran successfully against the analytics API but returned zero rows for the requested time period."
    )
}
