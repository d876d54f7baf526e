//! SEO agent: natural language to a whitelisted filter program over the crawl
//! export, which is fetched fresh for every query.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sitelens_core::config::{AgentConfig, DatasetConfig};
use sitelens_core::{FilterProgram, QueryError, QueryResponse, Table, TableError};
use thiserror::Error;
use tracing::{info, warn};

use crate::attempt::{run_attempts, AttemptSteps, StepError};
use crate::llm::{strip_code_fence, LlmClient};

pub const NO_MATCH_MESSAGE: &str = "No data matched the query criteria.";

const SAMPLE_ROWS: usize = 2;

const EXAMPLE_PROGRAMS: &[&str] = &[
    r#"{"where": {"column": "Address", "op": "contains", "value": "https"}, "select": ["Address"]}"#,
    r#"{"where": {"column": "Title 1", "op": "length_gt", "value": 60}, "select": ["Address", "Title 1"]}"#,
    r#"{"group_by_count": "Indexability"}"#,
    r#"{"where": {"any": [{"column": "Meta Description 1", "op": "is_empty"}, {"column": "Title 1", "op": "is_empty"}]}, "sort": {"column": "Address"}, "limit": 20}"#,
];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset source is not configured; set dataset.csv_url")]
    NotConfigured,
    #[error("dataset fetch returned {0}")]
    Status(reqwest::StatusCode),
    #[error("dataset fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Decode(#[from] TableError),
}

/// A tabular dataset re-read on every call.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn fetch(&self) -> Result<Table, DatasetError>;

    /// Human-readable location, for health output.
    fn describe(&self) -> String;
}

/// CSV export of a spreadsheet fetched over HTTP(S).
pub struct CsvSheetSource {
    client: Client,
    csv_url: Option<String>,
}

impl CsvSheetSource {
    pub fn from_config(config: &DatasetConfig) -> Result<Self, DatasetError> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, csv_url: config.csv_url.clone() })
    }
}

#[async_trait]
impl DatasetSource for CsvSheetSource {
    async fn fetch(&self) -> Result<Table, DatasetError> {
        let url = self.csv_url.as_deref().ok_or(DatasetError::NotConfigured)?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DatasetError::Status(response.status()));
        }
        let body = response.bytes().await?;
        let table = Table::from_csv_reader(body.as_ref())?;

        info!(
            event_name = "seo.dataset_loaded",
            rows = table.len(),
            columns = table.columns().len(),
            "loaded crawl export"
        );
        Ok(table)
    }

    fn describe(&self) -> String {
        self.csv_url.clone().unwrap_or_else(|| "not configured".to_string())
    }
}

/// A narrated SEO result.
#[derive(Clone, Debug)]
pub struct SeoAnswer {
    pub answer: String,
    pub table: Table,
    pub program: FilterProgram,
    pub attempts: u32,
}

impl SeoAnswer {
    pub fn into_response(self) -> QueryResponse {
        let data = Value::Array(self.table.records().into_iter().map(Value::Object).collect());
        let thought_process = json!({ "steps": self.attempts, "final_program": self.program });
        QueryResponse::answer(self.answer, data, Some(thought_process))
    }
}

pub struct SeoAgent<'a> {
    llm: &'a dyn LlmClient,
    dataset: &'a dyn DatasetSource,
    config: &'a AgentConfig,
}

impl<'a> SeoAgent<'a> {
    pub fn new(llm: &'a dyn LlmClient, dataset: &'a dyn DatasetSource, config: &'a AgentConfig) -> Self {
        Self { llm, dataset, config }
    }

    pub async fn process_query(&self, query: &str, correlation_id: &str) -> Result<SeoAnswer, QueryError> {
        let table = match self.dataset.fetch().await {
            Ok(table) if !table.is_empty() => table,
            Ok(_) => {
                warn!(event_name = "seo.dataset_empty", correlation_id, "crawl export has no rows");
                return Err(QueryError::DataUnavailable);
            }
            Err(error) => {
                warn!(
                    event_name = "seo.dataset_unavailable",
                    correlation_id,
                    error = %error,
                    "crawl export could not be loaded"
                );
                return Err(QueryError::DataUnavailable);
            }
        };

        let steps = FilterSteps { llm: self.llm, table: &table, query, correlation_id };
        let completed =
            run_attempts(&steps, self.config.max_attempts, "seo", correlation_id).await.into_result()?;

        let answer = self.narrate(query, &completed.output, correlation_id).await;
        Ok(SeoAnswer {
            answer,
            table: completed.output,
            program: completed.plan,
            attempts: completed.attempts,
        })
    }

    async fn narrate(&self, query: &str, table: &Table, correlation_id: &str) -> String {
        if table.is_empty() {
            return NO_MATCH_MESSAGE.to_string();
        }

        let shown = table.head(self.config.narration_row_limit);
        let prompt = format!(
            "You are an SEO expert.\n\
             User Query: \"{query}\"\n\
             Result Data (first {} rows of {} total): {}\n\n\
             Provide a clear, concise natural language answer to the user's query based on the data.\n\
             If there are more results than shown, mention the total count.\n\
             Highlight important SEO issues or insights.",
            shown.len(),
            table.len(),
            serde_json::to_string_pretty(&shown).unwrap_or_default(),
        );

        match self.llm.complete(&prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(
                    event_name = "seo.narration_failed",
                    correlation_id,
                    error = %error,
                    "narration failed; returning summary"
                );
                format!("{} rows matched the query.", table.len())
            }
        }
    }
}

struct FilterSteps<'a> {
    llm: &'a dyn LlmClient,
    table: &'a Table,
    query: &'a str,
    correlation_id: &'a str,
}

#[async_trait]
impl AttemptSteps for FilterSteps<'_> {
    type Plan = FilterProgram;
    type Output = Table;

    async fn generate(&self, previous_error: Option<&str>) -> Result<String, StepError> {
        Ok(self.llm.complete(&filter_prompt(self.query, self.table, previous_error)).await?)
    }

    fn validate(&self, raw: &str) -> Result<FilterProgram, StepError> {
        let program = FilterProgram::from_model_json(strip_code_fence(raw))
            .map_err(|error| StepError::Invalid(error.to_string()))?;
        program.validate(self.table).map_err(|error| StepError::Invalid(error.to_string()))?;
        Ok(program)
    }

    async fn execute(&self, program: &FilterProgram) -> Result<Table, StepError> {
        let output = program
            .evaluate(self.table)
            .map_err(|error| StepError::Execution(error.to_string()))?;

        let mut table = match output.into_table() {
            Some(table) => table,
            None => {
                warn!(
                    event_name = "seo.non_tabular_result",
                    correlation_id = self.correlation_id,
                    "filter program produced a scalar; treating it as an empty table"
                );
                Table::empty()
            }
        };
        table.fill_missing();
        Ok(table)
    }
}

fn filter_prompt(query: &str, table: &Table, previous_error: Option<&str>) -> String {
    let columns =
        table.columns().iter().map(|column| format!("'{column}'")).collect::<Vec<_>>().join(", ");
    let sample = serde_json::to_string_pretty(&table.head(SAMPLE_ROWS)).unwrap_or_default();

    let mut prompt = format!(
        "You are an SEO data expert.\n\
         User Query: \"{query}\"\n\n\
         Available Columns: {columns}\n\n\
         Sample Data (first {SAMPLE_ROWS} rows):\n{sample}\n\n\
         Write a JSON filter program that answers the query. The program is an object with these optional keys:\n\
         - \"where\": a predicate. Either {{\"column\", \"op\", \"value\", \"case_insensitive\"}} or \
         {{\"all\": [predicates]}}, {{\"any\": [predicates]}}, {{\"not\": predicate}}\n\
         - \"select\": list of columns to return\n\
         - \"group_by_count\": a column whose distinct values are counted\n\
         - \"sort\": {{\"column\": ..., \"descending\": true|false}}\n\
         - \"limit\": maximum number of rows\n\
         - \"aggregate\": \"count\" to return only the number of matching rows\n\n\
         Operators: eq, ne, contains, not_contains, starts_with, not_starts_with, ends_with, gt, gte, lt, lte, \
         is_empty, not_empty, length_gt, length_lt\n\n\
         IMPORTANT:\n\
         - Use EXACT column names from the list above\n\
         - Prefer returning the relevant columns with \"select\"\n\
         - gt/gte/lt/lte only work on numeric columns"
    );

    if let Some(error) = previous_error {
        prompt.push_str(&format!(
            "\n\nPREVIOUS ATTEMPT FAILED WITH ERROR: {error}\nFIX THE PROGRAM. Check column names carefully!"
        ));
    }

    prompt.push_str("\n\nExamples of correct programs:\n");
    for example in EXAMPLE_PROGRAMS {
        prompt.push_str("- ");
        prompt.push_str(example);
        prompt.push('\n');
    }
    prompt.push_str("\nRespond ONLY with the JSON program. NO explanations.");
    prompt
}
