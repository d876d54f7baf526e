//! Sitelens agents - everything that talks to the language model or to an
//! external data source.
//!
//! - `llm` - text-generation capability, HTTP client and rate-limit backoff
//! - `classifier` - routes a query to analytics, seo or fusion
//! - `attempt` - the self-correcting generate/validate/execute loop
//! - `analytics` - report requests against the analytics backend
//! - `seo` - filter programs over the crawl export
//! - `fusion` - decomposition, both agents, and the page-path join
//! - `runtime` - `AgentRuntime`, the per-query front door
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It proposes report requests and filter
//! programs; validation, filtering, joining and formatting happen in
//! `sitelens-core`.

pub mod analytics;
pub mod attempt;
pub mod classifier;
pub mod fusion;
pub mod llm;
pub mod runtime;
pub mod seo;

pub use analytics::{AnalyticsAgent, AnalyticsBackend, AnalyticsError, DemoDataBackend, Ga4DataApiBackend};
pub use classifier::RequestClassifier;
pub use fusion::{FusionOrchestrator, FusionPlan};
pub use llm::{LlmClient, LlmError, OpenAiCompatibleClient, RateLimitRetry};
pub use runtime::{AgentRuntime, RuntimeSetupError};
pub use seo::{CsvSheetSource, DatasetError, DatasetSource, SeoAgent};
