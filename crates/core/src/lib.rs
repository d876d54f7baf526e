//! Sitelens core - deterministic domain for the analytics/SEO query front end.
//!
//! Everything in this crate is free of network access and model calls:
//! - `config` - layered application configuration
//! - `intent` - query categories and the keyword vocabularies behind the fallback
//! - `report` - structured analytics report requests and date normalization
//! - `table` - the in-memory SEO table decoded from a CSV export
//! - `filter` - the whitelisted filter program language and its interpreter
//! - `fusion` - page-path normalization and the analytics/SEO join
//! - `response` - response bundles and the raw-output formatter
//!
//! # Safety Principle
//!
//! The LLM proposes structured requests and filter programs. It never runs code:
//! every program is validated against the real schema and interpreted here.

pub mod config;
pub mod errors;
pub mod filter;
pub mod fusion;
pub mod intent;
pub mod report;
pub mod response;
pub mod table;

pub use errors::{InterfaceError, QueryError};
pub use filter::{FilterError, FilterOutput, FilterProgram};
pub use fusion::{fuse, normalize_page_path, FusedData, FusedRecord};
pub use intent::Intent;
pub use report::{DateRange, ReportData, ReportRequest, ReportRequestError};
pub use response::{format_output, wants_raw_output, AnswerBundle, ErrorBundle, QueryResponse};
pub use table::{Record, Table, TableError};
