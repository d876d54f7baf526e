//! Structured analytics report requests.
//!
//! The model proposes a request as JSON; this module decodes it, normalizes every
//! date into a marker the analytics backend accepts, and validates the metric and
//! dimension names against the vocabulary the prompt advertises.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::table::Record;

pub const ACCEPTED_METRICS: &[&str] = &[
    "activeUsers",
    "newUsers",
    "totalUsers",
    "sessions",
    "screenPageViews",
    "eventCount",
    "averageSessionDuration",
    "bounceRate",
    "engagementRate",
];

pub const ACCEPTED_DIMENSIONS: &[&str] = &[
    "date",
    "pagePath",
    "pagePathPlusQueryString",
    "sessionDefaultChannelGroup",
    "deviceCategory",
    "country",
    "firstUserSource",
    "sessionSource",
];

pub const TODAY: &str = "today";
pub const YESTERDAY: &str = "yesterday";
pub const DEFAULT_START_DATE: &str = "7daysAgo";
pub const DEFAULT_ROW_LIMIT: u32 = 10;
pub const MAX_ROW_LIMIT: u32 = 10_000;
pub const MAX_DATE_RANGES: usize = 4;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReportRequestError {
    #[error("model output is not a valid report request: {0}")]
    Malformed(String),
    #[error("report request must name at least one metric")]
    NoMetrics,
    #[error("unsupported metric `{name}`; use one of: {accepted}")]
    UnsupportedMetric { name: String, accepted: String },
    #[error("unsupported dimension `{name}`; use one of: {accepted}")]
    UnsupportedDimension { name: String, accepted: String },
    #[error("report request has {count} date ranges; at most 4 are allowed")]
    TooManyDateRanges { count: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

impl DateRange {
    pub fn new(start_date: &str, end_date: &str) -> Self {
        Self { start_date: normalize_date(start_date), end_date: normalize_date(end_date) }
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self { start_date: DEFAULT_START_DATE.to_string(), end_date: TODAY.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub date_ranges: Vec<DateRange>,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub limit: u32,
}

impl ReportRequest {
    /// Decodes the model's JSON and normalizes it. Missing start dates become
    /// `7daysAgo`, missing end dates `today`, and an empty range list becomes a
    /// single trailing-week range.
    pub fn from_model_json(raw: &str) -> Result<Self, ReportRequestError> {
        let raw: RawReportRequest = serde_json::from_str(raw.trim())
            .map_err(|error| ReportRequestError::Malformed(error.to_string()))?;

        let mut date_ranges = raw
            .date_ranges
            .into_iter()
            .map(|range| {
                DateRange::new(
                    range.start_date.as_deref().unwrap_or(DEFAULT_START_DATE),
                    range.end_date.as_deref().unwrap_or(TODAY),
                )
            })
            .collect::<Vec<_>>();
        if date_ranges.is_empty() {
            date_ranges.push(DateRange::default());
        }

        Ok(Self {
            date_ranges,
            dimensions: raw.dimensions.into_iter().map(NamedField::into_name).collect(),
            metrics: raw.metrics.into_iter().map(NamedField::into_name).collect(),
            limit: parse_limit(raw.limit.as_ref()),
        })
    }

    pub fn validate(&self) -> Result<(), ReportRequestError> {
        if self.metrics.is_empty() {
            return Err(ReportRequestError::NoMetrics);
        }

        if self.date_ranges.len() > MAX_DATE_RANGES {
            return Err(ReportRequestError::TooManyDateRanges { count: self.date_ranges.len() });
        }

        if let Some(name) = self.metrics.iter().find(|name| !ACCEPTED_METRICS.contains(&name.as_str())) {
            return Err(ReportRequestError::UnsupportedMetric {
                name: name.clone(),
                accepted: ACCEPTED_METRICS.join(", "),
            });
        }

        if let Some(name) =
            self.dimensions.iter().find(|name| !ACCEPTED_DIMENSIONS.contains(&name.as_str()))
        {
            return Err(ReportRequestError::UnsupportedDimension {
                name: name.clone(),
                accepted: ACCEPTED_DIMENSIONS.join(", "),
            });
        }

        Ok(())
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.iter().any(|dimension| dimension == name)
    }
}

/// Result of running a report: header names, one record per row, and the total
/// row count reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
    pub row_count: u64,
}

impl ReportData {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Accepts `today`, `yesterday`, `<N>daysAgo` or an ISO `YYYY-MM-DD` date and
/// maps anything else to `today`.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();

    if trimmed == TODAY || trimmed == YESTERDAY || is_days_ago_marker(trimmed) {
        return trimmed.to_string();
    }

    if trimmed.len() == 10 && NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok() {
        return trimmed.to_string();
    }

    TODAY.to_string()
}

fn is_days_ago_marker(value: &str) -> bool {
    value
        .strip_suffix("daysAgo")
        .map(|days| !days.is_empty() && days.chars().all(|ch| ch.is_ascii_digit()))
        .unwrap_or(false)
}

fn parse_limit(raw: Option<&Value>) -> u32 {
    let requested = match raw {
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        _ => None,
    };

    match requested {
        Some(0) | None => DEFAULT_ROW_LIMIT,
        Some(value) => value.min(u64::from(MAX_ROW_LIMIT)) as u32,
    }
}

#[derive(Debug, Deserialize)]
struct RawReportRequest {
    #[serde(default, alias = "dateRanges")]
    date_ranges: Vec<RawDateRange>,
    #[serde(default)]
    dimensions: Vec<NamedField>,
    #[serde(default)]
    metrics: Vec<NamedField>,
    #[serde(default)]
    limit: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawDateRange {
    #[serde(default, alias = "startDate")]
    start_date: Option<String>,
    #[serde(default, alias = "endDate")]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamedField {
    Bare(String),
    Named { name: String },
}

impl NamedField {
    fn into_name(self) -> String {
        match self {
            Self::Bare(name) | Self::Named { name } => name.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_date, DateRange, ReportRequest, ReportRequestError, DEFAULT_ROW_LIMIT};

    #[test]
    fn date_normalization_keeps_accepted_markers() {
        assert_eq!(normalize_date("2024-12-18"), "2024-12-18");
        assert_eq!(normalize_date("7daysAgo"), "7daysAgo");
        assert_eq!(normalize_date("30daysAgo"), "30daysAgo");
        assert_eq!(normalize_date("yesterday"), "yesterday");
        assert_eq!(normalize_date("today"), "today");
    }

    #[test]
    fn date_normalization_defaults_to_today() {
        assert_eq!(normalize_date("garbage"), "today");
        assert_eq!(normalize_date(""), "today");
        assert_eq!(normalize_date("2024-13-45"), "today");
        assert_eq!(normalize_date("daysAgo"), "today");
        assert_eq!(normalize_date("last week"), "today");
    }

    #[test]
    fn model_json_is_decoded_and_normalized() {
        let request = ReportRequest::from_model_json(
            r#"{
                "date_ranges": [{"start_date": "14daysAgo", "end_date": "sometime"}],
                "dimensions": [{"name": "pagePath"}],
                "metrics": [{"name": "screenPageViews"}, "sessions"],
                "limit": 5
            }"#,
        )
        .expect("request should decode");

        assert_eq!(request.date_ranges, vec![DateRange::new("14daysAgo", "today")]);
        assert_eq!(request.dimensions, vec!["pagePath".to_string()]);
        assert_eq!(request.metrics, vec!["screenPageViews".to_string(), "sessions".to_string()]);
        assert_eq!(request.limit, 5);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn missing_dates_and_limit_take_defaults() {
        let request = ReportRequest::from_model_json(r#"{"metrics": ["activeUsers"]}"#)
            .expect("request should decode");

        assert_eq!(request.date_ranges, vec![DateRange::default()]);
        assert_eq!(request.date_ranges[0].start_date, "7daysAgo");
        assert_eq!(request.limit, DEFAULT_ROW_LIMIT);

        let partial = ReportRequest::from_model_json(
            r#"{"date_ranges": [{"end_date": "yesterday"}], "metrics": ["sessions"], "limit": "0"}"#,
        )
        .expect("request should decode");
        assert_eq!(partial.date_ranges[0].start_date, "7daysAgo");
        assert_eq!(partial.date_ranges[0].end_date, "yesterday");
        assert_eq!(partial.limit, DEFAULT_ROW_LIMIT);
    }

    #[test]
    fn malformed_json_is_reported() {
        let error = ReportRequest::from_model_json("not json").expect_err("should fail");
        assert!(matches!(error, ReportRequestError::Malformed(_)));
    }

    #[test]
    fn validation_rejects_unknown_vocabulary() {
        let request =
            ReportRequest::from_model_json(r#"{"metrics": ["pageviews"], "dimensions": ["date"]}"#)
                .expect("request should decode");

        let error = request.validate().expect_err("unknown metric should fail");
        assert!(error.to_string().contains("unsupported metric `pageviews`"));
        assert!(error.to_string().contains("screenPageViews"));

        let request =
            ReportRequest::from_model_json(r#"{"metrics": ["sessions"], "dimensions": ["city"]}"#)
                .expect("request should decode");
        assert!(matches!(
            request.validate(),
            Err(ReportRequestError::UnsupportedDimension { ref name, .. }) if name == "city"
        ));
    }

    #[test]
    fn validation_requires_a_metric() {
        let request = ReportRequest::from_model_json(r#"{"dimensions": ["country"]}"#)
            .expect("request should decode");
        assert_eq!(request.validate(), Err(ReportRequestError::NoMetrics));
    }
}
