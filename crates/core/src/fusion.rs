//! Page-path join between analytics rows and SEO crawl rows.
//!
//! The two sources share no referential integrity; a row joins only when both
//! sides normalize to the same key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::table::Record;

/// Column of the crawl export holding the page URL.
pub const SEO_ADDRESS_FIELD: &str = "Address";

/// Analytics dimensions that carry a page path, in lookup preference order.
pub const PAGE_PATH_DIMENSIONS: &[&str] = &["pagePath", "pagePathPlusQueryString"];

/// Normalized join key for a page reference: the path of an absolute http(s)
/// URL or a bare path, without query string or fragment, percent-decoded,
/// lower-cased, with a leading slash and no trailing slash (except the root).
pub fn normalize_page_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let path = match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_string(),
        _ => trimmed.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    // `Url::path` percent-encodes while bare paths arrive as-is; decode both.
    let path = match urlencoding::decode(&path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => path,
    };

    let mut path = path.to_lowercase();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    Some(path)
}

/// One analytics record paired with its SEO counterpart. `seo` is an empty map
/// when no crawl row shares the page path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedRecord {
    pub analytics: Record,
    pub seo: Record,
}

impl FusedRecord {
    pub fn is_matched(&self) -> bool {
        !self.seo.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedData {
    pub fused_data: Vec<FusedRecord>,
    pub analytics_count: usize,
    pub seo_count: usize,
    pub matched_count: usize,
    pub seo_data: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_error: Option<String>,
}

impl FusedData {
    /// The first `limit` fused records, for bounded narration prompts.
    pub fn narration_view(&self, limit: usize) -> &[FusedRecord] {
        &self.fused_data[..self.fused_data.len().min(limit)]
    }
}

/// Left join of analytics rows onto SEO rows by normalized page path. When
/// several SEO rows share a key the last one wins.
pub fn fuse(analytics_rows: &[Record], seo_rows: &[Record]) -> FusedData {
    let mut seo_by_path = HashMap::new();
    for row in seo_rows {
        if let Some(key) = row.get(SEO_ADDRESS_FIELD).and_then(text_value).and_then(normalize_page_path)
        {
            seo_by_path.insert(key, row);
        }
    }

    let fused_data = analytics_rows
        .iter()
        .map(|analytics| {
            let seo = analytics_page_path(analytics)
                .and_then(|key| seo_by_path.get(&key))
                .map(|row| (*row).clone())
                .unwrap_or_default();
            FusedRecord { analytics: analytics.clone(), seo }
        })
        .collect::<Vec<_>>();

    let matched_count = fused_data.iter().filter(|record| record.is_matched()).count();

    FusedData {
        analytics_count: analytics_rows.len(),
        seo_count: seo_rows.len(),
        matched_count,
        fused_data,
        seo_data: seo_rows.to_vec(),
        analytics_error: None,
        seo_error: None,
    }
}

fn analytics_page_path(record: &Record) -> Option<String> {
    PAGE_PATH_DIMENSIONS
        .iter()
        .find_map(|dimension| record.get(*dimension).and_then(text_value))
        .and_then(normalize_page_path)
}

fn text_value(value: &Value) -> Option<&str> {
    value.as_str().filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{fuse, normalize_page_path};
    use crate::table::Record;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture must be an object, got {other}"),
        }
    }

    #[test]
    fn absolute_urls_and_bare_paths_share_a_key() {
        assert_eq!(normalize_page_path("http://example.com/about"), normalize_page_path("/about"));
        assert_eq!(normalize_page_path("https://example.com/About/"), Some("/about".to_string()));
        assert_eq!(normalize_page_path("/blog?utm=1#top"), Some("/blog".to_string()));
        assert_eq!(normalize_page_path("https://example.com"), Some("/".to_string()));
        assert_eq!(normalize_page_path("pricing"), Some("/pricing".to_string()));
        assert_eq!(normalize_page_path("   "), None);
    }

    #[test]
    fn encoded_and_raw_paths_share_a_key() {
        assert_eq!(normalize_page_path("https://example.com/a b"), Some("/a b".to_string()));
        assert_eq!(normalize_page_path("https://example.com/a b"), normalize_page_path("/a b"));
        assert_eq!(normalize_page_path("https://example.com/café"), normalize_page_path("/café"));
        assert_eq!(normalize_page_path("https://example.com/caf%C3%A9/"), normalize_page_path("/café"));
        assert_eq!(normalize_page_path("/a%20b?utm=1"), normalize_page_path("http://example.com/a b"));
    }

    #[test]
    fn encoded_crawl_addresses_join_raw_analytics_paths() {
        let analytics = vec![record(json!({"pagePath": "/café/menu", "screenPageViews": 40}))];
        let seo = vec![record(json!({"Address": "https://example.com/caf%C3%A9/menu", "Title 1": "Menu"}))];

        let fused = fuse(&analytics, &seo);

        assert_eq!(fused.matched_count, 1);
        assert_eq!(fused.fused_data[0].seo["Title 1"], json!("Menu"));
    }

    #[test]
    fn matched_count_equals_analytics_rows_found_in_crawl() {
        let analytics = vec![
            record(json!({"pagePath": "/about", "screenPageViews": 120})),
            record(json!({"pagePath": "/blog/", "screenPageViews": 90})),
            record(json!({"pagePath": "/missing", "screenPageViews": 5})),
            record(json!({"pagePathPlusQueryString": "/?ref=mail", "screenPageViews": 300})),
        ];
        let seo = vec![
            record(json!({"Address": "http://example.com/about", "Title 1": "About"})),
            record(json!({"Address": "https://example.com/blog", "Title 1": "Blog"})),
            record(json!({"Address": "https://example.com/", "Title 1": "Home"})),
            record(json!({"Address": "https://example.com/contact", "Title 1": "Contact"})),
        ];

        let fused = fuse(&analytics, &seo);

        assert_eq!(fused.analytics_count, 4);
        assert_eq!(fused.seo_count, 4);
        assert_eq!(fused.matched_count, 3);
        assert_eq!(fused.fused_data[0].seo["Title 1"], json!("About"));
        assert!(fused.fused_data[2].seo.is_empty());
        assert_eq!(fused.fused_data[3].seo["Title 1"], json!("Home"));
        assert_eq!(fused.seo_data, seo);
    }

    #[test]
    fn duplicate_crawl_rows_keep_the_last() {
        let analytics = vec![record(json!({"pagePath": "/about"}))];
        let seo = vec![
            record(json!({"Address": "http://example.com/about", "Title 1": "Old"})),
            record(json!({"Address": "https://example.com/about/", "Title 1": "New"})),
        ];

        let fused = fuse(&analytics, &seo);
        assert_eq!(fused.fused_data[0].seo["Title 1"], json!("New"));
    }

    #[test]
    fn empty_analytics_side_matches_nothing_and_keeps_seo_rows() {
        let seo = vec![record(json!({"Address": "https://example.com/", "Title 1": "Home"}))];

        let fused = fuse(&[], &seo);
        assert_eq!(fused.analytics_count, 0);
        assert_eq!(fused.matched_count, 0);
        assert_eq!(fused.seo_data.len(), 1);
    }

    #[test]
    fn narration_view_is_capped() {
        let analytics = (0..15)
            .map(|index| record(json!({"pagePath": format!("/p{index}")})))
            .collect::<Vec<_>>();

        let fused = fuse(&analytics, &[]);
        assert_eq!(fused.narration_view(10).len(), 10);
        assert_eq!(fused.narration_view(50).len(), 15);
    }
}
