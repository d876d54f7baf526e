use std::fmt;

use serde::{Deserialize, Serialize};

/// Traffic/session/user vocabulary.
pub const ANALYTICS_KEYWORDS: &[&str] = &["page views", "sessions", "users", "traffic", "ga4"];

/// Technical SEO vocabulary.
pub const SEO_KEYWORDS: &[&str] = &["title", "url", "https", "indexability", "meta"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Analytics,
    Seo,
    Fusion,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Analytics, Intent::Seo, Intent::Fusion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytics => "analytics",
            Self::Seo => "seo",
            Self::Fusion => "fusion",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Analytics => {
                "Queries about web traffic, users, sessions, page views, traffic sources, GA4 data"
            }
            Self::Seo => {
                "Queries about URLs, title tags, meta descriptions, indexability, HTTPS, technical SEO"
            }
            Self::Fusion => {
                "Queries that require BOTH analytics AND SEO data (e.g., \"top pages by views with their title tags\")"
            }
        }
    }

    /// Analytics and fusion queries cannot run without a source identifier.
    pub fn requires_source(&self) -> bool {
        matches!(self, Self::Analytics | Self::Fusion)
    }

    /// Matches a generated label after trimming and lower-casing. Surrounding
    /// quotes and a trailing period are tolerated.
    pub fn parse_label(raw: &str) -> Option<Self> {
        let label = raw.trim().trim_matches(|ch| matches!(ch, '"' | '\'' | '`' | '.')).trim();
        match label.to_ascii_lowercase().as_str() {
            "analytics" => Some(Self::Analytics),
            "seo" => Some(Self::Seo),
            "fusion" => Some(Self::Fusion),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn mentions_analytics(query: &str) -> bool {
    contains_any(query, ANALYTICS_KEYWORDS)
}

pub fn mentions_seo(query: &str) -> bool {
    contains_any(query, SEO_KEYWORDS)
}

/// Fallback for a generated label that is not one of the three categories.
pub fn unrecognized_label_fallback(query: &str, has_source: bool) -> Intent {
    keyword_intent(query, has_source).unwrap_or(if has_source { Intent::Analytics } else { Intent::Seo })
}

/// Fallback when the generation call itself failed. Never defaults to analytics.
pub fn generation_failure_fallback(query: &str, has_source: bool) -> Intent {
    keyword_intent(query, has_source).unwrap_or(Intent::Seo)
}

/// A source-less analytics or fusion route can only fail; when the query also
/// carries SEO vocabulary it is served by the SEO agent instead.
pub fn reconcile_with_source(intent: Intent, query: &str, has_source: bool) -> Intent {
    if !has_source && intent.requires_source() && mentions_seo(query) {
        Intent::Seo
    } else {
        intent
    }
}

fn keyword_intent(query: &str, has_source: bool) -> Option<Intent> {
    if !has_source && mentions_seo(query) {
        return Some(Intent::Seo);
    }
    if mentions_analytics(query) {
        return Some(Intent::Analytics);
    }
    if mentions_seo(query) {
        return Some(Intent::Seo);
    }
    None
}

fn contains_any(query: &str, keywords: &[&str]) -> bool {
    let lowered = query.to_lowercase();
    keywords.iter().any(|keyword| lowered.contains(keyword))
}
