use sitelens_core::intent::{
    generation_failure_fallback, reconcile_with_source, unrecognized_label_fallback,
};
use sitelens_core::Intent;
use tracing::{info, warn};

use crate::llm::{strip_code_fence, LlmClient};

/// Routes a query to one of the three intents. Classification never fails: a
/// failed or unusable generation falls back to keyword matching.
pub struct RequestClassifier<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> RequestClassifier<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, query: &str, has_source: bool, correlation_id: &str) -> Intent {
        let prompt = classification_prompt(query, has_source);

        let intent = match self.llm.complete(&prompt).await {
            Ok(label) => match Intent::parse_label(strip_code_fence(&label)) {
                Some(intent) => reconcile_with_source(intent, query, has_source),
                None => {
                    warn!(
                        event_name = "classifier.unrecognized_label",
                        correlation_id,
                        label = %label,
                        "classifier returned an unknown label; using keyword fallback"
                    );
                    unrecognized_label_fallback(query, has_source)
                }
            },
            Err(error) => {
                warn!(
                    event_name = "classifier.generation_failed",
                    correlation_id,
                    error = %error,
                    "intent generation failed; using keyword fallback"
                );
                generation_failure_fallback(query, has_source)
            }
        };

        info!(
            event_name = "query.classified",
            correlation_id,
            intent = %intent,
            has_source,
            "query classified"
        );
        intent
    }
}

fn classification_prompt(query: &str, has_source: bool) -> String {
    let categories = Intent::ALL
        .iter()
        .map(|intent| format!("- \"{}\": {}", intent.as_str(), intent.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an intent classifier for an analytics and SEO system.\n\n\
         Classify the following query into ONE of these categories:\n\
         {categories}\n\n\
         Query: \"{query}\"\n\
         Property ID provided: {has_source}\n\n\
         Respond with ONLY one word: analytics, seo, or fusion"
    )
}
