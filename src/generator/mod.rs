#[cfg(test)]
mod tests;

pub mod llm;

use std::sync::Arc;

use anyhow::Context;
use itertools::Itertools;
use tracing::{debug, info};

use crate::Result;
use crate::database::{Database, FeedbackQueries, NewFeedback, PromptQueries, QueryCacheQueries};
use crate::database::models::{FeedbackRecord, PromptTemplate};
use crate::retriever::{HybridRetriever, RetrievedDocument};

pub use llm::{ChatModel, OllamaChatClient};

/// Minimum similarity for a stored prompt or feedback record to be
/// considered relevant to a feature query.
pub const SIMILARITY_THRESHOLD: f64 = 0.2;
const RELEVANT_FEEDBACK_LIMIT: usize = 3;
const RETRIEVAL_K: usize = 5;

const TABLE_HEADER: &str =
    "| Description | Pre-conditions | Action No. | Action | Expected Result |\n\
     |-------------|----------------|------------|--------|-----------------|\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub feature_description: String,
    pub product_title: String,
    pub reference_product: Option<String>,
    pub user_feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTestCase {
    pub feature: String,
    pub test_case: String,
    pub sources: Vec<String>,
}

/// Similarity ratio between two strings, case-insensitive.
#[inline]
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Rank stored feedback by feature similarity; keep records scoring at or
/// above the threshold, ordered by score then recency, capped at `limit`.
#[inline]
pub fn select_relevant_feedback(
    records: Vec<FeedbackRecord>,
    query: &str,
    limit: usize,
) -> Vec<(FeedbackRecord, f64)> {
    let mut scored: Vec<(FeedbackRecord, f64)> = records
        .into_iter()
        .map(|record| {
            let score = similarity(query, &record.feature);
            (record, score)
        })
        .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.created_date.cmp(&a.0.created_date))
    });
    scored.truncate(limit);
    scored
}

/// Pick the stored prompt template whose feature is most similar to the
/// query, if any clears the threshold.
#[inline]
pub fn select_prompt_template(
    templates: Vec<PromptTemplate>,
    query: &str,
) -> Option<PromptTemplate> {
    templates
        .into_iter()
        .map(|template| {
            let score = similarity(query, &template.feature);
            (template, score)
        })
        .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(template, _)| template)
}

/// Built-in prompts used when no stored template matches the feature.
#[inline]
pub fn default_prompts(feature: &str) -> (String, String) {
    let system_prompt = format!(
        "You are a test case generation assistant for industrial control systems.\n\
         \n\
         FEATURE DESCRIPTION:\n{feature}\n\
         \n\
         Rules:\n\
         - Use only values, addresses and parameters present in the provided context.\n\
         - Include 8-10 preconditions and 10-18 sequenced step actions.\n\
         - Each action has exactly one measurable expected result.\n\
         - Cover normal operation, error conditions and boundary values.\n\
         - Never invent credentials, capacities or protocol details.\n\
         \n\
         USER FEEDBACK TO INCORPORATE (mandatory):\n{{feedback_instructions}}\n\
         \n\
         Output a single markdown table with columns:\n\
         | Description | Pre-conditions | Action No. | Action | Expected Result |"
    );

    let human_prompt = "Generate a comprehensive test case for: {feature_description}\n\
         \n\
         TECHNICAL CONTEXT:\n{full_context}\n\
         \n\
         USER FEEDBACK TO INCORPORATE (mandatory):\n{feedback_instructions}\n\
         \n\
         Output strictly in the 5-column table format."
        .to_string();

    (system_prompt, human_prompt)
}

/// Render the mandatory-feedback block for prompt injection.
#[inline]
pub fn feedback_instructions(feedback: &[(FeedbackRecord, f64)]) -> String {
    if feedback.is_empty() {
        return "No relevant feedback available.".to_string();
    }

    let items: Vec<String> = feedback
        .iter()
        .map(|(record, _)| format!("- {}", record.feedback))
        .collect();
    format!("Relevant feedback to incorporate:\n{}", items.join("\n"))
}

/// Feedback-driven retrieval: when relevant feedback exists, the most
/// relevant feedback text becomes the retrieval query; feedback names what
/// is missing more precisely than the original feature description.
#[inline]
pub fn retrieval_query(feature: &str, feedback: &[(FeedbackRecord, f64)]) -> String {
    feedback
        .first()
        .map(|(record, _)| record.feedback.clone())
        .unwrap_or_else(|| feature.to_string())
}

/// Assemble retrieved documents into prompt context with provenance banners.
#[inline]
pub fn build_context(documents: &[RetrievedDocument]) -> String {
    if documents.is_empty() {
        return "No documentation available".to_string();
    }

    documents
        .iter()
        .map(|doc| {
            format!(
                "=== {} (Page {}) ===\n{}\n",
                doc.document.metadata.title, doc.document.metadata.page_no, doc.document.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ensure the model output is a proper 5-column markdown table, prepending
/// the header when the model omitted it.
#[inline]
pub fn format_as_table(content: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        return content.to_string();
    }

    if content.contains("| Description |") && content.contains("| Action |") {
        return content.to_string();
    }

    if !content.starts_with("| Description |") {
        return format!("{}{}", TABLE_HEADER, content);
    }

    content.to_string()
}

/// Sorted, deduplicated source attributions for the retrieved documents.
#[inline]
pub fn source_attributions(documents: &[RetrievedDocument]) -> Vec<String> {
    documents
        .iter()
        .map(|doc| {
            format!(
                "{} (Page {})",
                doc.document.metadata.title, doc.document.metadata.page_no
            )
        })
        .sorted()
        .dedup()
        .collect()
}

/// Orchestrates test case generation: retrieval, prompt selection, feedback
/// injection, the LLM call, output validation and caching.
pub struct TestCaseGenerator {
    database: Database,
    model: Arc<dyn ChatModel>,
}

impl TestCaseGenerator {
    #[inline]
    pub fn new(database: Database, model: Arc<dyn ChatModel>) -> Self {
        Self { database, model }
    }

    #[inline]
    pub async fn generate(
        &self,
        retriever: &HybridRetriever,
        request: &GenerateRequest,
    ) -> Result<GeneratedTestCase> {
        let feature = request.feature_description.trim();
        info!(
            "Generating test case for '{}' ({})",
            feature, request.product_title
        );

        if let Some(user_feedback) = &request.user_feedback {
            FeedbackQueries::insert(
                self.database.pool(),
                &NewFeedback {
                    product_title: request.product_title.clone(),
                    feature: feature.to_string(),
                    feedback: user_feedback.clone(),
                    previous_test_case: None,
                },
            )
            .await?;
        }

        let all_feedback =
            FeedbackQueries::list_for_product(self.database.pool(), &request.product_title).await?;
        let relevant_feedback =
            select_relevant_feedback(all_feedback, feature, RELEVANT_FEEDBACK_LIMIT);
        debug!("{} relevant feedback records", relevant_feedback.len());

        let templates =
            PromptQueries::list_for_title(self.database.pool(), &request.product_title).await?;
        let (system_prompt, human_prompt) = match select_prompt_template(templates, feature) {
            Some(template) => (template.system_prompt, template.human_prompt),
            None => default_prompts(feature),
        };

        let query = retrieval_query(feature, &relevant_feedback);
        let documents = retriever.retrieve(&query, RETRIEVAL_K)?;

        let instructions = feedback_instructions(&relevant_feedback);
        let context = build_context(&documents);

        let system_prompt = system_prompt.replace("{feedback_instructions}", &instructions);
        let user_prompt = human_prompt
            .replace("{feature_description}", feature)
            .replace("{full_context}", &context)
            .replace("{feedback_instructions}", &instructions);

        let model = Arc::clone(&self.model);
        let raw = tokio::task::spawn_blocking(move || model.complete(&system_prompt, &user_prompt))
            .await
            .context("Chat completion task panicked")??;

        let test_case = format_as_table(&raw);

        QueryCacheQueries::upsert(self.database.pool(), feature, &test_case).await?;

        let sources = if documents.is_empty() {
            vec!["No reference documentation".to_string()]
        } else {
            source_attributions(&documents)
        };

        Ok(GeneratedTestCase {
            feature: feature.to_string(),
            test_case,
            sources,
        })
    }
}
