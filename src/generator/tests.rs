use super::*;
use crate::database::Database;
use crate::index::{DocMetadata, ElementKind, IndexedDocument, VectorIndex};
use crate::retriever::RetrievalConfig;
use chrono::Utc;
use std::sync::Mutex;
use tempfile::TempDir;

fn feedback_record(feature: &str, feedback: &str, age_secs: i64) -> FeedbackRecord {
    FeedbackRecord {
        id: 0,
        product_title: "Relay X".to_string(),
        feature: feature.to_string(),
        feedback: feedback.to_string(),
        previous_test_case: None,
        created_date: Utc::now().naive_utc() - chrono::Duration::seconds(age_secs),
    }
}

fn retrieved(text: &str, page_no: i64) -> RetrievedDocument {
    RetrievedDocument {
        document: IndexedDocument {
            text: text.to_string(),
            metadata: DocMetadata {
                title: "Relay X".to_string(),
                doc_type: "product_spec".to_string(),
                page_no,
                element_kind: ElementKind::Text,
                feature: None,
                original_filename: "relay.pdf".to_string(),
            },
        },
        score: 1.0,
    }
}

#[test]
fn similarity_is_case_insensitive() {
    assert!((similarity("Voltage Unbalance", "voltage unbalance") - 1.0).abs() < 1e-9);
    assert!(similarity("voltage unbalance", "entirely different") < 0.5);
}

#[test]
fn relevant_feedback_filters_and_ranks() {
    let records = vec![
        feedback_record("voltage unbalance protection", "oldest exact match", 300),
        feedback_record("voltage unbalance protection", "newest exact match", 10),
        feedback_record("dhcp server discovery", "unrelated feature", 10),
    ];

    let relevant = select_relevant_feedback(records, "voltage unbalance protection", 3);
    assert_eq!(relevant.len(), 2);
    // Equal scores: newer first
    assert_eq!(relevant[0].0.feedback, "newest exact match");
    assert_eq!(relevant[1].0.feedback, "oldest exact match");
}

#[test]
fn relevant_feedback_respects_limit() {
    let records: Vec<_> = (0..6)
        .map(|i| feedback_record("voltage unbalance", &format!("feedback {}", i), i))
        .collect();

    let relevant = select_relevant_feedback(records, "voltage unbalance", 3);
    assert_eq!(relevant.len(), 3);
}

#[test]
fn prompt_template_selection() {
    let templates = vec![
        PromptTemplate {
            id: 1,
            title: "Relay X".to_string(),
            feature: "voltage unbalance protection".to_string(),
            system_prompt: "voltage system".to_string(),
            human_prompt: "voltage human".to_string(),
        },
        PromptTemplate {
            id: 2,
            title: "Relay X".to_string(),
            feature: "modbus communication".to_string(),
            system_prompt: "modbus system".to_string(),
            human_prompt: "modbus human".to_string(),
        },
    ];

    let selected = select_prompt_template(templates.clone(), "voltage unbalance")
        .expect("should select a template");
    assert_eq!(selected.id, 1);

    let none = select_prompt_template(templates, "zzzz qqqq xxxx yyyy wwww vvvv");
    assert!(none.is_none());
}

#[test]
fn feedback_instructions_rendering() {
    assert_eq!(
        feedback_instructions(&[]),
        "No relevant feedback available."
    );

    let feedback = vec![(feedback_record("f", "add the reset step", 0), 0.9)];
    let rendered = feedback_instructions(&feedback);
    assert!(rendered.starts_with("Relevant feedback to incorporate:"));
    assert!(rendered.contains("- add the reset step"));
}

#[test]
fn retrieval_query_prefers_feedback_text() {
    assert_eq!(retrieval_query("voltage unbalance", &[]), "voltage unbalance");

    let feedback = vec![(
        feedback_record("voltage unbalance", "missing the alarm threshold check", 0),
        0.9,
    )];
    assert_eq!(
        retrieval_query("voltage unbalance", &feedback),
        "missing the alarm threshold check"
    );
}

#[test]
fn context_includes_provenance_banners() {
    let docs = vec![
        retrieved("first chunk of documentation", 3),
        retrieved("second chunk of documentation", 7),
    ];
    let context = build_context(&docs);
    assert!(context.contains("=== Relay X (Page 3) ==="));
    assert!(context.contains("second chunk of documentation"));

    assert_eq!(build_context(&[]), "No documentation available");
}

#[test]
fn table_formatting() {
    // Already a complete table: untouched
    let complete = "| Description | Pre-conditions | Action No. | Action | Expected Result |\n| d | p | 1 | a | r |";
    assert_eq!(format_as_table(complete), complete);

    // Bare rows get the header prepended
    let bare = "| d | p | 1 | a | r |";
    let formatted = format_as_table(bare);
    assert!(formatted.starts_with("| Description | Pre-conditions |"));
    assert!(formatted.ends_with(bare));

    assert_eq!(format_as_table("   "), "");
}

#[test]
fn sources_are_sorted_and_unique() {
    let docs = vec![
        retrieved("text a", 9),
        retrieved("text b", 2),
        retrieved("text c", 9),
    ];
    assert_eq!(
        source_attributions(&docs),
        vec!["Relay X (Page 2)", "Relay X (Page 9)"]
    );
}

/// Chat model stub that records prompts and returns a canned bare table.
struct StubChatModel {
    prompts: Mutex<Vec<(String, String)>>,
}

impl ChatModel for StubChatModel {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        self.prompts
            .lock()
            .expect("prompt lock")
            .push((system_prompt.to_string(), user_prompt.to_string()));
        Ok("| verify trip | powered | 1 | apply unbalance | relay trips |".to_string())
    }
}

struct UnitEmbedder;

impl crate::embeddings::Embedder for UnitEmbedder {
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

fn test_retriever() -> HybridRetriever {
    let corpus = vec![
        retrieved("voltage unbalance trips the relay at the configured threshold", 1).document,
        retrieved("modbus register map for the device", 2).document,
    ];
    let mut index = VectorIndex::new();
    for doc in &corpus {
        index.insert(doc.clone(), vec![1.0, 0.0]);
    }
    HybridRetriever::new(
        corpus,
        index,
        std::sync::Arc::new(UnitEmbedder),
        RetrievalConfig::default(),
    )
}

#[tokio::test]
async fn generate_end_to_end() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("should create database");

    let model = std::sync::Arc::new(StubChatModel {
        prompts: Mutex::new(Vec::new()),
    });
    let generator = TestCaseGenerator::new(database.clone(), model.clone());
    let retriever = test_retriever();

    let request = GenerateRequest {
        feature_description: "voltage unbalance".to_string(),
        product_title: "Relay X".to_string(),
        reference_product: None,
        user_feedback: None,
    };

    let generated = generator
        .generate(&retriever, &request)
        .await
        .expect("generation should succeed");

    assert_eq!(generated.feature, "voltage unbalance");
    // Output was reformatted into a proper table
    assert!(generated.test_case.starts_with("| Description |"));
    assert!(!generated.sources.is_empty());

    // The prompt carried retrieved context
    let prompts = model.prompts.lock().expect("prompt lock");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].1.contains("voltage unbalance trips the relay"));

    // The result was cached under the feature query
    let cached = crate::database::QueryCacheQueries::get(database.pool(), "voltage unbalance")
        .await
        .expect("cache get should succeed")
        .expect("cache entry should exist");
    assert_eq!(cached.test_case, generated.test_case);
}

#[tokio::test]
async fn generate_stores_submitted_feedback_and_uses_it() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("should create database");

    let model = std::sync::Arc::new(StubChatModel {
        prompts: Mutex::new(Vec::new()),
    });
    let generator = TestCaseGenerator::new(database.clone(), model.clone());
    let retriever = test_retriever();

    let request = GenerateRequest {
        feature_description: "voltage unbalance".to_string(),
        product_title: "Relay X".to_string(),
        reference_product: None,
        user_feedback: Some("include the reset procedure".to_string()),
    };

    generator
        .generate(&retriever, &request)
        .await
        .expect("generation should succeed");

    // Feedback was persisted
    let stored = crate::database::FeedbackQueries::list_for_product(database.pool(), "Relay X")
        .await
        .expect("list should succeed");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].feedback, "include the reset procedure");

    // And injected into the prompt as a mandatory instruction
    let prompts = model.prompts.lock().expect("prompt lock");
    assert!(prompts[0].1.contains("include the reset procedure"));
}

#[tokio::test]
async fn stored_prompt_template_overrides_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("should create database");

    crate::database::PromptQueries::insert(
        database.pool(),
        &PromptTemplate {
            id: 0,
            title: "Relay X".to_string(),
            feature: "voltage unbalance".to_string(),
            system_prompt: "CUSTOM SYSTEM PROMPT".to_string(),
            human_prompt: "CUSTOM HUMAN {feature_description} {full_context} {feedback_instructions}"
                .to_string(),
        },
    )
    .await
    .expect("insert should succeed");

    let model = std::sync::Arc::new(StubChatModel {
        prompts: Mutex::new(Vec::new()),
    });
    let generator = TestCaseGenerator::new(database, model.clone());
    let retriever = test_retriever();

    let request = GenerateRequest {
        feature_description: "voltage unbalance".to_string(),
        product_title: "Relay X".to_string(),
        reference_product: None,
        user_feedback: None,
    };

    generator
        .generate(&retriever, &request)
        .await
        .expect("generation should succeed");

    let prompts = model.prompts.lock().expect("prompt lock");
    assert_eq!(prompts[0].0, "CUSTOM SYSTEM PROMPT");
    assert!(prompts[0].1.starts_with("CUSTOM HUMAN voltage unbalance"));
}
