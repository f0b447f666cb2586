use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::Result;
use crate::config::Config;
use crate::database::{Database, DocumentQueries, IndexChunkQueries};
use crate::embeddings::OllamaClient;
use crate::generator::{GenerateRequest, OllamaChatClient, TestCaseGenerator};
use crate::indexer::Indexer;

async fn open_database(config: &Config) -> Result<Database> {
    std::fs::create_dir_all(&config.base_dir)?;
    Ok(Database::new(config.database_path()).await?)
}

/// Upload one or more documents under a base doc_type
#[inline]
pub async fn upload_documents(
    files: Vec<PathBuf>,
    doc_type: String,
    title: Option<String>,
    max_pages: Option<usize>,
) -> Result<()> {
    let config = Config::load()?;
    let indexer = Indexer::new(config).await?;

    let titles = match (&title, files.len()) {
        (Some(title), 1) => Some(vec![title.clone()]),
        (Some(_), _) => {
            println!("⚠️  --title is ignored for multi-file uploads; using file names");
            None
        }
        (None, _) => None,
    };

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    // Files are processed sequentially; the conversion step does not
    // tolerate concurrent runs.
    let results = indexer
        .upload_files(&files, &doc_type, titles, max_pages)
        .await;
    let mut succeeded = 0usize;

    for (path, outcome) in &results {
        progress.inc(1);
        match outcome {
            Ok(outcome) => {
                succeeded += 1;
                progress.println(format!(
                    "✅ {} -> {} ({}) : {} pages, {} indexed documents{}",
                    path.display(),
                    outcome.title,
                    outcome.doc_type,
                    outcome.pages,
                    outcome.build.indexed_documents,
                    if outcome.build.is_complete() {
                        String::new()
                    } else {
                        format!(
                            " [degraded: {}/{} batches]",
                            outcome.build.completed_batches, outcome.build.total_batches
                        )
                    }
                ));
            }
            Err(e) => {
                progress.println(format!("❌ {}: {}", path.display(), e));
            }
        }
    }
    progress.finish_and_clear();

    println!();
    println!("Uploaded {}/{} files successfully", succeeded, results.len());
    Ok(())
}

/// List all stored documents with page counts
#[inline]
pub async fn list_documents() -> Result<()> {
    let config = Config::load()?;
    let database = open_database(&config).await?;

    let summaries = DocumentQueries::list_summaries(database.pool()).await?;
    if summaries.is_empty() {
        println!("No documents have been uploaded yet.");
        println!("Use 'qadocs upload <file> --doc-type <type>' to add one.");
        return Ok(());
    }

    println!("Stored Documents ({} versions):", summaries.len());
    println!();
    for summary in &summaries {
        println!("📄 {} ({})", summary.title, summary.doc_type);
        println!("   Pages: {}", summary.page_count);
        println!("   Source: {}", summary.original_filename);
        println!(
            "   Uploaded: {}",
            summary.upload_date.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}

/// Delete a stored document version and its index
#[inline]
pub async fn delete_document(title: String, doc_type: String) -> Result<()> {
    let config = Config::load()?;
    let indexer = Indexer::new(config).await?;

    let deleted = indexer.delete_document(&title, &doc_type).await?;
    if deleted == 0 {
        println!("No documents found for {} ({})", title, doc_type);
    } else {
        println!("Deleted {} pages for {} ({})", deleted, title, doc_type);
        println!("✓ Index chunks deleted");
    }

    Ok(())
}

/// Rebuild the vector index for a stored document version
#[inline]
pub async fn reindex(title: String, doc_type: String) -> Result<()> {
    let config = Config::load()?;
    let indexer = Indexer::new(config).await?;

    info!("Rebuilding index for {} ({})", title, doc_type);
    let outcome = indexer.build_and_persist_index(&title, &doc_type).await?;

    println!(
        "Index rebuilt for {} ({}): {} documents",
        title, doc_type, outcome.indexed_documents
    );
    if !outcome.is_complete() {
        println!(
            "⚠️  Degraded build: {}/{} batches succeeded",
            outcome.completed_batches, outcome.total_batches
        );
    }

    Ok(())
}

/// Hybrid search across everything stored
#[inline]
pub async fn ask(question: String, k: usize) -> Result<()> {
    let config = Config::load()?;
    let indexer = Indexer::new(config).await?;

    let results = indexer.query_all(&question, k).await?;
    if results.is_empty() {
        println!("No matching documents found.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({}), Page {}",
            rank + 1,
            result.score,
            result.document.metadata.title,
            result.document.metadata.doc_type,
            result.document.metadata.page_no
        );

        let mut snippet = result.document.text.replace('\n', " ");
        if snippet.chars().count() > 300 {
            snippet = snippet.chars().take(300).collect::<String>() + "...";
        }
        println!("   {}", snippet);
        println!();
    }

    Ok(())
}

/// Generate a test case for a product feature
#[inline]
pub async fn generate_test_case(
    feature: String,
    product: String,
    reference: Option<String>,
    feedback: Option<String>,
) -> Result<()> {
    let config = Config::load()?;
    let chat_client = OllamaChatClient::new(&config.ollama)
        .context("Failed to create Ollama chat client")?;
    let indexer = Indexer::new(config).await?;

    let retriever = indexer
        .retriever_for_product(&product, reference.as_deref())
        .await?;

    let generator = TestCaseGenerator::new(indexer.database().clone(), Arc::new(chat_client));
    let request = GenerateRequest {
        feature_description: feature,
        product_title: product,
        reference_product: reference,
        user_feedback: feedback,
    };

    let generated = generator.generate(&retriever, &request).await?;

    println!("Feature: {}", generated.feature);
    println!();
    println!("{}", generated.test_case);
    println!();
    println!("Sources:");
    for source in &generated.sources {
        println!("  - {}", source);
    }

    Ok(())
}

/// Record feedback on a previously generated test case
#[inline]
pub async fn add_feedback(product: String, feature: String, feedback: String) -> Result<()> {
    let config = Config::load()?;
    let database = open_database(&config).await?;

    let previous = crate::database::QueryCacheQueries::get(database.pool(), &feature)
        .await?
        .map(|cached| cached.test_case);

    crate::database::FeedbackQueries::insert(
        database.pool(),
        &crate::database::NewFeedback {
            product_title: product.clone(),
            feature: feature.clone(),
            feedback,
            previous_test_case: previous,
        },
    )
    .await?;

    println!("Feedback stored for '{}' ({})", feature, product);
    println!("It will be applied to future generations for similar features.");
    Ok(())
}

/// Show connectivity and storage status
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("📊 Qadocs Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    let database = match open_database(&config).await {
        Ok(db) => {
            println!("   ✅ SQLite: Connected");
            Some(db)
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
            None
        }
    };

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   💬 Chat Model: {}", config.ollama.chat_model);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    if let Some(database) = database {
        println!();
        println!("📚 Storage Overview:");

        match DocumentQueries::list_summaries(database.pool()).await {
            Ok(summaries) => {
                if summaries.is_empty() {
                    println!("   📭 No documents uploaded yet");
                } else {
                    let total_pages: i64 = summaries.iter().map(|s| s.page_count).sum();
                    println!("   📄 Document versions: {}", summaries.len());
                    println!("   📃 Total pages: {}", total_pages);
                }
            }
            Err(e) => println!("   ❌ Failed to load document summaries: {}", e),
        }

        match IndexChunkQueries::distinct_names(database.pool()).await {
            Ok(names) => println!("   🧮 Vector indexes: {}", names.len()),
            Err(e) => println!("   ❌ Failed to list indexes: {}", e),
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'qadocs upload <file> --doc-type <type>' to ingest a document");
    println!("   • Use 'qadocs ask \"<question>\"' to search your documents");
    println!("   • Use 'qadocs generate \"<feature>\" --product <title>' for test cases");

    Ok(())
}
