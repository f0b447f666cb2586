
use anyhow::{Context, Result};
use chrono::Utc;
use fancy_regex::Regex;
use sqlx::SqlitePool;
use tracing::debug;

use super::models::{
    CachedQuery, DocumentRecord, DocumentRow, DocumentSummary, FeedbackRecord, IndexChunkRow,
    NewDocument, NewFeedback, PromptTemplate,
};

pub struct DocumentQueries;

impl DocumentQueries {
    /// Replace every page stored under (title, doc_type) with the given set.
    ///
    /// Runs as a single transaction so readers never observe a partially
    /// replaced document.
    #[inline]
    pub async fn replace_pages(pool: &SqlitePool, pages: &[NewDocument]) -> Result<u64> {
        let Some(first) = pages.first() else {
            return Ok(0);
        };

        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM documents WHERE title = ? AND doc_type = ?")
            .bind(&first.title)
            .bind(&first.doc_type)
            .execute(&mut *tx)
            .await
            .context("Failed to delete existing document pages")?;

        for page in pages {
            let content = serde_json::to_string(&page.content)
                .context("Failed to encode page content as JSON")?;
            sqlx::query(
                "INSERT INTO documents (title, doc_type, page_no, content, original_filename, upload_date)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&page.title)
            .bind(&page.doc_type)
            .bind(page.page_no)
            .bind(content)
            .bind(&page.original_filename)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert document page")?;
        }

        tx.commit().await.context("Failed to commit document pages")?;

        debug!(
            "Stored {} pages for {} ({})",
            pages.len(),
            first.title,
            first.doc_type
        );
        Ok(pages.len() as u64)
    }

    #[inline]
    pub async fn find_by_title_and_doctype(
        pool: &SqlitePool,
        title: &str,
        doc_type: &str,
    ) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, title, doc_type, page_no, content, original_filename, upload_date
             FROM documents WHERE title = ? AND doc_type = ? ORDER BY page_no",
        )
        .bind(title)
        .bind(doc_type)
        .fetch_all(pool)
        .await
        .context("Failed to fetch documents by title and doc_type")?;

        rows.into_iter().map(DocumentRow::into_record).collect()
    }

    #[inline]
    pub async fn find_by_title(pool: &SqlitePool, title: &str) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, title, doc_type, page_no, content, original_filename, upload_date
             FROM documents WHERE title = ? ORDER BY doc_type, page_no",
        )
        .bind(title)
        .fetch_all(pool)
        .await
        .context("Failed to fetch documents by title")?;

        rows.into_iter().map(DocumentRow::into_record).collect()
    }

    #[inline]
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, title, doc_type, page_no, content, original_filename, upload_date
             FROM documents ORDER BY title, doc_type, page_no",
        )
        .fetch_all(pool)
        .await
        .context("Failed to fetch all documents")?;

        rows.into_iter().map(DocumentRow::into_record).collect()
    }

    #[inline]
    pub async fn delete_by_title_and_doctype(
        pool: &SqlitePool,
        title: &str,
        doc_type: &str,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE title = ? AND doc_type = ?")
            .bind(title)
            .bind(doc_type)
            .execute(pool)
            .await
            .context("Failed to delete documents")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn distinct_titles(pool: &SqlitePool) -> Result<Vec<String>> {
        let titles =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT title FROM documents ORDER BY title")
                .fetch_all(pool)
                .await
                .context("Failed to fetch distinct titles")?;

        Ok(titles)
    }

    #[inline]
    pub async fn distinct_doc_types(pool: &SqlitePool, title: &str) -> Result<Vec<String>> {
        let doc_types = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT doc_type FROM documents WHERE title = ? ORDER BY doc_type",
        )
        .bind(title)
        .fetch_all(pool)
        .await
        .context("Failed to fetch distinct doc types")?;

        Ok(doc_types)
    }

    #[inline]
    pub async fn list_summaries(pool: &SqlitePool) -> Result<Vec<DocumentSummary>> {
        let summaries = sqlx::query_as::<_, DocumentSummary>(
            "SELECT title, doc_type, COUNT(*) as page_count,
                    MIN(original_filename) as original_filename,
                    MAX(upload_date) as upload_date
             FROM documents GROUP BY title, doc_type ORDER BY title, doc_type",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list document summaries")?;

        Ok(summaries)
    }

    /// Next free doc_type for a title: the bare base when unused, otherwise
    /// base + (highest numeric suffix + 1). The bare base counts as suffix 0,
    /// so the sequence is base, base1, base2, ... and numbers are never
    /// reused.
    #[inline]
    pub async fn next_available_doctype(
        pool: &SqlitePool,
        title: &str,
        base_doctype: &str,
    ) -> Result<String> {
        let existing = Self::distinct_doc_types(pool, title).await?;

        let pattern = Regex::new(&format!("^{}(\\d*)$", fancy_regex::escape(base_doctype)))
            .context("Failed to compile doc_type pattern")?;

        let mut base_taken = false;
        let mut max_suffix: u64 = 0;
        for doc_type in &existing {
            let Ok(Some(captures)) = pattern.captures(doc_type) else {
                continue;
            };
            let suffix = captures
                .get(1)
                .map(|m| m.as_str())
                .unwrap_or_default();
            if suffix.is_empty() {
                base_taken = true;
            } else if let Ok(n) = suffix.parse::<u64>() {
                max_suffix = max_suffix.max(n);
            }
        }

        if !base_taken {
            return Ok(base_doctype.to_string());
        }

        Ok(format!("{}{}", base_doctype, max_suffix + 1))
    }
}

pub struct IndexChunkQueries;

impl IndexChunkQueries {
    /// Replace the full chunk set stored under a name.
    ///
    /// Delete and insert commit together in one transaction; readers either
    /// see the complete old set or the complete new one, never a mix.
    #[inline]
    pub async fn replace_chunks(
        pool: &SqlitePool,
        name: &str,
        doc_type: &str,
        title: &str,
        payloads: Vec<Vec<u8>>,
    ) -> Result<()> {
        let now = Utc::now().naive_utc();
        let total = payloads.len() as i64;

        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM index_chunks WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .context("Failed to delete existing index chunks")?;

        for (chunk_number, payload) in payloads.into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO index_chunks (name, chunk_number, total_chunks, payload, doc_type, title, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(chunk_number as i64)
            .bind(total)
            .bind(payload)
            .bind(doc_type)
            .bind(title)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert index chunk")?;
        }

        tx.commit().await.context("Failed to commit index chunks")?;

        debug!("Stored {} index chunks under '{}'", total, name);
        Ok(())
    }

    #[inline]
    pub async fn load_chunks(pool: &SqlitePool, name: &str) -> Result<Vec<IndexChunkRow>> {
        let chunks = sqlx::query_as::<_, IndexChunkRow>(
            "SELECT id, name, chunk_number, total_chunks, payload, doc_type, title, last_updated
             FROM index_chunks WHERE name = ? ORDER BY chunk_number",
        )
        .bind(name)
        .fetch_all(pool)
        .await
        .context("Failed to load index chunks")?;

        Ok(chunks)
    }

    #[inline]
    pub async fn distinct_names(pool: &SqlitePool) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT name FROM index_chunks ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .context("Failed to fetch distinct index names")?;

        Ok(names)
    }

    #[inline]
    pub async fn names_for_title(pool: &SqlitePool, title: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT name FROM index_chunks WHERE title = ? ORDER BY name",
        )
        .bind(title)
        .fetch_all(pool)
        .await
        .context("Failed to fetch index names for title")?;

        Ok(names)
    }

    #[inline]
    pub async fn delete_by_name(pool: &SqlitePool, name: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM index_chunks WHERE name = ?")
            .bind(name)
            .execute(pool)
            .await
            .context("Failed to delete index chunks")?;

        Ok(result.rows_affected())
    }
}

pub struct FeedbackQueries;

impl FeedbackQueries {
    #[inline]
    pub async fn insert(pool: &SqlitePool, feedback: &NewFeedback) -> Result<i64> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO feedback (product_title, feature, feedback, previous_test_case, created_date)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&feedback.product_title)
        .bind(&feedback.feature)
        .bind(&feedback.feedback)
        .bind(&feedback.previous_test_case)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to insert feedback")?
        .last_insert_rowid();

        Ok(id)
    }

    #[inline]
    pub async fn list_for_product(
        pool: &SqlitePool,
        product_title: &str,
    ) -> Result<Vec<FeedbackRecord>> {
        let records = sqlx::query_as::<_, FeedbackRecord>(
            "SELECT id, product_title, feature, feedback, previous_test_case, created_date
             FROM feedback WHERE product_title = ? ORDER BY created_date DESC",
        )
        .bind(product_title)
        .fetch_all(pool)
        .await
        .context("Failed to list feedback for product")?;

        Ok(records)
    }
}

pub struct PromptQueries;

impl PromptQueries {
    #[inline]
    pub async fn insert(pool: &SqlitePool, template: &PromptTemplate) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO prompts (title, feature, system_prompt, human_prompt)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&template.title)
        .bind(&template.feature)
        .bind(&template.system_prompt)
        .bind(&template.human_prompt)
        .execute(pool)
        .await
        .context("Failed to insert prompt template")?
        .last_insert_rowid();

        Ok(id)
    }

    #[inline]
    pub async fn list_for_title(pool: &SqlitePool, title: &str) -> Result<Vec<PromptTemplate>> {
        let templates = sqlx::query_as::<_, PromptTemplate>(
            "SELECT id, title, feature, system_prompt, human_prompt
             FROM prompts WHERE title = ?",
        )
        .bind(title)
        .fetch_all(pool)
        .await
        .context("Failed to list prompt templates")?;

        Ok(templates)
    }
}

pub struct QueryCacheQueries;

impl QueryCacheQueries {
    #[inline]
    pub async fn upsert(pool: &SqlitePool, query: &str, test_case: &str) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO query_cache (query, test_case, created_date) VALUES (?, ?, ?)
             ON CONFLICT(query) DO UPDATE SET test_case = excluded.test_case,
                                             created_date = excluded.created_date",
        )
        .bind(query)
        .bind(test_case)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to upsert query cache entry")?;

        Ok(())
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, query: &str) -> Result<Option<CachedQuery>> {
        let cached = sqlx::query_as::<_, CachedQuery>(
            "SELECT query, test_case, created_date FROM query_cache WHERE query = ?",
        )
        .bind(query)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch cached query")?;

        Ok(cached)
    }
}
