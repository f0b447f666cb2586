
pub mod models;
pub mod queries;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

pub use models::{
    CachedQuery, ContentElement, DocumentRecord, DocumentSummary, FeedbackRecord, IndexChunkRow,
    NewDocument, NewFeedback, PromptTemplate,
};
pub use queries::{
    DocumentQueries, FeedbackQueries, IndexChunkQueries, PromptQueries, QueryCacheQueries,
};

pub type DbPool = Pool<Sqlite>;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        page_no INTEGER NOT NULL,
        content TEXT NOT NULL,
        original_filename TEXT NOT NULL,
        upload_date DATETIME NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_documents_title_doctype
        ON documents (title, doc_type)",
    "CREATE TABLE IF NOT EXISTS index_chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        chunk_number INTEGER NOT NULL,
        total_chunks INTEGER NOT NULL,
        payload BLOB NOT NULL,
        doc_type TEXT NOT NULL,
        title TEXT NOT NULL,
        last_updated DATETIME NOT NULL,
        UNIQUE (name, chunk_number)
    )",
    "CREATE TABLE IF NOT EXISTS feedback (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_title TEXT NOT NULL,
        feature TEXT NOT NULL,
        feedback TEXT NOT NULL,
        previous_test_case TEXT,
        created_date DATETIME NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS prompts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        feature TEXT NOT NULL,
        system_prompt TEXT NOT NULL,
        human_prompt TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS query_cache (
        query TEXT PRIMARY KEY,
        test_case TEXT NOT NULL,
        created_date DATETIME NOT NULL
    )",
];

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to run schema migration")?;
        }

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
