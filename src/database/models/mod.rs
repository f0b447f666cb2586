
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single content element extracted from a document page.
///
/// Tables always carry string-coerced cells so downstream formatting never
/// has to deal with nulls or typed values. `feature` is the heading or text
/// the table was associated with during extraction ("N/A" when none found).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentElement {
    Text {
        content: String,
        is_heading: bool,
    },
    Table {
        content: Vec<Vec<String>>,
        feature: String,
    },
}

impl ContentElement {
    #[inline]
    pub fn is_table(&self) -> bool {
        matches!(self, ContentElement::Table { .. })
    }

    #[inline]
    pub fn is_heading(&self) -> bool {
        matches!(
            self,
            ContentElement::Text {
                is_heading: true,
                ..
            }
        )
    }
}

/// One stored page of a document. Identity is (title, doc_type, page_no);
/// pages are fully replaced on re-upload, never partially mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub title: String,
    pub doc_type: String,
    pub page_no: i64,
    pub content: Vec<ContentElement>,
    pub original_filename: String,
    pub upload_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub doc_type: String,
    pub page_no: i64,
    pub content: Vec<ContentElement>,
    pub original_filename: String,
}

/// Raw database row; `content` is the JSON-encoded element list.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub title: String,
    pub doc_type: String,
    pub page_no: i64,
    pub content: String,
    pub original_filename: String,
    pub upload_date: NaiveDateTime,
}

impl DocumentRow {
    #[inline]
    pub fn into_record(self) -> Result<DocumentRecord> {
        let content: Vec<ContentElement> = serde_json::from_str(&self.content)
            .with_context(|| format!("Failed to decode content for document {}", self.id))?;
        Ok(DocumentRecord {
            id: self.id,
            title: self.title,
            doc_type: self.doc_type,
            page_no: self.page_no,
            content,
            original_filename: self.original_filename,
            upload_date: self.upload_date,
        })
    }
}

/// Summary line for the CLI document listing.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DocumentSummary {
    pub title: String,
    pub doc_type: String,
    pub page_count: i64,
    pub original_filename: String,
    pub upload_date: NaiveDateTime,
}

/// One stored chunk of a serialized vector index. Concatenating payloads for
/// a name ordered by `chunk_number` reproduces exactly one serialized index.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct IndexChunkRow {
    pub id: i64,
    pub name: String,
    pub chunk_number: i64,
    pub total_chunks: i64,
    pub payload: Vec<u8>,
    pub doc_type: String,
    pub title: String,
    pub last_updated: NaiveDateTime,
}

/// User feedback on a generated test case, recalled later by feature
/// similarity rather than exact match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FeedbackRecord {
    pub id: i64,
    pub product_title: String,
    pub feature: String,
    pub feedback: String,
    pub previous_test_case: Option<String>,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub product_title: String,
    pub feature: String,
    pub feedback: String,
    pub previous_test_case: Option<String>,
}

/// Per-product prompt template, selected by feature similarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PromptTemplate {
    pub id: i64,
    pub title: String,
    pub feature: String,
    pub system_prompt: String,
    pub human_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CachedQuery {
    pub query: String,
    pub test_case: String,
    pub created_date: NaiveDateTime,
}
