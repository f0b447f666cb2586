
pub mod builder;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::{QadocsError, Result};

const MAGIC: &[u8; 4] = b"QDIX";
const FORMAT_VERSION: u8 = 1;

/// Which kind of content element a corpus document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Table,
}

/// Provenance carried alongside every embedded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub title: String,
    pub doc_type: String,
    pub page_no: i64,
    pub element_kind: ElementKind,
    pub feature: Option<String>,
    pub original_filename: String,
}

/// A retrieval-corpus document: rendered text plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub text: String,
    pub metadata: DocMetadata,
}

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    embedding: Vec<f32>,
    document: IndexedDocument,
}

/// A scored dense-retrieval hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document: IndexedDocument,
    pub score: f32,
}

/// In-memory dense vector index over embedded documents.
///
/// Search is exhaustive cosine similarity; corpora here are product manuals,
/// not web scale. Merging is order-independent for retrieval results: the
/// entry set after merging is the union regardless of merge order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn insert(&mut self, document: IndexedDocument, embedding: Vec<f32>) {
        self.entries.push(IndexEntry {
            embedding,
            document,
        });
    }

    /// Merge another index into this one.
    #[inline]
    pub fn merge(&mut self, other: VectorIndex) {
        self.entries.extend(other.entries);
    }

    #[inline]
    pub fn documents(&self) -> impl Iterator<Item = &IndexedDocument> {
        self.entries.iter().map(|e| &e.document)
    }

    /// Top-k documents by cosine similarity to the query embedding.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                document: entry.document.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }

    /// Serialize to a self-describing binary blob.
    ///
    /// Layout: magic, version, entry count, then per entry a JSON metadata
    /// block and the little-endian f32 vector. Vectors round-trip exactly.
    #[inline]
    pub fn serialize_to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());

        for entry in &self.entries {
            let meta = serde_json::to_vec(&entry.document)
                .map_err(|e| QadocsError::Index(format!("Failed to encode entry: {}", e)))?;
            out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
            out.extend_from_slice(&meta);
            out.extend_from_slice(&(entry.embedding.len() as u32).to_le_bytes());
            for value in &entry.embedding {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }

        Ok(out)
    }

    #[inline]
    pub fn deserialize_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes);

        let magic = cursor.take(4)?;
        if magic != MAGIC {
            return Err(QadocsError::Index(
                "Invalid index blob: bad magic bytes".to_string(),
            ));
        }
        let version = cursor.take(1)?[0];
        if version != FORMAT_VERSION {
            return Err(QadocsError::Index(format!(
                "Unsupported index format version: {}",
                version
            )));
        }

        let entry_count = cursor.read_u32()? as usize;
        let mut entries = Vec::with_capacity(entry_count);

        for _ in 0..entry_count {
            let meta_len = cursor.read_u32()? as usize;
            let meta = cursor.take(meta_len)?;
            let document: IndexedDocument = serde_json::from_slice(meta)
                .map_err(|e| QadocsError::Index(format!("Failed to decode entry: {}", e)))?;

            let dim = cursor.read_u32()? as usize;
            let mut embedding = Vec::with_capacity(dim);
            for _ in 0..dim {
                let raw = cursor.take(4)?;
                embedding.push(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
            }

            entries.push(IndexEntry {
                embedding,
                document,
            });
        }

        if !cursor.is_exhausted() {
            return Err(QadocsError::Index(
                "Invalid index blob: trailing bytes".to_string(),
            ));
        }

        Ok(Self { entries })
    }
}

/// Cosine similarity; zero when dimensions mismatch or either vector is zero.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).ok_or_else(|| {
            QadocsError::Index("Invalid index blob: length overflow".to_string())
        })?;
        let slice = self.bytes.get(self.offset..end).ok_or_else(|| {
            QadocsError::Index("Invalid index blob: unexpected end of data".to_string())
        })?;
        self.offset = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn is_exhausted(&self) -> bool {
        self.offset == self.bytes.len()
    }
}
