
use tracing::{debug, info};

use crate::database::{Database, IndexChunkQueries};
use crate::index::VectorIndex;
use crate::{QadocsError, Result};

/// Persists serialized vector indexes as bounded-size chunk rows.
///
/// The record store caps single-row payloads, so one index becomes a set of
/// rows keyed by a derived name. Replacing a set is transactional; readers
/// never observe a mix of old and new chunks.
pub struct ChunkedIndexStore {
    database: Database,
    max_chunk_bytes: usize,
}

impl ChunkedIndexStore {
    #[inline]
    pub fn new(database: Database, max_chunk_bytes: usize) -> Self {
        Self {
            database,
            max_chunk_bytes,
        }
    }

    /// Deterministic storage key for a (doc_type, title) pair.
    #[inline]
    pub fn index_name(doc_type: &str, title: &str) -> String {
        format!("vector_index_{}_{}", doc_type, title.replace(' ', "_"))
    }

    /// Serialize the index, split it into chunks and replace any prior set
    /// stored under the same (doc_type, title).
    #[inline]
    pub async fn persist(&self, index: &VectorIndex, doc_type: &str, title: &str) -> Result<()> {
        let name = Self::index_name(doc_type, title);
        let bytes = index.serialize_to_bytes()?;
        let chunks = split_into_chunks(&bytes, self.max_chunk_bytes);

        info!(
            "Persisting index '{}': {} bytes in {} chunks",
            name,
            bytes.len(),
            chunks.len()
        );

        IndexChunkQueries::replace_chunks(self.database.pool(), &name, doc_type, title, chunks)
            .await?;
        Ok(())
    }

    /// Load one named index. Returns `NotFound` when no chunks exist.
    #[inline]
    pub async fn load(&self, name: &str) -> Result<VectorIndex> {
        let chunks = IndexChunkQueries::load_chunks(self.database.pool(), name).await?;
        if chunks.is_empty() {
            return Err(QadocsError::NotFound(format!(
                "No index chunks stored under '{}'",
                name
            )));
        }

        let total = chunks.len() as i64;
        let mut bytes = Vec::new();
        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.chunk_number != position as i64 || chunk.total_chunks != total {
                return Err(QadocsError::Database(format!(
                    "Corrupt chunk set for '{}': chunk {} of {} at position {}",
                    name, chunk.chunk_number, chunk.total_chunks, position
                )));
            }
            bytes.extend_from_slice(&chunk.payload);
        }

        debug!("Reassembled index '{}' from {} chunks", name, total);
        VectorIndex::deserialize_from_bytes(&bytes)
    }

    /// Load several named indexes and merge them into one. Names without
    /// chunks are skipped; if none of the names has chunks the result is
    /// `NotFound`; callers must not silently proceed with an empty index.
    #[inline]
    pub async fn load_merged(&self, names: &[String]) -> Result<VectorIndex> {
        let mut combined: Option<VectorIndex> = None;

        for name in names {
            match self.load(name).await {
                Ok(index) => match combined.as_mut() {
                    Some(existing) => existing.merge(index),
                    None => combined = Some(index),
                },
                Err(QadocsError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        combined.ok_or_else(|| {
            QadocsError::NotFound(format!(
                "No index chunks found for any of {} requested keys",
                names.len()
            ))
        })
    }

    /// Load and merge every stored index.
    #[inline]
    pub async fn load_all(&self) -> Result<VectorIndex> {
        let names = IndexChunkQueries::distinct_names(self.database.pool()).await?;
        self.load_merged(&names).await
    }

    /// Names of indexes stored for a product title.
    #[inline]
    pub async fn names_for_title(&self, title: &str) -> Result<Vec<String>> {
        Ok(IndexChunkQueries::names_for_title(self.database.pool(), title).await?)
    }

    #[inline]
    pub async fn delete(&self, name: &str) -> Result<u64> {
        Ok(IndexChunkQueries::delete_by_name(self.database.pool(), name).await?)
    }
}

/// Split a blob into chunks of at most `max_chunk_bytes`. The concatenation
/// of the chunks in order reproduces the blob exactly.
#[inline]
pub fn split_into_chunks(bytes: &[u8], max_chunk_bytes: usize) -> Vec<Vec<u8>> {
    if bytes.is_empty() {
        return Vec::new();
    }
    bytes
        .chunks(max_chunk_bytes)
        .map(<[u8]>::to_vec)
        .collect()
}
