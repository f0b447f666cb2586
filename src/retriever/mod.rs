
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::embeddings::Embedder;
use crate::index::{IndexedDocument, VectorIndex};

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

/// Hybrid retrieval tuning. The weights favor semantic match while still
/// rewarding exact term overlap; queries name register addresses, protocol
/// names and acronyms that embeddings blur.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub lexical_weight: f64,
    pub vector_weight: f64,
    /// Candidates fetched from each retriever before ensembling.
    pub candidate_k: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            lexical_weight: 0.4,
            vector_weight: 0.6,
            candidate_k: 25,
        }
    }
}

/// A document ranked by the ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub document: IndexedDocument,
    pub score: f64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// In-memory BM25 ranker over a document corpus.
///
/// Cheap to rebuild, so it is reconstructed from the current document
/// records at query time rather than persisted across index rebuilds.
pub struct Bm25Index {
    documents: Vec<IndexedDocument>,
    term_frequencies: Vec<HashMap<String, usize>>,
    document_lengths: Vec<usize>,
    document_frequencies: HashMap<String, usize>,
    average_length: f64,
}

impl Bm25Index {
    #[inline]
    pub fn new(documents: Vec<IndexedDocument>) -> Self {
        let mut term_frequencies = Vec::with_capacity(documents.len());
        let mut document_lengths = Vec::with_capacity(documents.len());
        let mut document_frequencies: HashMap<String, usize> = HashMap::new();

        for document in &documents {
            let tokens = tokenize(&document.text);
            document_lengths.push(tokens.len());

            let mut frequencies: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token).or_insert(0) += 1;
            }
            for term in frequencies.keys() {
                *document_frequencies.entry(term.clone()).or_insert(0) += 1;
            }
            term_frequencies.push(frequencies);
        }

        let total_length: usize = document_lengths.iter().sum();
        let average_length = if documents.is_empty() {
            0.0
        } else {
            total_length as f64 / documents.len() as f64
        };

        Self {
            documents,
            term_frequencies,
            document_lengths,
            document_frequencies,
            average_length,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Top-k documents by BM25 score. Documents scoring zero are omitted.
    #[inline]
    pub fn search(&self, query: &str, k: usize) -> Vec<(IndexedDocument, f64)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.documents.is_empty() {
            return Vec::new();
        }

        let n = self.documents.len() as f64;
        let mut scored: Vec<(usize, f64)> = Vec::new();

        for (idx, frequencies) in self.term_frequencies.iter().enumerate() {
            let doc_len = self.document_lengths[idx] as f64;
            let mut score = 0.0;

            for term in &query_terms {
                let Some(&tf) = frequencies.get(term) else {
                    continue;
                };
                let df = self.document_frequencies.get(term).copied().unwrap_or(0) as f64;
                let idf = (((n - df + 0.5) / (df + 0.5)) + 1.0).ln();
                let tf = tf as f64;
                let denominator =
                    tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / self.average_length.max(1.0));
                score += idf * tf * (BM25_K1 + 1.0) / denominator;
            }

            if score > 0.0 {
                scored.push((idx, score));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(idx, score)| (self.documents[idx].clone(), score))
            .collect()
    }
}

/// Min-max normalize candidate scores to [0, 1]; all-equal sets normalize
/// to 1.0 so a lone candidate still counts as a full-strength hit.
fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|&s| {
            if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - min) / (max - min)
            }
        })
        .collect()
}

fn document_key(document: &IndexedDocument) -> String {
    format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}",
        document.metadata.title, document.metadata.doc_type, document.metadata.page_no, document.text
    )
}

/// Weighted ensemble of a BM25 ranker and a dense vector index.
///
/// Each retriever independently returns its own top-k; scores are min-max
/// normalized per retriever and combined as a weighted sum. A document
/// ranked top by both retrievers therefore outranks a document ranked top
/// by only one, for any weight split that keeps both weights positive.
pub struct HybridRetriever {
    lexical: Bm25Index,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    #[inline]
    pub fn new(
        lexical_corpus: Vec<IndexedDocument>,
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            lexical: Bm25Index::new(lexical_corpus),
            index,
            embedder,
            config,
        }
    }

    #[inline]
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let lexical_hits = self.lexical.search(query, self.config.candidate_k);

        let vector_hits = if self.index.is_empty() {
            Vec::new()
        } else {
            let embeddings = self
                .embedder
                .embed_batch(&[query.to_string()])
                .context("Failed to embed query")?;
            let query_embedding = embeddings
                .into_iter()
                .next()
                .context("Embedder returned no vector for query")?;
            self.index.search(&query_embedding, self.config.candidate_k)
        };

        debug!(
            "Hybrid retrieval: {} lexical candidates, {} vector candidates",
            lexical_hits.len(),
            vector_hits.len()
        );

        let lexical_norm = normalize_scores(
            &lexical_hits.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
        );
        let vector_norm = normalize_scores(
            &vector_hits.iter().map(|h| f64::from(h.score)).collect::<Vec<_>>(),
        );

        let mut combined: HashMap<String, RetrievedDocument> = HashMap::new();

        for ((document, _), norm) in lexical_hits.into_iter().zip(lexical_norm) {
            let key = document_key(&document);
            let score = self.config.lexical_weight * norm;
            combined
                .entry(key)
                .and_modify(|entry| entry.score += score)
                .or_insert(RetrievedDocument { document, score });
        }

        for (hit, norm) in vector_hits.into_iter().zip(vector_norm) {
            let key = document_key(&hit.document);
            let score = self.config.vector_weight * norm;
            combined
                .entry(key)
                .and_modify(|entry| entry.score += score)
                .or_insert(RetrievedDocument {
                    document: hit.document,
                    score,
                });
        }

        let mut results: Vec<RetrievedDocument> = combined.into_values().collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.metadata.page_no.cmp(&b.document.metadata.page_no))
        });
        results.truncate(k);

        Ok(results)
    }
}
