
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::embeddings::{Embedder, count_tokens};
use crate::index::{IndexedDocument, VectorIndex};
use crate::{QadocsError, Result};

/// Index build tuning. Batch sizing targets a constant token budget rather
/// than a constant document count because embedding cost is token-bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexingConfig {
    /// Maximum concurrent embedding requests.
    pub max_parallel_requests: usize,
    /// Token budget each batch aims for.
    pub target_tokens_per_batch: usize,
    /// Delay between retries of a failed batch.
    pub retry_delay_secs: u64,
    /// Attempts per batch before it is dropped from the build.
    pub max_batch_retries: u32,
    /// Size cap for stored index chunks.
    pub max_chunk_bytes: usize,
    /// Minimum seconds between progress log lines.
    pub progress_interval_secs: u64,
}

impl Default for IndexingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_parallel_requests: 6,
            target_tokens_per_batch: 8000,
            retry_delay_secs: 60,
            max_batch_retries: 5,
            max_chunk_bytes: 15 * 1024 * 1024,
            progress_interval_secs: 10,
        }
    }
}

/// Caller-held cancellation flag, checked between retry attempts and before
/// each queued batch starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of an index build. A degraded build (some batches failed after
/// retries) still yields an index; callers can judge confidence from the
/// completed/total counts.
#[derive(Debug)]
pub struct BuildReport {
    pub index: VectorIndex,
    pub completed_batches: usize,
    pub total_batches: usize,
}

impl BuildReport {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completed_batches == self.total_batches
    }
}

/// Batch size for a corpus averaging `avg_tokens` per document, aiming for
/// `target_tokens` per batch, clamped to [1, 100]. Falls back to 50 when the
/// average is zero (empty or whitespace-only corpus).
#[inline]
pub fn compute_batch_size(target_tokens: usize, avg_tokens: f64) -> usize {
    if avg_tokens <= 0.0 {
        return 50;
    }
    ((target_tokens as f64 / avg_tokens) as usize).clamp(1, 100)
}

/// Builds a [`VectorIndex`] from documents with dynamic token-budget
/// batching and bounded-parallel embedding calls.
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    config: IndexingConfig,
    cancel: CancelFlag,
}

impl IndexBuilder {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, config: IndexingConfig) -> Self {
        Self {
            embedder,
            config,
            cancel: CancelFlag::new(),
        }
    }

    #[inline]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Embed every document and merge the per-batch indexes as they
    /// complete. Merge order is whatever completion order the workers
    /// produce; final index content does not depend on it.
    #[inline]
    pub async fn build(&self, documents: Vec<IndexedDocument>) -> Result<BuildReport> {
        if documents.is_empty() {
            return Ok(BuildReport {
                index: VectorIndex::new(),
                completed_batches: 0,
                total_batches: 0,
            });
        }

        let token_counts: Vec<usize> = documents.iter().map(|d| count_tokens(&d.text)).collect();
        let total_tokens: usize = token_counts.iter().sum();
        let avg_tokens = total_tokens as f64 / documents.len() as f64;
        let batch_size = compute_batch_size(self.config.target_tokens_per_batch, avg_tokens);

        let batches: Vec<Vec<IndexedDocument>> = documents
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let total_batches = batches.len();

        info!(
            "Processing {} documents in {} batches (avg {:.0} tokens/doc)",
            documents.len(),
            total_batches,
            avg_tokens
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_requests));
        let mut join_set = JoinSet::new();

        for (batch_no, batch) in batches.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let embedder = Arc::clone(&self.embedder);
            let cancel = self.cancel.clone();
            let retry_delay = Duration::from_secs(self.config.retry_delay_secs);
            let max_retries = self.config.max_batch_retries;

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .context("Embedding semaphore closed")?;

                tokio::task::spawn_blocking(move || {
                    embed_batch_with_retry(
                        embedder.as_ref(),
                        &batch,
                        batch_no,
                        max_retries,
                        retry_delay,
                        &cancel,
                    )
                })
                .await
                .context("Embedding worker panicked")?
            });
        }

        let mut index: Option<VectorIndex> = None;
        let mut completed = 0usize;
        let start = Instant::now();
        let mut last_update = Instant::now();
        let progress_interval = Duration::from_secs(self.config.progress_interval_secs);

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(batch_index)) => {
                    completed += 1;
                    match index.as_mut() {
                        Some(existing) => existing.merge(batch_index),
                        None => index = Some(batch_index),
                    }

                    if last_update.elapsed() > progress_interval {
                        let elapsed_min = start.elapsed().as_secs_f64() / 60.0;
                        let rate = if elapsed_min > 0.0 {
                            completed as f64 / elapsed_min
                        } else {
                            0.0
                        };
                        let remaining = (total_batches - completed) as f64 / rate.max(0.1);
                        info!(
                            "Progress: {}/{} batches ({:.1}/min, ~{:.1} min remaining)",
                            completed, total_batches, rate, remaining
                        );
                        last_update = Instant::now();
                    }
                }
                Ok(Err(e)) => {
                    error!("Failed to process batch: {:#}", e);
                }
                Err(e) => {
                    error!("Embedding task failed to join: {}", e);
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(QadocsError::TransientService(
                "Index build cancelled".to_string(),
            ));
        }

        let Some(index) = index else {
            return Err(QadocsError::Embedding(format!(
                "All {} embedding batches failed",
                total_batches
            )));
        };

        if completed < total_batches {
            warn!(
                "Index build degraded: {}/{} batches succeeded",
                completed, total_batches
            );
        }

        info!(
            "Completed {}/{} batches in {:.1} minutes",
            completed,
            total_batches,
            start.elapsed().as_secs_f64() / 60.0
        );

        Ok(BuildReport {
            index,
            completed_batches: completed,
            total_batches,
        })
    }
}

/// Embed one batch with bounded retries and a fixed delay between attempts.
/// The sleep blocks only this worker; each worker owns its batch end to end.
fn embed_batch_with_retry(
    embedder: &dyn Embedder,
    batch: &[IndexedDocument],
    batch_no: usize,
    max_retries: u32,
    retry_delay: Duration,
    cancel: &CancelFlag,
) -> anyhow::Result<VectorIndex> {
    let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();

    let mut last_error = None;
    for attempt in 1..=max_retries {
        if cancel.is_cancelled() {
            return Err(anyhow!("Build cancelled before batch {} completed", batch_no));
        }

        match embedder.embed_batch(&texts) {
            Ok(embeddings) => {
                if embeddings.len() != batch.len() {
                    return Err(anyhow!(
                        "Embedder returned {} vectors for {} documents",
                        embeddings.len(),
                        batch.len()
                    ));
                }

                let mut index = VectorIndex::new();
                for (document, embedding) in batch.iter().cloned().zip(embeddings) {
                    index.insert(document, embedding);
                }
                debug!("Batch {} embedded ({} documents)", batch_no, batch.len());
                return Ok(index);
            }
            Err(e) => {
                warn!(
                    "Batch {} attempt {}/{} failed: {:#}. Retrying in {:?}",
                    batch_no, attempt, max_retries, e, retry_delay
                );
                last_error = Some(e);
                if attempt < max_retries {
                    std::thread::sleep(retry_delay);
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow!("Batch {} failed with no recorded error", batch_no))
        .context(format!(
            "Batch {} failed after {} attempts",
            batch_no, max_retries
        )))
}
