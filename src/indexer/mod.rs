
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::database::models::{ContentElement, DocumentRecord, NewDocument};
use crate::database::{Database, DocumentQueries};
use crate::embeddings::{Embedder, OllamaClient};
use crate::extractor::DocumentExtractor;
use crate::index::builder::{CancelFlag, IndexBuilder};
use crate::index::store::ChunkedIndexStore;
use crate::index::{DocMetadata, ElementKind, IndexedDocument, VectorIndex};
use crate::normalizer::element_text;
use crate::retriever::{HybridRetriever, RetrievedDocument};
use crate::{QadocsError, Result};

/// Result of one file upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub title: String,
    pub doc_type: String,
    pub pages: u64,
    pub build: BuildOutcome,
}

/// Index build summary surfaced to callers so they can judge confidence in
/// a degraded (partially embedded) index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub indexed_documents: usize,
    pub completed_batches: usize,
    pub total_batches: usize,
}

impl BuildOutcome {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completed_batches == self.total_batches
    }
}

/// The ingest pipeline: extraction, storage, index building and retrieval
/// wiring. All collaborators are injected; there is no ambient client state.
pub struct Indexer {
    config: Config,
    database: Database,
    extractor: DocumentExtractor,
    embedder: Arc<dyn Embedder>,
    store: ChunkedIndexStore,
    cancel: CancelFlag,
}

impl Indexer {
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        let database = Database::new(config.database_path()).await?;
        let embedder: Arc<dyn Embedder> = Arc::new(
            OllamaClient::new(&config.ollama)
                .map_err(|e| QadocsError::Config(format!("Failed to create Ollama client: {e}")))?,
        );
        Ok(Self::with_components(config, database, embedder))
    }

    /// Dependency-injecting constructor; used by tests with stub embedders.
    #[inline]
    pub fn with_components(config: Config, database: Database, embedder: Arc<dyn Embedder>) -> Self {
        let extractor = DocumentExtractor::new(config.extraction);
        let store = ChunkedIndexStore::new(database.clone(), config.indexing.max_chunk_bytes);
        Self {
            config,
            database,
            extractor,
            embedder,
            store,
            cancel: CancelFlag::new(),
        }
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Flag that aborts in-flight index builds when cancelled.
    #[inline]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Extract a file into normalized page records ready for storage.
    #[inline]
    pub fn extract_and_normalize(
        &self,
        path: &Path,
        title: &str,
        doc_type: &str,
        max_pages: Option<usize>,
    ) -> Result<Vec<NewDocument>> {
        let pages = self.extractor.extract(path, max_pages)?;

        Ok(pages
            .into_iter()
            .map(|page| NewDocument {
                title: title.to_string(),
                doc_type: doc_type.to_string(),
                page_no: page.page_no,
                content: page.elements,
                original_filename: page.original_filename,
            })
            .collect())
    }

    /// Upload one file: version the doc_type, replace stored pages, then
    /// build and persist the vector index for the new (title, doc_type).
    #[inline]
    pub async fn upload_file(
        &self,
        path: &Path,
        base_doctype: &str,
        title: Option<String>,
        max_pages: Option<usize>,
    ) -> Result<UploadOutcome> {
        let title = title.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });

        let doc_type =
            DocumentQueries::next_available_doctype(self.database.pool(), &title, base_doctype)
                .await?;

        let records = self.extract_and_normalize(path, &title, &doc_type, max_pages)?;
        if records.is_empty() {
            return Err(QadocsError::Extraction(format!(
                "No content extracted from {}",
                path.display()
            )));
        }

        let pages = DocumentQueries::replace_pages(self.database.pool(), &records).await?;
        info!(
            "Uploaded {} pages from {} as {} ({})",
            pages,
            path.display(),
            title,
            doc_type
        );

        let build = self.build_and_persist_index(&title, &doc_type).await?;

        if let Some(limit) = max_pages {
            info!("Note: processed only the first {} pages", limit);
        }

        Ok(UploadOutcome {
            title,
            doc_type,
            pages,
            build,
        })
    }

    /// Upload several files under one base doc_type.
    ///
    /// Files are processed strictly sequentially: the conversion step is the
    /// resource bottleneck and runs one file at a time.
    #[inline]
    pub async fn upload_files(
        &self,
        paths: &[PathBuf],
        base_doctype: &str,
        titles: Option<Vec<String>>,
        max_pages: Option<usize>,
    ) -> Vec<(PathBuf, Result<UploadOutcome>)> {
        let titles = match titles {
            Some(titles) if titles.len() == paths.len() => titles,
            Some(_) => {
                warn!("Title list length does not match file count; using file names");
                paths.iter().map(|p| default_title(p)).collect()
            }
            None => paths.iter().map(|p| default_title(p)).collect(),
        };

        let mut results = Vec::with_capacity(paths.len());
        for (path, title) in paths.iter().zip(titles) {
            let outcome = self
                .upload_file(path, base_doctype, Some(title), max_pages)
                .await;
            if let Err(e) = &outcome {
                warn!("Upload failed for {}: {}", path.display(), e);
            }
            results.push((path.clone(), outcome));
        }
        results
    }

    /// Build the vector index over every stored page of (title, doc_type)
    /// and persist it as a chunk set.
    #[inline]
    pub async fn build_and_persist_index(&self, title: &str, doc_type: &str) -> Result<BuildOutcome> {
        let records =
            DocumentQueries::find_by_title_and_doctype(self.database.pool(), title, doc_type)
                .await?;
        if records.is_empty() {
            return Err(QadocsError::NotFound(format!(
                "No documents found for title '{}' and doc_type '{}'",
                title, doc_type
            )));
        }

        let documents = corpus_documents(&records);
        info!(
            "Building index over {} documents for {} ({})",
            documents.len(),
            title,
            doc_type
        );

        let builder = IndexBuilder::new(Arc::clone(&self.embedder), self.config.indexing)
            .with_cancel_flag(self.cancel.clone());
        let report = builder.build(documents).await?;

        self.store.persist(&report.index, doc_type, title).await?;
        info!(
            "Index updated for {} ({}) with {} documents",
            title,
            doc_type,
            report.index.len()
        );

        Ok(BuildOutcome {
            indexed_documents: report.index.len(),
            completed_batches: report.completed_batches,
            total_batches: report.total_batches,
        })
    }

    /// Hybrid query over specific (title, doc_type) keys. Fails with
    /// `NotFound` when no index chunks exist for any key.
    #[inline]
    pub async fn hybrid_query(
        &self,
        keys: &[(String, String)],
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let names: Vec<String> = keys
            .iter()
            .map(|(title, doc_type)| ChunkedIndexStore::index_name(doc_type, title))
            .collect();
        let index = self.store.load_merged(&names).await?;

        let mut corpus = Vec::new();
        for (title, doc_type) in keys {
            let records =
                DocumentQueries::find_by_title_and_doctype(self.database.pool(), title, doc_type)
                    .await?;
            corpus.extend(text_documents(&records));
        }

        let retriever = self.retriever(corpus, index);
        retriever.retrieve(query, k)
    }

    /// Hybrid query across everything stored: all indexes merged, lexical
    /// corpus rebuilt from all current document records.
    #[inline]
    pub async fn query_all(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let index = self.store.load_all().await?;
        let records = DocumentQueries::find_all(self.database.pool()).await?;
        let retriever = self.retriever(text_documents(&records), index);
        retriever.retrieve(query, k)
    }

    /// Retriever scoped to one product, optionally mixing in test-type
    /// documents of a reference product. Used by test case generation; a
    /// product without any index yet gets a lexical-only retriever.
    #[inline]
    pub async fn retriever_for_product(
        &self,
        product_title: &str,
        reference_product: Option<&str>,
    ) -> Result<HybridRetriever> {
        let records = DocumentQueries::find_by_title(self.database.pool(), product_title).await?;
        let mut corpus = text_documents(&records);

        if let Some(reference) = reference_product {
            let reference_records =
                DocumentQueries::find_by_title(self.database.pool(), reference).await?;
            let test_records: Vec<DocumentRecord> = reference_records
                .into_iter()
                .filter(|r| r.doc_type.to_lowercase().contains("test"))
                .collect();
            corpus.extend(text_documents(&test_records));
        }

        let names = self.store.names_for_title(product_title).await?;
        let index = match self.store.load_merged(&names).await {
            Ok(index) => index,
            Err(QadocsError::NotFound(_)) => {
                warn!("No vector index for '{}'; lexical-only retrieval", product_title);
                VectorIndex::new()
            }
            Err(e) => return Err(e),
        };

        Ok(self.retriever(corpus, index))
    }

    /// Delete a stored document version and its index chunks.
    #[inline]
    pub async fn delete_document(&self, title: &str, doc_type: &str) -> Result<u64> {
        let deleted =
            DocumentQueries::delete_by_title_and_doctype(self.database.pool(), title, doc_type)
                .await?;
        let name = ChunkedIndexStore::index_name(doc_type, title);
        self.store.delete(&name).await?;
        Ok(deleted)
    }

    fn retriever(&self, corpus: Vec<IndexedDocument>, index: VectorIndex) -> HybridRetriever {
        HybridRetriever::new(
            corpus,
            index,
            Arc::clone(&self.embedder),
            self.config.retrieval,
        )
    }
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

/// Every content element of the records, rendered for the embedding corpus:
/// text as-is, tables with their feature banner.
#[inline]
pub fn corpus_documents(records: &[DocumentRecord]) -> Vec<IndexedDocument> {
    records
        .iter()
        .flat_map(|record| {
            record.content.iter().map(move |element| IndexedDocument {
                text: element_text(element),
                metadata: metadata_for(record, element),
            })
        })
        .collect()
}

/// Text elements only, for the lexical ranker.
#[inline]
pub fn text_documents(records: &[DocumentRecord]) -> Vec<IndexedDocument> {
    records
        .iter()
        .flat_map(|record| {
            record
                .content
                .iter()
                .filter(|element| !element.is_table())
                .map(move |element| IndexedDocument {
                    text: element_text(element),
                    metadata: metadata_for(record, element),
                })
        })
        .collect()
}

fn metadata_for(record: &DocumentRecord, element: &ContentElement) -> DocMetadata {
    let (element_kind, feature) = match element {
        ContentElement::Text { .. } => (ElementKind::Text, None),
        ContentElement::Table { feature, .. } => (ElementKind::Table, Some(feature.clone())),
    };

    DocMetadata {
        title: record.title.clone(),
        doc_type: record.doc_type.clone(),
        page_no: record.page_no,
        element_kind,
        feature,
        original_filename: record.original_filename.clone(),
    }
}
