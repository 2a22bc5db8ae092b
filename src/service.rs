//! Ingestion and query orchestration.
//!
//! Ingest: extract pages, embed their texts, build the index, persist it under the
//! source's derived name. Search: load the artifact, embed the query, scan the index and
//! map positions back to pages.

use crate::embed::Embedder;
use crate::error::{RetrievalError, RetrievalResult};
use crate::extract::{extractor_for_source, TextExtractor};
use crate::index::VectorIndex;
use crate::page::{Page, SearchResponse, SearchResult};
use crate::source::artifact_name;
use crate::store::{ArtifactLocator, IndexStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub locator: ArtifactLocator,
    pub page_count: usize,
    pub dimension: usize,
}

pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, store: IndexStore) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Extract, embed and persist one document. The extractor is chosen from `source`.
    pub fn ingest(&self, bytes: &[u8], source: &str) -> RetrievalResult<IngestReport> {
        let extractor = extractor_for_source(source);
        self.ingest_with(extractor.as_ref(), bytes, source)
    }

    pub fn ingest_with(
        &self,
        extractor: &dyn TextExtractor,
        bytes: &[u8],
        source: &str,
    ) -> RetrievalResult<IngestReport> {
        // Fail on an unusable source before doing any work
        artifact_name(source)?;

        let start = Instant::now();
        let pages = extractor.extract(bytes)?;
        debug!(
            target: "ragify::service",
            "{} extractor produced {} pages from {source} in {:?}",
            extractor.name(),
            pages.len(),
            start.elapsed()
        );
        self.ingest_pages(pages, source)
    }

    /// Embed and persist pages that were already extracted.
    pub fn ingest_pages(&self, pages: Vec<Page>, source: &str) -> RetrievalResult<IngestReport> {
        let name = artifact_name(source)?;
        if pages.is_empty() {
            warn!(target: "ragify::service", "{source} has no extractable text; saving an empty index");
        }

        let start = Instant::now();
        let texts: Vec<&str> = pages.iter().map(|page| page.text.as_str()).collect();
        let vectors = self.embedder.embed(&texts)?;
        if vectors.len() != pages.len() {
            return Err(RetrievalError::Embedding(format!(
                "embedder returned {} vectors for {} pages",
                vectors.len(),
                pages.len()
            )));
        }
        debug!(target: "ragify::service", "embedded {} pages in {:?}", pages.len(), start.elapsed());

        let dimension = self.embedder.dimension();
        let index = VectorIndex::with_dimension(dimension, vectors)?;
        let locator = self
            .store
            .save(&name, &index, &pages, self.embedder.model_id())?;

        info!(
            target: "ragify::service",
            "ingested {source} as '{name}' ({} pages)",
            pages.len()
        );
        Ok(IngestReport {
            locator,
            page_count: pages.len(),
            dimension,
        })
    }

    /// The `k` pages closest to `query`, ascending by squared L2 distance.
    pub fn search(
        &self,
        query: &str,
        locator: &ArtifactLocator,
        k: usize,
    ) -> RetrievalResult<SearchResponse> {
        let artifact = self.store.load(locator)?;

        if artifact.model_id != self.embedder.model_id() {
            warn!(
                target: "ragify::service",
                "artifact '{}' was built with model '{}' but queries use '{}'",
                locator.name,
                artifact.model_id,
                self.embedder.model_id()
            );
        }

        let start = Instant::now();
        let query_vector = self.embedder.embed_one(query)?;
        let neighbors = artifact.index.search(&query_vector, k)?;
        debug!(
            target: "ragify::service",
            "searched {} vectors for {query:?} in {:?}",
            artifact.index.len(),
            start.elapsed()
        );

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let page = artifact.pages.get(neighbor.position).ok_or_else(|| {
                RetrievalError::corrupt(
                    locator.meta_path(),
                    format!("no page for vector position {}", neighbor.position),
                )
            })?;
            results.push(SearchResult {
                page_number: page.page_number,
                text: page.text.clone(),
                similarity_score: neighbor.distance,
            });
        }

        Ok(SearchResponse {
            query: query.to_string(),
            record_count: artifact.index.len(),
            results,
        })
    }
}
