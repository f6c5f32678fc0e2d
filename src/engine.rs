//! Retrieval session object.
//!
//! [`RetrievalEngine`] owns everything one retrieval session needs: the
//! configuration, the external vector index, an optional embedding
//! provider for query vectors, and the currently loaded keyword index.
//! Callers create one engine and pass it (usually behind an `Arc`) to every
//! retrieval call; there is no global state.
//!
//! # Hybrid retrieval
//!
//! ```text
//!        query ──► analyze_query
//!          │
//!    ┌─────┴───────────────┐
//!    ▼                     ▼
//! vector index         BM25 ranked search
//! (over-fetch,         (spawn_blocking)
//!  optional timeout)       │
//!    └─────────┬───────────┘
//!              ▼
//!  threshold → keyword filter → score → diversity → budget
//!              ▼
//!          assemble → Retrieval
//! ```
//!
//! The keyword index is built out of band by [`RetrievalEngine::load_corpus`]
//! and swapped in under a write lock; readers hold an `Arc` clone, so a
//! rebuild never mutates a structure a query is reading.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use docrank_core::context::{assemble, AssembledContext};
use docrank_core::doc_map::DocumentMap;
use docrank_core::embedding::EmbeddingProvider;
use docrank_core::fusion::{fuse, overfetch_size, ScoredCandidate};
use docrank_core::keyword::KeywordIndex;
use docrank_core::models::{QueryAnalysis, RawDocument, SearchCandidate};
use docrank_core::query::analyze_query;
use docrank_core::store::{MetadataFilter, VectorIndex, VectorQuery};
use docrank_core::RetrievalError;

use crate::config::Config;

/// Per-call overrides for [`RetrievalEngine::hybrid_retrieve`].
///
/// `None` fields fall back to the engine configuration.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub max_chunks: Option<usize>,
    pub max_tokens: Option<usize>,
    pub similarity_threshold: Option<f64>,
    /// Literal filter terms; defaults to the analysed query keywords.
    pub keyword_filters: Option<Vec<String>>,
    pub metadata_filter: Option<MetadataFilter>,
    /// Restricts the BM25 document hits.
    pub doc_ids: Option<Vec<String>>,
    /// Leave `Retrieval::keyword_hits` empty and skip the BM25 search.
    pub skip_keyword_hits: bool,
    /// Wall-clock budget for the vector query.
    pub timeout: Option<Duration>,
}

/// Outcome of one hybrid retrieval call.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    /// Formatted context and diagnostics.
    pub context: AssembledContext,
    pub analysis: QueryAnalysis,
    #[serde(skip)]
    pub selected: Vec<ScoredCandidate>,
    /// BM25 `(doc_id, score)` pairs with a positive score, best first.
    pub keyword_hits: Vec<(String, f64)>,
    pub keyword_fallback: bool,
    /// The vector query did not answer within the wall-clock budget.
    pub timed_out: bool,
}

pub struct RetrievalEngine {
    config: Arc<Config>,
    keyword: RwLock<Option<Arc<KeywordIndex>>>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl RetrievalEngine {
    pub fn new(config: Config, vectors: Arc<dyn VectorIndex>) -> Self {
        Self {
            config: Arc::new(config),
            keyword: RwLock::new(None),
            vectors,
            embedder: None,
        }
    }

    /// Embed queries with `embedder` instead of sending raw text to the
    /// vector index.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    // ═══════════════════════════════════════════════════════════════════
    // Keyword index lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Build the document map and keyword index for `documents` and make
    /// them current. Replaces any previously loaded corpus.
    pub fn load_corpus(&self, documents: &[RawDocument]) -> usize {
        self.load_document_map(DocumentMap::build(documents))
    }

    /// Make a prebuilt document map current. Returns the document count.
    pub fn load_document_map(&self, map: DocumentMap) -> usize {
        let index = Arc::new(KeywordIndex::build(map, self.config.keyword.bm25_params()));
        let count = index.len();
        let mut slot = self.keyword.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(index);
        info!(documents = count, "keyword index loaded");
        count
    }

    /// Drop the loaded corpus. Later keyword calls fail with
    /// [`RetrievalError::NotInitialized`].
    pub fn unload_corpus(&self) {
        let mut slot = self.keyword.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    /// The current keyword index.
    pub fn keyword_index(&self) -> Result<Arc<KeywordIndex>, RetrievalError> {
        self.keyword
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(RetrievalError::NotInitialized("keyword index"))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Hybrid retrieval
    // ═══════════════════════════════════════════════════════════════════

    /// Retrieve, rank, and assemble context for `query`.
    ///
    /// The vector query and the BM25 search run concurrently. When the
    /// vector query outlives the wall-clock budget the engine stops
    /// waiting and returns the empty-result context with `timed_out` set.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::NotInitialized`] when no corpus is loaded.
    /// - [`RetrievalError::Embedding`] / [`RetrievalError::VectorIndex`]
    ///   when a collaborator fails.
    #[instrument(skip(self, opts))]
    pub async fn hybrid_retrieve(
        &self,
        query: &str,
        opts: RetrieveOptions,
    ) -> Result<Retrieval, RetrievalError> {
        let keyword_index = self.keyword_index()?;
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidInput("query must not be empty".into()));
        }

        let analysis = analyze_query(query);
        let retrieval = &self.config.retrieval;
        let params =
            retrieval.fusion_params(opts.max_chunks, opts.max_tokens, opts.similarity_threshold);
        let fetch = overfetch_size(
            params.max_chunks,
            retrieval.overfetch_factor,
            retrieval.overfetch_cap,
        );
        let timeout = opts
            .timeout
            .or_else(|| retrieval.timeout_ms.map(Duration::from_millis));
        debug!(intent = ?analysis.intent, fetch, "retrieving");

        let vector_search = self.vector_candidates(query, fetch, opts.metadata_filter.as_ref());
        let vector_search = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, vector_search).await.ok(),
                None => Some(vector_search.await),
            }
        };
        let keyword_search = async {
            if opts.skip_keyword_hits {
                return Vec::new();
            }
            keyword_hits(
                keyword_index,
                query.to_string(),
                opts.doc_ids.clone(),
                self.config.keyword.top_k,
            )
            .await
        };
        let (vector_result, keyword_hits) = tokio::join!(vector_search, keyword_search);

        let (candidates, timed_out) = match vector_result {
            Some(result) => (result?, false),
            None => {
                warn!(?timeout, "vector query timed out");
                (Vec::new(), true)
            }
        };

        let filters = opts
            .keyword_filters
            .unwrap_or_else(|| analysis.keywords.clone());
        let outcome = fuse(candidates, &analysis, &filters, &params);
        let context = assemble(&outcome.selected);

        info!(
            chunks = context.diagnostics.chunks_found,
            tokens = context.diagnostics.total_tokens,
            keyword_hits = keyword_hits.len(),
            timed_out,
            "retrieval finished"
        );
        Ok(Retrieval {
            context,
            analysis,
            selected: outcome.selected,
            keyword_hits,
            keyword_fallback: outcome.keyword_fallback,
            timed_out,
        })
    }

    async fn vector_candidates(
        &self,
        query: &str,
        fetch: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchCandidate>, RetrievalError> {
        let query_vector = match &self.embedder {
            Some(embedder) => Some(
                embedder
                    .embed(query)
                    .await
                    .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))?,
            ),
            None => None,
        };
        let vector_query = match &query_vector {
            Some(v) => VectorQuery::Vector(v),
            None => VectorQuery::Text(query),
        };
        let hits = self
            .vectors
            .query(vector_query, fetch, filter)
            .await
            .map_err(|e| RetrievalError::VectorIndex(format!("{:#}", e)))?;

        let estimator = self.config.chunking.estimator();
        Ok(hits
            .into_iter()
            .map(|hit| hit.into_candidate(&estimator))
            .collect())
    }
}

/// BM25 search on the blocking pool; zero-score documents are dropped.
async fn keyword_hits(
    index: Arc<KeywordIndex>,
    query: String,
    doc_ids: Option<Vec<String>>,
    top_k: usize,
) -> Vec<(String, f64)> {
    let result = tokio::task::spawn_blocking(move || {
        index.ranked_search(&query, doc_ids.as_deref(), top_k)
    })
    .await;
    match result {
        Ok(hits) => hits.into_iter().filter(|(_, score)| *score > 0.0).collect(),
        Err(e) => {
            warn!(error = %e, "ranked keyword search failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrank_core::store::memory::InMemoryVectorIndex;

    #[tokio::test]
    async fn test_not_initialized_until_loaded() {
        let engine = RetrievalEngine::new(Config::default(), Arc::new(InMemoryVectorIndex::new()));
        assert_eq!(
            engine.keyword_index().unwrap_err(),
            RetrievalError::NotInitialized("keyword index")
        );
        let err = engine
            .hybrid_retrieve("what is a kernel", RetrieveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "keyword index not initialized");

        let docs = vec![RawDocument {
            url: "https://docs.acme.dev/a".to_string(),
            title: "A".to_string(),
            content: "kernels everywhere".to_string(),
            code_blocks: vec![],
            headers: vec![],
            word_count: 2,
            content_hash: String::new(),
        }];
        assert_eq!(engine.load_corpus(&docs), 1);
        assert_eq!(engine.keyword_index().unwrap().len(), 1);

        engine.unload_corpus();
        assert!(engine.keyword_index().is_err());
    }
}
