//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the contract with the external
//! approximate-nearest-neighbor store: it answers similarity queries and
//! accepts batches of embedded chunks. Distances are assumed to be cosine
//! distances, so `similarity = 1 - distance`.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::chunk::TokenEstimator;
use crate::models::{Chunk, ChunkMetadata, ContentType, SearchCandidate};

/// What to search the index with.
#[derive(Debug, Clone, Copy)]
pub enum VectorQuery<'a> {
    /// Raw query text, for indexes that embed queries themselves.
    Text(&'a str),
    /// A pre-computed query embedding.
    Vector(&'a [f32]),
}

/// Equality constraints on chunk metadata; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataFilter {
    pub content_type: Option<ContentType>,
    pub is_code: Option<bool>,
    pub document_url: Option<String>,
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.content_type.map_or(true, |ct| metadata.content_type == ct)
            && self.is_code.map_or(true, |c| metadata.is_code == c)
            && self
                .document_url
                .as_deref()
                .map_or(true, |url| metadata.document_url == url)
    }
}

/// One row returned by [`VectorIndex::query`], nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub distance: f64,
}

impl VectorHit {
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }

    /// Rebuild the chunk as a fusion candidate.
    ///
    /// `token_count` is recomputed from the returned content rather than
    /// trusted from stored metadata.
    pub fn into_candidate(self, estimator: &TokenEstimator) -> SearchCandidate {
        let similarity = self.similarity();
        let token_count = estimator.count(&self.content);
        let mut metadata = self.metadata;
        metadata.token_count = token_count;
        SearchCandidate::new(
            Chunk {
                chunk_id: self.chunk_id,
                content: self.content,
                metadata,
                token_count,
                embedding: None,
            },
            similarity,
        )
    }
}

/// External vector index contract.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`query`](VectorIndex::query) | Nearest neighbours of a text or vector |
/// | [`add`](VectorIndex::add) | Insert a batch of embedded chunks |
/// | [`count`](VectorIndex::count) | Number of stored rows |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` hits ordered by ascending distance.
    async fn query(
        &self,
        query: VectorQuery<'_>,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>>;

    /// Insert a batch. The four slices are parallel and must have equal
    /// lengths. A failed call stores nothing from the batch.
    async fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}
