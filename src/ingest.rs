//! Ingestion pipeline: documents → chunks → embeddings → vector index.
//!
//! Chunking is pure and synchronous. Embedding and indexing talk to the
//! external collaborators through [`EmbeddingProvider`] and [`VectorIndex`].
//! Indexing is batched; a batch the index rejects is retried one chunk at
//! a time so a single bad row does not lose its neighbours.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use docrank_core::chunk::{chunk_document, TokenEstimator};
use docrank_core::embedding::EmbeddingProvider;
use docrank_core::models::{Chunk, RawDocument};
use docrank_core::store::VectorIndex;
use docrank_core::RetrievalError;

use crate::config::Config;

/// Summary of one [`index_chunks`] or [`ingest`] run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    /// Batches submitted to the vector index.
    pub batches: usize,
    /// Chunks the index accepted.
    pub indexed: usize,
    /// Chunks without an embedding, never submitted.
    pub skipped: usize,
    /// Chunks rejected even when retried on their own.
    pub failed_ids: Vec<String>,
}

/// Chunk every document in order.
pub fn chunk_corpus(documents: &[RawDocument], config: &Config) -> Vec<Chunk> {
    let options = config.chunking.options();
    let estimator = config.chunking.estimator();
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|doc| chunk_document(doc, &options, &estimator))
        .collect();
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "corpus chunked"
    );
    chunks
}

/// Embed chunks that do not have a vector yet, `batch_size` texts per call.
///
/// Returns the number of chunks embedded. A provider failure aborts the
/// run; chunks embedded by earlier batches keep their vectors.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    chunks: &mut [Chunk],
    batch_size: usize,
) -> Result<usize, RetrievalError> {
    let mut pending: Vec<&mut Chunk> = chunks.iter_mut().filter(|c| c.embedding.is_none()).collect();
    let mut embedded = 0;

    for batch in pending.chunks_mut(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = provider
            .embed_batch(&texts)
            .await
            .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))?;
        if vectors.len() != batch.len() {
            return Err(RetrievalError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        for (chunk, vector) in batch.iter_mut().zip(vectors) {
            chunk.attach_embedding(vector)?;
            embedded += 1;
        }
        debug!(model = provider.model_name(), embedded, "embedding batch done");
    }
    Ok(embedded)
}

/// Add embedded chunks to the vector index in batches.
///
/// Never fails as a whole: rejected batches are retried item by item and
/// items that still fail are logged and listed in the report.
pub async fn index_chunks(
    index: &dyn VectorIndex,
    chunks: &[Chunk],
    batch_size: usize,
) -> IngestReport {
    let mut report = IngestReport {
        chunks: chunks.len(),
        ..Default::default()
    };
    let ready: Vec<&Chunk> = chunks.iter().filter(|c| c.embedding.is_some()).collect();
    report.skipped = chunks.len() - ready.len();

    for batch in ready.chunks(batch_size.max(1)) {
        report.batches += 1;
        match add_batch(index, batch).await {
            Ok(()) => report.indexed += batch.len(),
            Err(e) => {
                warn!(
                    size = batch.len(),
                    error = %format!("{:#}", e),
                    "batch insert failed, retrying item by item"
                );
                for chunk in batch {
                    match add_batch(index, std::slice::from_ref(chunk)).await {
                        Ok(()) => report.indexed += 1,
                        Err(e) => {
                            warn!(
                                chunk_id = %chunk.chunk_id,
                                error = %format!("{:#}", e),
                                "chunk insert failed, skipped"
                            );
                            report.failed_ids.push(chunk.chunk_id.clone());
                        }
                    }
                }
            }
        }
    }

    info!(
        indexed = report.indexed,
        failed = report.failed_ids.len(),
        skipped = report.skipped,
        batches = report.batches,
        "chunks indexed"
    );
    report
}

async fn add_batch(index: &dyn VectorIndex, batch: &[&Chunk]) -> Result<()> {
    let ids: Vec<String> = batch.iter().map(|c| c.chunk_id.clone()).collect();
    let vectors: Vec<Vec<f32>> = batch
        .iter()
        .map(|c| c.embedding.clone().unwrap_or_default())
        .collect();
    let documents: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
    let metadatas = batch.iter().map(|c| c.metadata.clone()).collect::<Vec<_>>();
    index.add(&ids, &vectors, &documents, &metadatas).await
}

/// Chunk, embed, and index a corpus end to end.
pub async fn ingest(
    config: &Config,
    documents: &[RawDocument],
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
) -> Result<(Vec<Chunk>, IngestReport), RetrievalError> {
    let mut chunks = chunk_corpus(documents, config);
    let embedded = embed_chunks(provider, &mut chunks, config.ingest.batch_size).await?;
    let mut report = index_chunks(index, &chunks, config.ingest.batch_size).await;
    report.documents = documents.len();
    report.embedded = embedded;
    Ok((chunks, report))
}

/// Write chunks as a pretty-printed JSON array in the persisted schema.
pub fn save_chunks(path: &Path, chunks: &[Chunk]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(chunks)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write chunks: {}", path.display()))?;
    info!(path = %path.display(), chunks = chunks.len(), "chunks saved");
    Ok(())
}

/// Read a chunk array written by [`save_chunks`].
///
/// `token_count` is recomputed from the content with `estimator`.
pub fn load_chunks(path: &Path, estimator: &TokenEstimator) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunks: {}", path.display()))?;
    let mut chunks: Vec<Chunk> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse chunks: {}", path.display()))?;
    for chunk in &mut chunks {
        let tokens = estimator.count(&chunk.content);
        chunk.token_count = tokens;
        chunk.metadata.token_count = tokens;
    }
    Ok(chunks)
}
