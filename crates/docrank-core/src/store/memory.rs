//! In-memory [`VectorIndex`] implementation for tests and small corpora.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`. Search is brute-force
//! cosine distance over every stored vector. Text queries are rejected:
//! this index never embeds anything itself.

use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::ChunkMetadata;

use super::{MetadataFilter, VectorHit, VectorIndex, VectorQuery};

struct StoredRow {
    chunk_id: String,
    vector: Vec<f32>,
    content: String,
    metadata: ChunkMetadata,
}

/// Brute-force cosine index.
///
/// The first inserted vector fixes the dimensionality; later batches with a
/// different length are rejected whole.
pub struct InMemoryVectorIndex {
    rows: RwLock<Vec<StoredRow>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("vector index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn query(
        &self,
        query: VectorQuery<'_>,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>> {
        let query_vec = match query {
            VectorQuery::Vector(v) => v,
            VectorQuery::Text(_) => bail!("in-memory index requires a query vector"),
        };
        let rows = self.rows.read().map_err(poisoned)?;
        if let Some(first) = rows.first() {
            if first.vector.len() != query_vec.len() {
                bail!(
                    "query has {} dimensions, index has {}",
                    query_vec.len(),
                    first.vector.len()
                );
            }
        }

        let mut hits: Vec<VectorHit> = rows
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| VectorHit {
                chunk_id: r.chunk_id.clone(),
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(query_vec, &r.vector) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        let n = ids.len();
        if vectors.len() != n || documents.len() != n || metadatas.len() != n {
            bail!(
                "batch length mismatch: {} ids, {} vectors, {} documents, {} metadatas",
                n,
                vectors.len(),
                documents.len(),
                metadatas.len()
            );
        }

        let mut rows = self.rows.write().map_err(poisoned)?;
        let dims = rows
            .first()
            .map(|r| r.vector.len())
            .or_else(|| vectors.first().map(Vec::len));
        if let Some(dims) = dims {
            if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
                bail!(
                    "vector for {} has {} dimensions, expected {}",
                    ids[i],
                    v.len(),
                    dims
                );
            }
        }

        for i in 0..n {
            let row = StoredRow {
                chunk_id: ids[i].clone(),
                vector: vectors[i].clone(),
                content: documents[i].clone(),
                metadata: metadatas[i].clone(),
            };
            match rows.iter_mut().find(|r| r.chunk_id == ids[i]) {
                Some(existing) => *existing = row,
                None => rows.push(row),
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().map_err(poisoned)?.len())
    }
}
