//! Error kinds surfaced by retrieval operations.
//!
//! Every variant is a value the caller can inspect; none of them abort the
//! process. An uninitialized index aborts only the call that hit it.

use thiserror::Error;

/// Errors that can occur while chunking, searching, or ranking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrievalError {
    /// A required component (keyword index, corpus, vector index) was not
    /// loaded before the call.
    #[error("{0} not initialized")]
    NotInitialized(&'static str),
    /// The supplied regex could not be compiled.
    #[error("Invalid regex pattern: {0}")]
    Pattern(String),
    /// The external vector index failed to answer.
    #[error("Vector index error: {0}")]
    VectorIndex(String),
    /// The external embedding provider failed.
    #[error("Embedding error: {0}")]
    Embedding(String),
    /// A chunk already carries an embedding vector.
    #[error("Chunk {0} already has an embedding attached")]
    EmbeddingAlreadyAttached(String),
    /// A caller-supplied argument was out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
