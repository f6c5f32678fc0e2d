//! # docrank core
//!
//! Runtime-free retrieval logic for docrank: the data model, the chunking
//! engine, document profiling, query analysis, the keyword index (BM25 and
//! literal/regex search), relevance fusion and token-budgeted selection,
//! and context assembly.
//!
//! This crate contains no tokio, filesystem I/O, or other native-only
//! dependencies. Vector search and embedding generation are reached only
//! through the [`store::VectorIndex`] and [`embedding::EmbeddingProvider`]
//! traits.

pub mod chunk;
pub mod context;
pub mod doc_map;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod keyword;
pub mod models;
pub mod profile;
pub mod query;
pub mod store;

pub use error::RetrievalError;
