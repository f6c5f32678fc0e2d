//! # docrank
//!
//! Chunking and hybrid retrieval for crawled documentation corpora.
//!
//! docrank turns crawled pages into addressable chunks, indexes them for
//! exact, regex, and BM25-ranked keyword search, and answers natural
//! language queries by fusing vector-similarity candidates with keyword
//! and query-intent signals into a token-bounded context block.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Crawl JSON  │──▶│ Chunk+Embed │──▶│ VectorIndex  │
//! │  (corpus)   │   │  (ingest)   │   │  (external)  │
//! └──────┬──────┘   └─────────────┘   └──────┬───────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                   ┌────────────────┐
//! │ KeywordIndex│──────────────────▶│ RetrievalEngine│──▶ ToolContext
//! │ BM25 + grep │                   │ fuse + budget  │
//! └─────────────┘                   └────────────────┘
//! ```
//!
//! The retrieval logic itself lives in [`docrank_core`]; this crate adds
//! configuration, logging, corpus loading, ingestion, and the session and
//! tool layers.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`corpus`] | Loading crawler output from disk |
//! | [`ingest`] | Chunking, embedding, and vector indexing |
//! | [`stats`] | Corpus and chunk statistics |
//! | [`engine`] | Retrieval session and hybrid retrieval |
//! | [`tools`] | Formatted-text tool surface |

pub mod config;
pub mod corpus;
pub mod engine;
pub mod ingest;
pub mod logging;
pub mod stats;
pub mod tools;
