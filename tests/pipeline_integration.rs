//! Integration tests for the offline pipeline: configuration, corpus
//! loading, chunking, ingestion into a vector index, chunk persistence,
//! and statistics.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use async_trait::async_trait;
use docrank::config::{load_config, Config};
use docrank::corpus::load_corpus;
use docrank::ingest::{chunk_corpus, embed_chunks, index_chunks, load_chunks, save_chunks};
use docrank::stats::ProcessingStats;
use docrank_core::chunk::{chunk_document, ChunkingOptions, TokenEstimator};
use docrank_core::embedding::EmbeddingProvider;
use docrank_core::models::{ChunkMetadata, Header, RawDocument};
use docrank_core::store::memory::InMemoryVectorIndex;
use docrank_core::store::{MetadataFilter, VectorHit, VectorIndex, VectorQuery};
use proptest::prelude::*;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

struct WordCountEmbedder;

#[async_trait]
impl EmbeddingProvider for WordCountEmbedder {
    fn model_name(&self) -> &str {
        "word-count"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.split_whitespace().count() as f32, 1.0])
    }
}

/// Rejects any batch that contains a poisoned id.
struct FlakyIndex {
    inner: InMemoryVectorIndex,
    poisoned: HashSet<String>,
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn query(
        &self,
        query: VectorQuery<'_>,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>> {
        self.inner.query(query, top_k, filter).await
    }

    async fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        documents: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        if let Some(bad) = ids.iter().find(|id| self.poisoned.contains(*id)) {
            bail!("rejected row {}", bad);
        }
        self.inner.add(ids, vectors, documents, metadatas).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

fn header(level: u8, text: &str) -> Header {
    Header {
        level,
        text: text.to_string(),
        anchor_id: None,
    }
}

fn prose(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| {
            format!(
                "The {} section explains detail number {} with enough words to matter.",
                topic, i
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn scenario_document() -> RawDocument {
    let code = "def bell():\n    q = qvector(2)\n    h(q[0])\n    x.ctrl(q[0], q[1])";
    let content = format!(
        "Intro\n{}\n{}\nUsage\n{}",
        prose("intro", 6),
        code,
        prose("usage", 6)
    );
    RawDocument {
        url: "https://docs.acme.dev/guides/bell.html".to_string(),
        title: "Bell States".to_string(),
        word_count: content.split_whitespace().count(),
        content,
        code_blocks: vec![code.to_string()],
        headers: vec![header(2, "Intro"), header(2, "Usage")],
        content_hash: "bell".to_string(),
    }
}

fn write_json(dir: &Path, rel: &str, docs: &[RawDocument]) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(docs).unwrap()).unwrap();
}

// ─── Configuration & Corpus ─────────────────────────────────────────

#[test]
fn test_config_file_drives_corpus_loading() {
    let tmp = TempDir::new().unwrap();
    let raw = tmp.path().join("raw");

    let long = RawDocument {
        url: "https://docs.acme.dev/guide/kernels.html".to_string(),
        title: "Kernels".to_string(),
        content: prose("kernel", 8),
        code_blocks: vec![],
        headers: vec![],
        word_count: 96,
        content_hash: String::new(),
    };
    let search_page = RawDocument {
        url: "https://docs.acme.dev/search.html".to_string(),
        title: "Search".to_string(),
        ..long.clone()
    };
    let short = RawDocument {
        url: "https://docs.acme.dev/guide/short.html".to_string(),
        title: "Short".to_string(),
        content: "Too short.".to_string(),
        word_count: 2,
        ..long.clone()
    };
    write_json(&raw, "site/pages.json", &[long, search_page, short]);
    write_json(&raw, "archive/old.json", &[scenario_document()]);

    let config_path = tmp.path().join("docrank.toml");
    fs::write(
        &config_path,
        format!(
            "[corpus]\nroot = \"{}\"\nexclude_globs = [\"archive/**\"]\n\n[chunking]\nchunk_token_size = 64\ntoken_overlap = 8\n",
            raw.display()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.chunking.chunk_token_size, 64);
    let docs = load_corpus(&config.corpus).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].title, "Kernels");
}

#[test]
fn test_missing_config_file_reports_path() {
    let err = load_config(Path::new("/nonexistent/docrank.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

// ─── Chunking & Ingestion ───────────────────────────────────────────

#[test]
fn test_sections_and_code_block_chunks() {
    let mut config = Config::default();
    config.chunking.chunk_token_size = 50;
    config.chunking.token_overlap = 10;

    let chunks = chunk_corpus(&[scenario_document()], &config);
    let text: Vec<_> = chunks.iter().filter(|c| !c.metadata.is_code).collect();
    let code: Vec<_> = chunks.iter().filter(|c| c.metadata.is_code).collect();

    assert!(text.len() >= 2);
    assert_eq!(code.len(), 1);
    assert_eq!(code[0].metadata.code_block_index, Some(0));
    let sections: HashSet<_> = text
        .iter()
        .filter_map(|c| c.metadata.section_title.as_deref())
        .collect();
    assert!(sections.contains("Intro") && sections.contains("Usage"));
    assert!(text.iter().all(|c| !c.content.contains("qvector")));
}

#[tokio::test]
async fn test_partial_batch_failure_retries_item_by_item() {
    let config = Config::default();
    let mut chunks = chunk_corpus(&[scenario_document()], &config);
    assert!(chunks.len() >= 2);
    embed_chunks(&WordCountEmbedder, &mut chunks, 10).await.unwrap();

    let poisoned = chunks[1].chunk_id.clone();
    let index = FlakyIndex {
        inner: InMemoryVectorIndex::new(),
        poisoned: HashSet::from([poisoned.clone()]),
    };
    let report = index_chunks(&index, &chunks, 100).await;

    assert_eq!(report.batches, 1);
    assert_eq!(report.failed_ids, vec![poisoned]);
    assert_eq!(report.indexed, chunks.len() - 1);
    assert_eq!(index.count().await.unwrap(), chunks.len() - 1);
}

#[test]
fn test_chunk_persistence_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("processed/chunks.json");
    let config = Config::default();
    let chunks = chunk_corpus(&[scenario_document()], &config);

    save_chunks(&path, &chunks).unwrap();
    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let first = &raw[0];
    for key in ["chunk_id", "content", "metadata", "token_count"] {
        assert!(first.get(key).is_some(), "missing {}", key);
    }

    let loaded = load_chunks(&path, &config.chunking.estimator()).unwrap();
    assert_eq!(loaded, chunks);
}

#[test]
fn test_stats_over_chunked_corpus() {
    let config = Config::default();
    let docs = vec![scenario_document()];
    let chunks = chunk_corpus(&docs, &config);
    let stats = ProcessingStats::collect(&docs, &chunks);

    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, chunks.len());
    assert_eq!(stats.code_chunks, 1);
    assert_eq!(stats.text_chunks + stats.code_chunks, stats.chunks);
    assert_eq!(
        stats.total_tokens,
        chunks.iter().map(|c| c.token_count).sum::<usize>()
    );
    assert_eq!(stats.by_category["guides"], chunks.len());
}

// ─── Properties ─────────────────────────────────────────────────────

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,8}", 1..12).prop_map(|words| format!("{}.", words.join(" ")))
}

proptest! {
    #[test]
    fn prop_chunks_ordered_and_unique(
        sentences in prop::collection::vec(sentence(), 0..40),
        size in 8usize..80,
    ) {
        let content = sentences.join(" ");
        let doc = RawDocument {
            url: "https://docs.acme.dev/p.html".to_string(),
            title: "P".to_string(),
            word_count: content.split_whitespace().count(),
            content,
            code_blocks: vec![],
            headers: vec![],
            content_hash: String::new(),
        };
        let opts = ChunkingOptions {
            chunk_token_size: size,
            token_overlap: size / 4,
            separate_code_blocks: true,
        };
        let estimator = TokenEstimator::default();
        let chunks = chunk_document(&doc, &opts, &estimator);

        let mut ids = HashSet::new();
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.metadata.chunk_index, i);
            prop_assert!(ids.insert(chunk.chunk_id.clone()));
            prop_assert_eq!(chunk.token_count, estimator.count(&chunk.content));
            prop_assert!(chunk.content.trim().chars().count() >= 20);
        }
        prop_assert_eq!(chunks, chunk_document(&doc, &opts, &estimator));
    }
}
