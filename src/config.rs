//! TOML configuration.
//!
//! Every section and field is optional; omitted values take the defaults
//! below, so an empty file is a valid configuration. [`load_config`]
//! validates ranges after parsing.
//!
//! ```toml
//! [corpus]
//! root = "data/raw"
//! include_globs = ["**/*.json"]
//!
//! [chunking]
//! chunk_token_size = 512
//! token_overlap = 50
//! tokenizer = "cl100k_base"  # or "words"
//!
//! [retrieval]
//! similarity_threshold = 0.5
//! max_chunks = 10
//! max_tokens = 30000
//! timeout_ms = 5000
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docrank_core::chunk::{ChunkingOptions, TokenEstimator, Tokenizer};
use docrank_core::fusion::{DiversityParams, FusionParams};
use docrank_core::keyword::{Bm25Params, GrepOptions};
use docrank_core::profile::RelevanceFilter;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub keyword: KeywordConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Clean documents and drop navigation/index pages before chunking.
    #[serde(default = "default_true")]
    pub filter_documents: bool,
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    #[serde(default = "default_skip_patterns")]
    pub skip_patterns: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            filter_documents: true,
            min_word_count: default_min_word_count(),
            skip_patterns: default_skip_patterns(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("data/raw")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_min_word_count() -> usize {
    50
}
fn default_skip_patterns() -> Vec<String> {
    RelevanceFilter::default().skip_patterns
}

impl CorpusConfig {
    pub fn relevance_filter(&self) -> RelevanceFilter {
        RelevanceFilter {
            min_word_count: self.min_word_count,
            skip_patterns: self.skip_patterns.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_token_size")]
    pub chunk_token_size: usize,
    #[serde(default = "default_token_overlap")]
    pub token_overlap: usize,
    #[serde(default = "default_true")]
    pub separate_code_blocks: bool,
    /// `cl100k_base` (default) or `words`.
    #[serde(default)]
    pub tokenizer: Tokenizer,
    /// Multiplier for the word-count token estimate.
    #[serde(default = "default_tokens_per_word")]
    pub tokens_per_word: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_token_size: default_chunk_token_size(),
            token_overlap: default_token_overlap(),
            separate_code_blocks: true,
            tokenizer: Tokenizer::default(),
            tokens_per_word: default_tokens_per_word(),
        }
    }
}

fn default_chunk_token_size() -> usize {
    512
}
fn default_token_overlap() -> usize {
    50
}
fn default_tokens_per_word() -> f64 {
    1.3
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_token_size: self.chunk_token_size,
            token_overlap: self.token_overlap,
            separate_code_blocks: self.separate_code_blocks,
        }
    }

    pub fn estimator(&self) -> TokenEstimator {
        TokenEstimator {
            tokenizer: self.tokenizer,
            tokens_per_word: self.tokens_per_word,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_overfetch_cap")]
    pub overfetch_cap: usize,
    #[serde(default)]
    pub diversity: bool,
    #[serde(default = "default_diversity_threshold")]
    pub diversity_threshold: f64,
    #[serde(default)]
    pub diversity_max_kept: Option<usize>,
    /// Wall-clock budget for one retrieval call.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_chunks: default_max_chunks(),
            max_tokens: default_max_tokens(),
            overfetch_factor: default_overfetch_factor(),
            overfetch_cap: default_overfetch_cap(),
            diversity: false,
            diversity_threshold: default_diversity_threshold(),
            diversity_max_kept: None,
            timeout_ms: None,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.5
}
fn default_max_chunks() -> usize {
    10
}
fn default_max_tokens() -> usize {
    30_000
}
fn default_overfetch_factor() -> usize {
    3
}
fn default_overfetch_cap() -> usize {
    50
}
fn default_diversity_threshold() -> f64 {
    0.8
}

impl RetrievalConfig {
    /// Fusion parameters with per-call overrides applied.
    pub fn fusion_params(
        &self,
        max_chunks: Option<usize>,
        max_tokens: Option<usize>,
        similarity_threshold: Option<f64>,
    ) -> FusionParams {
        FusionParams {
            similarity_threshold: similarity_threshold.unwrap_or(self.similarity_threshold),
            max_chunks: max_chunks.unwrap_or(self.max_chunks),
            max_tokens: max_tokens.unwrap_or(self.max_tokens),
            diversity: self.diversity.then(|| DiversityParams {
                threshold: self.diversity_threshold,
                max_kept: self.diversity_max_kept,
            }),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordConfig {
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    #[serde(default = "default_max_matches_per_doc")]
    pub max_matches_per_doc: usize,
    #[serde(default = "default_max_total_matches")]
    pub max_total_matches: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
    /// Results shown by the formatted tool output.
    #[serde(default = "default_max_display")]
    pub max_display: usize,
    #[serde(default = "default_k1")]
    pub k1: f64,
    #[serde(default = "default_b")]
    pub b: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            context_chars: default_context_chars(),
            max_matches_per_doc: default_max_matches_per_doc(),
            max_total_matches: default_max_total_matches(),
            top_k: default_top_k(),
            max_examples: default_max_examples(),
            max_display: default_max_display(),
            k1: default_k1(),
            b: default_b(),
            epsilon: default_epsilon(),
        }
    }
}

fn default_context_chars() -> usize {
    150
}
fn default_max_matches_per_doc() -> usize {
    3
}
fn default_max_total_matches() -> usize {
    15
}
fn default_top_k() -> usize {
    10
}
fn default_max_examples() -> usize {
    10
}
fn default_max_display() -> usize {
    10
}
fn default_k1() -> f64 {
    1.5
}
fn default_b() -> f64 {
    0.75
}
fn default_epsilon() -> f64 {
    0.25
}

impl KeywordConfig {
    pub fn bm25_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.k1,
            b: self.b,
            epsilon: self.epsilon,
        }
    }

    pub fn grep_options(&self, use_regex: bool, case_sensitive: bool) -> GrepOptions {
        GrepOptions {
            use_regex,
            case_sensitive,
            context_chars: self.context_chars,
            max_matches_per_doc: self.max_matches_per_doc,
            max_total_matches: self.max_total_matches,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_token_size == 0 {
            bail!("chunking.chunk_token_size must be > 0");
        }
        if self.chunking.token_overlap >= self.chunking.chunk_token_size {
            bail!("chunking.token_overlap must be < chunking.chunk_token_size");
        }
        if self.chunking.tokens_per_word.is_nan() || self.chunking.tokens_per_word <= 0.0 {
            bail!("chunking.tokens_per_word must be > 0");
        }

        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
        }
        if self.retrieval.max_chunks < 1 {
            bail!("retrieval.max_chunks must be >= 1");
        }
        if self.retrieval.max_tokens < 1 {
            bail!("retrieval.max_tokens must be >= 1");
        }
        if self.retrieval.overfetch_factor < 1 {
            bail!("retrieval.overfetch_factor must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.retrieval.diversity_threshold) {
            bail!("retrieval.diversity_threshold must be in [0.0, 1.0]");
        }
        if self.retrieval.diversity_max_kept == Some(0) {
            bail!("retrieval.diversity_max_kept must be >= 1 when set");
        }

        if self.keyword.max_matches_per_doc < 1 || self.keyword.max_total_matches < 1 {
            bail!("keyword match limits must be >= 1");
        }
        if self.keyword.k1 < 0.0 || !(0.0..=1.0).contains(&self.keyword.b) {
            bail!("keyword.k1 must be >= 0 and keyword.b in [0.0, 1.0]");
        }

        if self.ingest.batch_size < 1 {
            bail!("ingest.batch_size must be >= 1");
        }
        Ok(())
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
