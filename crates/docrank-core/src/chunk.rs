//! Section- and sentence-aware document chunker.
//!
//! Splits a [`RawDocument`] into [`Chunk`]s that respect a configurable
//! `chunk_token_size`. Prose is split on header-delimited sections, then
//! packed sentence by sentence; code blocks are cut out of the prose and
//! chunked on their own.
//!
//! Each chunk receives a deterministic UUID (v5) derived from its source
//! URL, its sequence index, and a SHA-256 hash of its text, so re-chunking
//! identical input with identical options yields identical ids.
//!
//! # Algorithm
//!
//! 1. If `separate_code_blocks`, remove every code block's literal text
//!    from the body and collapse the blank-line runs left behind.
//! 2. Locate each header as the first case-insensitive occurrence of its
//!    text; sort by position; a section runs from one header match to the
//!    next. Text before the first header forms an untitled section.
//! 3. Split each section into sentences and pack them greedily until the
//!    next sentence would exceed `chunk_token_size`. The next chunk opens
//!    with the trailing `token_overlap` worth of words from the closed one.
//!    A sentence larger than the budget is kept whole.
//! 4. Drop text chunks shorter than 20 characters once trimmed.
//! 5. Split oversized code blocks into word windows with overlap.
//!
//! Sizes are counted with [`TokenEstimator`], which uses the `cl100k_base`
//! BPE and falls back to a word-count estimate.
//!
//! # Example
//!
//! ```rust
//! use docrank_core::chunk::{chunk_document, ChunkingOptions, TokenEstimator};
//! use docrank_core::models::RawDocument;
//!
//! let doc = RawDocument {
//!     url: "https://docs.example.com/intro.html".into(),
//!     title: "Intro".into(),
//!     content: "Kernels describe quantum programs. They compile ahead of time.".into(),
//!     code_blocks: vec![],
//!     headers: vec![],
//!     word_count: 9,
//!     content_hash: "h".into(),
//! };
//! let chunks = chunk_document(&doc, &ChunkingOptions::default(), &TokenEstimator::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].metadata.chunk_index, 0);
//! ```

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tiktoken_rs::CoreBPE;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Chunk, ChunkMetadata, ContentType, Header, RawDocument};
use crate::profile::{profile_document, DocumentProfile};

/// Text chunks shorter than this (trimmed, in characters) are noise.
const MIN_CHUNK_CHARS: usize = 20;

/// Code blocks shorter than this (trimmed, in characters) are skipped.
const MIN_CODE_CHARS: usize = 10;

/// Approximate words per token used to turn a token overlap into words.
const WORDS_PER_TOKEN: f64 = 0.75;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("valid sentence regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid blank-line regex"));

/// Which counter a [`TokenEstimator`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tokenizer {
    /// OpenAI `cl100k_base` BPE. Falls back to the word estimate if the
    /// encoder cannot be loaded.
    #[default]
    Cl100kBase,
    /// `ceil(words × tokens_per_word)` only.
    Words,
}

static CL100K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!(error = %e, "cl100k_base unavailable, using word-count token estimate");
        None
    }
});

/// Token counter used for chunk sizes and context budgets.
///
/// Counts with the `cl100k_base` BPE. When the encoder is unavailable, or
/// [`Tokenizer::Words`] is selected, the estimate is
/// `ceil(words × tokens_per_word)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    pub tokenizer: Tokenizer,
    pub tokens_per_word: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenEstimator {
    /// BPE counter with `tokens_per_word` as the fallback multiplier.
    pub fn new(tokens_per_word: f64) -> Self {
        Self {
            tokenizer: Tokenizer::Cl100kBase,
            tokens_per_word,
        }
    }

    /// Word-count estimate only.
    pub fn words(tokens_per_word: f64) -> Self {
        Self {
            tokenizer: Tokenizer::Words,
            tokens_per_word,
        }
    }

    pub fn count(&self, text: &str) -> usize {
        match (self.tokenizer, CL100K.as_ref()) {
            (Tokenizer::Cl100kBase, Some(bpe)) => bpe.encode_ordinary(text).len(),
            _ => self.word_estimate(text),
        }
    }

    fn word_estimate(&self, text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words as f64 * self.tokens_per_word).ceil() as usize
    }
}

/// Knobs for [`chunk_document`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingOptions {
    pub chunk_token_size: usize,
    pub token_overlap: usize,
    pub separate_code_blocks: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_token_size: 512,
            token_overlap: 50,
            separate_code_blocks: true,
        }
    }
}

/// Section header data attached to chunks cut from that section.
#[derive(Debug, Clone, PartialEq)]
struct SectionInfo {
    title: String,
    level: u8,
    anchor: Option<String>,
}

/// Split a document into ordered chunks.
///
/// # Guarantees
///
/// - Empty content (and no code blocks) yields zero chunks.
/// - Order follows document → section → sentence, then code blocks.
/// - `metadata.chunk_index` is contiguous from 0 and ids are unique
///   within the document.
/// - Deterministic: identical input and options give identical output.
pub fn chunk_document(
    doc: &RawDocument,
    opts: &ChunkingOptions,
    estimator: &TokenEstimator,
) -> Vec<Chunk> {
    let profile = profile_document(doc);
    let mut builder = ChunkBuilder {
        doc,
        profile: &profile,
        estimator,
        chunks: Vec::new(),
    };

    let (prose, code_blocks) = if opts.separate_code_blocks && !doc.code_blocks.is_empty() {
        (remove_code_blocks(&doc.content, &doc.code_blocks), doc.code_blocks.as_slice())
    } else {
        (doc.content.clone(), &[][..])
    };

    for (section_text, section) in split_by_headers(&prose, &doc.headers) {
        for piece in split_by_sentences(section_text, opts, estimator) {
            if piece.trim().chars().count() < MIN_CHUNK_CHARS {
                continue;
            }
            builder.push_text(piece.trim(), section.as_ref());
        }
    }

    for (block_index, block) in code_blocks.iter().enumerate() {
        if block.trim().chars().count() < MIN_CODE_CHARS {
            continue;
        }
        let pieces = if estimator.count(block) > opts.chunk_token_size {
            split_by_word_windows(block, opts, estimator)
        } else {
            vec![block.clone()]
        };
        for piece in pieces {
            builder.push_code(piece.trim(), block_index);
        }
    }

    builder.chunks
}

struct ChunkBuilder<'a> {
    doc: &'a RawDocument,
    profile: &'a DocumentProfile,
    estimator: &'a TokenEstimator,
    chunks: Vec<Chunk>,
}

impl ChunkBuilder<'_> {
    fn push_text(&mut self, text: &str, section: Option<&SectionInfo>) {
        let mut metadata = self.base_metadata();
        if let Some(section) = section {
            metadata.section_title = Some(section.title.clone());
            metadata.section_level = Some(section.level);
            metadata.section_anchor = section.anchor.clone();
            metadata.is_section = true;
        }
        self.push(text, metadata);
    }

    fn push_code(&mut self, text: &str, block_index: usize) {
        let mut metadata = self.base_metadata();
        metadata.content_type = ContentType::Code;
        metadata.is_code = true;
        metadata.code_block_index = Some(block_index);
        self.push(text, metadata);
    }

    fn base_metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            document_url: self.doc.url.clone(),
            document_title: self.doc.title.clone(),
            document_hash: self.doc.content_hash.clone(),
            content_type: self.profile.content_type,
            difficulty_level: self.profile.difficulty,
            category: self.profile.category.clone(),
            subcategory: self.profile.subcategory.clone(),
            keywords: self.profile.keywords.clone(),
            has_code_examples: self.profile.has_code_examples,
            ..Default::default()
        }
    }

    fn push(&mut self, text: &str, mut metadata: ChunkMetadata) {
        let index = self.chunks.len();
        let token_count = self.estimator.count(text);
        metadata.chunk_index = index;
        metadata.token_count = token_count;
        self.chunks.push(Chunk {
            chunk_id: chunk_id(&self.doc.url, index, text),
            content: text.to_string(),
            metadata,
            token_count,
            embedding: None,
        });
    }
}

/// Deterministic chunk id from source URL, sequence index, and content hash.
pub fn chunk_id(document_url: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    let name = format!("{}#{}#{}", document_url, index, hash);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// Remove every code block's literal text from the body.
///
/// Best effort: blocks that were reformatted by the crawler and no longer
/// appear verbatim are left in place.
fn remove_code_blocks(content: &str, code_blocks: &[String]) -> String {
    let mut text = content.to_string();
    for block in code_blocks {
        if !block.is_empty() {
            text = text.replace(block.as_str(), "");
        }
    }
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

/// Cut the body into header-delimited sections.
///
/// Each header is located by its first case-insensitive occurrence. Headers
/// that never occur are ignored; if none occur the whole body is a single
/// untitled section.
fn split_by_headers<'a>(
    content: &'a str,
    headers: &[Header],
) -> Vec<(&'a str, Option<SectionInfo>)> {
    let mut positions: Vec<(usize, &Header)> = headers
        .iter()
        .filter(|h| !h.text.trim().is_empty())
        .filter_map(|h| find_case_insensitive(content, &h.text).map(|pos| (pos, h)))
        .collect();
    positions.sort_by_key(|(pos, _)| *pos);

    let mut sections = Vec::new();
    let first_start = positions.first().map(|(pos, _)| *pos).unwrap_or(content.len());
    let preamble = content[..first_start].trim();
    if !preamble.is_empty() {
        sections.push((preamble, None));
    }

    for (i, (start, header)) in positions.iter().enumerate() {
        let end = positions
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(content.len());
        let body = content[*start..end].trim();
        if body.is_empty() {
            continue;
        }
        sections.push((
            body,
            Some(SectionInfo {
                title: header.text.clone(),
                level: header.level,
                anchor: header.anchor_id.clone(),
            }),
        ));
    }

    sections
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()
        .and_then(|re| re.find(haystack))
        .map(|m| m.start())
}

/// Split text into sentences, keeping each sentence's own terminator.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(text) {
        let sentence = text[last..m.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        last = m.end();
    }
    let tail = text[last..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Greedily pack sentences into chunks of at most `chunk_token_size`.
fn split_by_sentences(
    text: &str,
    opts: &ChunkingOptions,
    estimator: &TokenEstimator,
) -> Vec<String> {
    let sentences = sentences(text);
    if sentences.is_empty() {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_size = 0usize;

    for sentence in sentences {
        let sentence_tokens = estimator.count(sentence);
        if current_size + sentence_tokens > opts.chunk_token_size && !current.is_empty() {
            chunks.push(current.trim().to_string());
            let overlap = trailing_overlap(&current, opts.token_overlap);
            current = if overlap.is_empty() {
                sentence.to_string()
            } else {
                format!("{} {}", overlap, sentence)
            };
            current_size = estimator.count(&current);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
            current_size += sentence_tokens;
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}

/// The trailing `overlap_tokens` worth of words of `text`.
fn trailing_overlap(text: &str, overlap_tokens: usize) -> String {
    let overlap_words = (overlap_tokens as f64 * WORDS_PER_TOKEN) as usize;
    if overlap_words == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= overlap_words {
        return words.join(" ");
    }
    words[words.len() - overlap_words..].join(" ")
}

/// Split text into word windows of roughly `chunk_token_size` tokens, with overlap.
fn split_by_word_windows(
    text: &str,
    opts: &ChunkingOptions,
    estimator: &TokenEstimator,
) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    // Scale the budget by this block's own words-per-token ratio.
    let tokens = estimator.count(text).max(1);
    let window =
        ((opts.chunk_token_size as f64 * words.len() as f64 / tokens as f64).floor() as usize).max(1);
    let overlap = ((opts.token_overlap as f64 * WORDS_PER_TOKEN) as usize).min(window - 1);
    let step = window - overlap;

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + window).min(words.len());
        pieces.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    pieces
}
