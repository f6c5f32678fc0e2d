//! Core data models used throughout docrank.
//!
//! These types represent the crawled documents, the chunks cut from them,
//! and the transient per-query values (candidates, keyword matches, query
//! analysis) that flow through the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A crawled documentation page, as produced by the external crawler.
///
/// Immutable once ingested. `url` is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub code_blocks: Vec<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub content_hash: String,
}

/// A heading extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub level: u8,
    pub text: String,
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
}

/// Coarse classification of what a chunk contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Documentation,
    Code,
    Example,
    ApiReference,
    Tutorial,
    Guide,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Documentation => "documentation",
            ContentType::Code => "code",
            ContentType::Example => "example",
            ContentType::ApiReference => "api_reference",
            ContentType::Tutorial => "tutorial",
            ContentType::Guide => "guide",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated reading difficulty of a document, or the difficulty a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    IntermediateAdvanced,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::IntermediateAdvanced => "intermediate_advanced",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// Metadata carried by every [`Chunk`].
///
/// Document-level fields are stamped from the source [`RawDocument`] and
/// its profile; section fields are present only for chunks cut from a
/// header-delimited section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_url: String,
    pub document_title: String,
    #[serde(default)]
    pub document_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_anchor: Option<String>,
    #[serde(default)]
    pub is_section: bool,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub is_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_block_index: Option<usize>,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub token_count: usize,
    #[serde(default)]
    pub difficulty_level: Difficulty,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub has_code_examples: bool,
}

/// An addressable retrieval unit cut from a [`RawDocument`].
///
/// The persisted schema is `{chunk_id, content, metadata, token_count}`;
/// the embedding vector lives alongside the vector index and is never
/// serialized with the chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub token_count: usize,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Attach the embedding vector computed by the external embedding step.
    ///
    /// A chunk accepts exactly one embedding over its lifetime.
    pub fn attach_embedding(&mut self, vector: Vec<f32>) -> Result<(), RetrievalError> {
        if self.embedding.is_some() {
            return Err(RetrievalError::EmbeddingAlreadyAttached(
                self.chunk_id.clone(),
            ));
        }
        self.embedding = Some(vector);
        Ok(())
    }
}

/// A chunk proposed for a query, with the signals that rank it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub chunk: Chunk,
    /// `1 - cosine distance` from the vector index.
    pub similarity_score: f64,
    /// Literal keyword filters found in the chunk content.
    pub matched_keywords: Vec<String>,
}

impl SearchCandidate {
    pub fn new(chunk: Chunk, similarity_score: f64) -> Self {
        Self {
            chunk,
            similarity_score,
            matched_keywords: Vec::new(),
        }
    }
}

/// A literal or regex hit inside a document body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrepMatch {
    pub doc_id: String,
    pub doc_title: String,
    pub doc_url: String,
    pub match_text: String,
    pub context_before: String,
    pub context_after: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A code block containing a searched keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeExample {
    pub doc_id: String,
    pub doc_title: String,
    pub doc_url: String,
    pub code: String,
}

/// A document heading containing a searched keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderMatch {
    pub doc_id: String,
    pub doc_title: String,
    pub doc_url: String,
    pub header: String,
    pub level: u8,
}

/// What the user is trying to do, inferred from the query wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    HowTo,
    WhatIs,
    Example,
    Troubleshoot,
    Comparison,
    ApiReference,
    BestPractice,
    CodeGeneration,
    General,
}

/// The result of analysing one incoming query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub normalized_query: String,
    pub intent: QueryIntent,
    pub keywords: Vec<String>,
    pub tech_terms: Vec<String>,
    pub is_code_query: bool,
    pub difficulty_preference: Difficulty,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk {
            chunk_id: "c-1".to_string(),
            content: "Kernels are compiled ahead of time.".to_string(),
            metadata: ChunkMetadata {
                document_url: "https://docs.example.com/guide/kernels.html".to_string(),
                document_title: "Kernels".to_string(),
                section_title: Some("Compilation".to_string()),
                section_level: Some(2),
                is_section: true,
                content_type: ContentType::Guide,
                token_count: 8,
                keywords: vec!["kernels".to_string()],
                ..Default::default()
            },
            token_count: 8,
            embedding: None,
        }
    }

    #[test]
    fn test_chunk_roundtrip_preserves_fields() {
        let mut chunk = sample_chunk();
        chunk.attach_embedding(vec![0.1, 0.2]).unwrap();
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("embedding"));

        let restored: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.content, chunk.content);
        assert_eq!(restored.metadata, chunk.metadata);
        assert_eq!(restored.token_count, chunk.token_count);
        assert!(restored.embedding.is_none());
    }

    #[test]
    fn test_embedding_attaches_once() {
        let mut chunk = sample_chunk();
        assert!(chunk.attach_embedding(vec![1.0]).is_ok());
        let err = chunk.attach_embedding(vec![2.0]).unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingAlreadyAttached(_)));
        assert_eq!(chunk.embedding, Some(vec![1.0]));
    }

    #[test]
    fn test_enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ContentType::ApiReference).unwrap(),
            "\"api_reference\""
        );
        assert_eq!(
            serde_json::to_string(&Difficulty::IntermediateAdvanced).unwrap(),
            "\"intermediate_advanced\""
        );
        assert_eq!(
            serde_json::to_string(&QueryIntent::HowTo).unwrap(),
            "\"how_to\""
        );
    }

    #[test]
    fn test_raw_document_accepts_header_id_alias() {
        let json = r#"{
            "url": "https://docs.example.com/a.html",
            "title": "A",
            "content": "Body",
            "headers": [{"level": 2, "text": "Usage", "id": "usage"}]
        }"#;
        let doc: RawDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.headers[0].anchor_id.as_deref(), Some("usage"));
        assert!(doc.code_blocks.is_empty());
    }
}
