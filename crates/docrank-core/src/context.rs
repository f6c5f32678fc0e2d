//! Context assembly.
//!
//! Renders the selected chunks into one annotated text block for the
//! generation layer, and reports what went into it.

use serde::Serialize;

use crate::fusion::ScoredCandidate;
use crate::models::ContentType;

/// Returned instead of an empty context when nothing was selected.
pub const NO_RELEVANT_DOCUMENTATION: &str = "No relevant documentation found.";

const SEPARATOR_WIDTH: usize = 50;

/// Per-call retrieval diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalDiagnostics {
    pub chunks_found: usize,
    pub total_tokens: usize,
    pub similarity_scores: Vec<f64>,
    pub content_types: Vec<ContentType>,
    pub relevance_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub diagnostics: RetrievalDiagnostics,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.diagnostics.chunks_found == 0
    }
}

/// Render selected chunks, best first.
///
/// Each chunk becomes a `## Context {i}: {title}` section (section title,
/// else document title) with a ` ({content_type})` suffix unless it is
/// plain documentation, followed by the content and a `*Source: url*`
/// line. Sections are wrapped and joined by a line of `=`.
pub fn assemble(selected: &[ScoredCandidate]) -> AssembledContext {
    let diagnostics = RetrievalDiagnostics {
        chunks_found: selected.len(),
        total_tokens: selected.iter().map(|s| s.token_count()).sum(),
        similarity_scores: selected
            .iter()
            .map(|s| s.candidate.similarity_score)
            .collect(),
        content_types: selected
            .iter()
            .map(|s| s.candidate.chunk.metadata.content_type)
            .collect(),
        relevance_scores: selected.iter().map(|s| s.relevance()).collect(),
    };

    if selected.is_empty() {
        return AssembledContext {
            text: NO_RELEVANT_DOCUMENTATION.to_string(),
            diagnostics,
        };
    }

    let parts: Vec<String> = selected
        .iter()
        .enumerate()
        .map(|(i, s)| render_section(i + 1, s))
        .collect();
    let separator = "=".repeat(SEPARATOR_WIDTH);
    let text = format!(
        "\n{sep}{body}\n{sep}",
        sep = separator,
        body = parts.join(&format!("\n{}\n", separator))
    );

    AssembledContext { text, diagnostics }
}

fn render_section(position: usize, scored: &ScoredCandidate) -> String {
    let chunk = &scored.candidate.chunk;
    let meta = &chunk.metadata;
    let title = meta
        .section_title
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(Some(meta.document_title.as_str()).filter(|t| !t.is_empty()))
        .unwrap_or("Documentation");

    let mut out = format!("## Context {}: {}", position, title);
    if meta.content_type != ContentType::Documentation {
        out.push_str(&format!(" ({})", meta.content_type));
    }
    out.push_str(&format!("\n\n{}\n", chunk.content));
    if !meta.document_url.is_empty() {
        out.push_str(&format!("\n*Source: {}*\n", meta.document_url));
    }
    out
}
