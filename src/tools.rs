//! Fixed tool surface for an orchestration layer.
//!
//! [`ToolContext`] exposes each retrieval operation as a plain method
//! returning display text. Nothing here is registered or dispatched by
//! name: an agent framework wraps whichever methods it needs.
//!
//! Errors never escape as `Err`; they are rendered into the returned text
//! so a caller can hand the result straight to a language model.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docrank::config::Config;
//! use docrank::engine::RetrievalEngine;
//! use docrank::tools::{parse_doc_ids, ToolContext};
//! use docrank_core::store::memory::InMemoryVectorIndex;
//!
//! let engine = RetrievalEngine::new(Config::default(), Arc::new(InMemoryVectorIndex::new()));
//! let tools = ToolContext::new(Arc::new(engine));
//! let ids = parse_doc_ids("doc_0, doc_5");
//! println!("{}", tools.grep_search("cudaq.sample", ids.as_deref(), false));
//! ```

use std::sync::Arc;

use docrank_core::context::RetrievalDiagnostics;
use docrank_core::doc_map::DocumentMap;
use docrank_core::models::{CodeExample, GrepMatch, HeaderMatch};
use docrank_core::RetrievalError;

use crate::engine::{RetrievalEngine, RetrieveOptions};

/// Handle passed to tool implementations.
#[derive(Clone)]
pub struct ToolContext {
    engine: Arc<RetrievalEngine>,
}

impl ToolContext {
    pub fn new(engine: Arc<RetrievalEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.engine
    }

    fn max_display(&self) -> usize {
        self.engine.config().keyword.max_display
    }

    /// Exact (literal) keyword search with context windows.
    pub fn grep_search(
        &self,
        keyword: &str,
        doc_ids: Option<&[String]>,
        case_sensitive: bool,
    ) -> String {
        self.grep(keyword, doc_ids, false, case_sensitive)
    }

    /// Regular-expression search with context windows.
    pub fn regex_search(
        &self,
        pattern: &str,
        doc_ids: Option<&[String]>,
        case_sensitive: bool,
    ) -> String {
        self.grep(pattern, doc_ids, true, case_sensitive)
    }

    fn grep(
        &self,
        pattern: &str,
        doc_ids: Option<&[String]>,
        use_regex: bool,
        case_sensitive: bool,
    ) -> String {
        let index = match self.engine.keyword_index() {
            Ok(index) => index,
            Err(e) => return error_text(&e),
        };
        let opts = self
            .engine
            .config()
            .keyword
            .grep_options(use_regex, case_sensitive);
        match index.grep(pattern, doc_ids, &opts) {
            Ok(matches) if matches.is_empty() => {
                format!("No exact matches found for '{}'", pattern)
            }
            Ok(matches) => format_grep_results(&matches, self.max_display()),
            Err(e) => error_text(&e),
        }
    }

    /// BM25-ranked document search.
    pub fn ranked_keyword_search(
        &self,
        query: &str,
        doc_ids: Option<&[String]>,
        top_k: Option<usize>,
    ) -> String {
        let index = match self.engine.keyword_index() {
            Ok(index) => index,
            Err(e) => return error_text(&e),
        };
        let top_k = top_k.unwrap_or(self.engine.config().keyword.top_k);
        let results = index.ranked_search(query, doc_ids, top_k);
        if results.is_empty() {
            return format!("No results found for query: {}", query);
        }
        format_bm25_results(&results, index.documents(), self.max_display())
    }

    /// Code blocks containing `keyword`.
    pub fn find_code_examples(&self, keyword: &str, doc_ids: Option<&[String]>) -> String {
        let index = match self.engine.keyword_index() {
            Ok(index) => index,
            Err(e) => return error_text(&e),
        };
        let examples =
            index.find_code_examples(keyword, doc_ids, self.engine.config().keyword.max_examples);
        if examples.is_empty() {
            return format!("No code examples found containing '{}'", keyword);
        }
        format_code_examples(keyword, &examples)
    }

    /// Section headings containing `keyword`.
    pub fn search_headers(&self, keyword: &str, doc_ids: Option<&[String]>) -> String {
        let index = match self.engine.keyword_index() {
            Ok(index) => index,
            Err(e) => return error_text(&e),
        };
        let headers = index.search_headers(keyword, doc_ids);
        if headers.is_empty() {
            return format!("No headers found containing '{}'", keyword);
        }
        format_header_matches(keyword, &headers, self.max_display())
    }

    /// Hybrid retrieval; returns the formatted context and its diagnostics.
    ///
    /// BM25 document hits are not part of the output, so they are not computed.
    pub async fn hybrid_retrieve(
        &self,
        query: &str,
        max_chunks: Option<usize>,
        max_tokens: Option<usize>,
        similarity_threshold: Option<f64>,
    ) -> (String, RetrievalDiagnostics) {
        let opts = RetrieveOptions {
            max_chunks,
            max_tokens,
            similarity_threshold,
            skip_keyword_hits: true,
            ..Default::default()
        };
        match self.engine.hybrid_retrieve(query, opts).await {
            Ok(retrieval) => (retrieval.context.text, retrieval.context.diagnostics),
            Err(e) => (error_text(&e), RetrievalDiagnostics::default()),
        }
    }
}

/// Split a comma-separated doc id list. Blank input means no restriction.
pub fn parse_doc_ids(raw: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

fn error_text(err: &RetrievalError) -> String {
    match err {
        RetrievalError::Pattern(_) => err.to_string(),
        _ => format!("Error: {}", err),
    }
}

pub fn format_grep_results(matches: &[GrepMatch], max_display: usize) -> String {
    if matches.is_empty() {
        return "No matches found.".to_string();
    }
    let mut output = vec![format!("Found {} matches:\n", matches.len())];
    for (i, m) in matches.iter().take(max_display).enumerate() {
        output.push(format!("\n## Match {}: {}", i + 1, m.doc_title));
        output.push(format!("URL: {}", m.doc_url));
        output.push(String::new());
        output.push(format!(
            "...{} **{}** {}...",
            m.context_before, m.match_text, m.context_after
        ));
        output.push(String::new());
    }
    if matches.len() > max_display {
        output.push(format!(
            "\n... and {} more matches",
            matches.len() - max_display
        ));
    }
    output.join("\n")
}

/// Render `(doc_id, score)` pairs; ids missing from `documents` are skipped.
pub fn format_bm25_results(
    results: &[(String, f64)],
    documents: &DocumentMap,
    max_display: usize,
) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    let mut output = vec![format!("Found {} relevant documents:\n", results.len())];
    for (i, (doc_id, score)) in results.iter().take(max_display).enumerate() {
        let Some(doc) = documents.get(doc_id) else {
            continue;
        };
        let title = if doc.title.is_empty() {
            "Untitled"
        } else {
            doc.title.as_str()
        };
        output.push(format!("\n## Result {}: {} (Score: {:.2})", i + 1, title, score));
        output.push(format!("URL: {}", doc.url));
        output.push(format!("Path: {}", doc.path));
        output.push(String::new());
    }
    if results.len() > max_display {
        output.push(format!(
            "\n... and {} more results",
            results.len() - max_display
        ));
    }
    output.join("\n")
}

pub fn format_code_examples(keyword: &str, examples: &[CodeExample]) -> String {
    let mut output = vec![format!(
        "Found {} code examples with '{}':\n",
        examples.len(),
        keyword
    )];
    for (i, example) in examples.iter().enumerate() {
        output.push(format!("\n## Example {}: {}", i + 1, example.doc_title));
        output.push(format!("URL: {}", example.doc_url));
        output.push(format!("\n```\n{}\n```\n", example.code));
    }
    output.join("\n")
}

pub fn format_header_matches(keyword: &str, headers: &[HeaderMatch], max_display: usize) -> String {
    let mut output = vec![format!(
        "Found {} headers with '{}':\n",
        headers.len(),
        keyword
    )];
    for h in headers.iter().take(max_display) {
        output.push(format!(
            "{} {} ({})",
            "#".repeat(h.level.clamp(1, 6) as usize),
            h.header,
            h.doc_title
        ));
        output.push(format!("URL: {}", h.doc_url));
        output.push(String::new());
    }
    if headers.len() > max_display {
        output.push(format!("... and {} more headers", headers.len() - max_display));
    }
    output.join("\n")
}
