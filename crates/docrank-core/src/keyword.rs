//! Keyword index: literal/regex search and BM25 ranking over documents.
//!
//! The index is built once per loaded corpus and is read-only afterwards.
//! It owns the [`DocumentMap`] it was built from, so every operation can
//! resolve doc ids without a second lookup structure.
//!
//! # BM25
//!
//! Documents are tokenized by lowercasing and splitting on whitespace (no
//! stemming, punctuation stays attached). Scoring is Okapi BM25:
//!
//! ```text
//! idf(t)      = ln(N - n(t) + 0.5) - ln(n(t) + 0.5)
//! score(D, Q) = Σ idf(t) · tf(t,D)·(k1+1) / (tf(t,D) + k1·(1 - b + b·|D|/avgdl))
//! ```
//!
//! Terms found in more than half the corpus would get a negative idf; they
//! are floored at `epsilon × mean(idf)` instead. The model is fitted over
//! the whole corpus; a doc id filter only restricts which scores are
//! returned, it never refits document frequencies.

use std::collections::{BTreeMap, HashMap};

use regex::RegexBuilder;
use tracing::{debug, info, instrument, warn};

use crate::doc_map::{DocumentMap, DocumentRecord};
use crate::error::RetrievalError;
use crate::models::{CodeExample, GrepMatch, HeaderMatch};

/// BM25 free parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// Fitted BM25 model over a tokenized corpus.
#[derive(Debug, Clone)]
struct Bm25 {
    params: Bm25Params,
    doc_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25 {
    fn fit(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut nd: BTreeMap<String, usize> = BTreeMap::new();

        for tokens in corpus {
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *nd.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len());
            doc_freqs.push(freqs);
        }

        let n_docs = corpus.len() as f64;
        let total_len: usize = doc_lens.iter().sum();
        let avgdl = if corpus.is_empty() {
            0.0
        } else {
            total_len as f64 / n_docs
        };

        let mut idf = HashMap::with_capacity(nd.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, n) in nd {
            let n = n as f64;
            let value = (n_docs - n + 0.5).ln() - (n + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }
        if !idf.is_empty() {
            let floor = params.epsilon * (idf_sum / idf.len() as f64);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            params,
            doc_freqs,
            doc_lens,
            avgdl,
            idf,
        }
    }

    /// One score per corpus document, in corpus order.
    fn scores(&self, query: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.doc_freqs.len()];
        if self.avgdl == 0.0 {
            return scores;
        }
        let Bm25Params { k1, b, .. } = self.params;
        for term in query {
            let idf = self.idf.get(term).copied().unwrap_or(0.0);
            for (i, freqs) in self.doc_freqs.iter().enumerate() {
                let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let norm = 1.0 - b + b * self.doc_lens[i] as f64 / self.avgdl;
                scores[i] += idf * (tf * (k1 + 1.0)) / (tf + k1 * norm);
            }
        }
        scores
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Options for [`KeywordIndex::grep`].
#[derive(Debug, Clone, PartialEq)]
pub struct GrepOptions {
    /// Treat the pattern as a regular expression instead of a literal.
    pub use_regex: bool,
    pub case_sensitive: bool,
    /// Characters of context captured on each side of a match.
    pub context_chars: usize,
    pub max_matches_per_doc: usize,
    pub max_total_matches: usize,
}

impl Default for GrepOptions {
    fn default() -> Self {
        Self {
            use_regex: false,
            case_sensitive: false,
            context_chars: 150,
            max_matches_per_doc: 3,
            max_total_matches: 15,
        }
    }
}

/// Exact-match corpus plus fitted BM25 model.
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    documents: DocumentMap,
    bm25: Bm25,
}

impl KeywordIndex {
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn build(documents: DocumentMap, params: Bm25Params) -> Self {
        let corpus: Vec<Vec<String>> = documents
            .documents
            .iter()
            .map(|d| tokenize(&d.content))
            .collect();
        let bm25 = Bm25::fit(&corpus, params);
        info!(
            documents = documents.len(),
            vocabulary = bm25.idf.len(),
            "keyword index built"
        );
        Self { documents, bm25 }
    }

    pub fn documents(&self) -> &DocumentMap {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Literal or regex search over document bodies.
    ///
    /// Returns matches in document order (filter order when `doc_ids` is
    /// given), at most `max_matches_per_doc` per document and
    /// `max_total_matches` overall.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::Pattern`] when a regex does not compile, and
    /// [`RetrievalError::InvalidInput`] for an empty pattern.
    #[instrument(skip(self, doc_ids, opts), fields(regex = opts.use_regex))]
    pub fn grep(
        &self,
        pattern: &str,
        doc_ids: Option<&[String]>,
        opts: &GrepOptions,
    ) -> Result<Vec<GrepMatch>, RetrievalError> {
        if pattern.is_empty() {
            return Err(RetrievalError::InvalidInput("empty search pattern".into()));
        }
        let source = if opts.use_regex {
            pattern.to_string()
        } else {
            regex::escape(pattern)
        };
        let re = RegexBuilder::new(&source)
            .case_insensitive(!opts.case_sensitive)
            .build()
            .map_err(|e| {
                warn!(pattern, error = %e, "invalid regex pattern");
                RetrievalError::Pattern(e.to_string())
            })?;

        let mut matches = Vec::new();
        if opts.max_total_matches == 0 {
            return Ok(matches);
        }
        'docs: for doc in self.documents.select(doc_ids) {
            let content = &doc.content;
            for (n, m) in re.find_iter(content).enumerate() {
                if n >= opts.max_matches_per_doc {
                    break;
                }
                matches.push(GrepMatch {
                    doc_id: doc.doc_id.clone(),
                    doc_title: display_title(doc),
                    doc_url: doc.url.clone(),
                    match_text: m.as_str().to_string(),
                    context_before: collapse_whitespace(tail_chars(
                        &content[..m.start()],
                        opts.context_chars,
                    )),
                    context_after: collapse_whitespace(head_chars(
                        &content[m.end()..],
                        opts.context_chars,
                    )),
                    score: None,
                });
                if matches.len() >= opts.max_total_matches {
                    break 'docs;
                }
            }
        }
        debug!(matches = matches.len(), "grep finished");
        Ok(matches)
    }

    /// BM25 ranked search; returns up to `top_k` `(doc_id, score)` pairs,
    /// best first, ties in corpus order.
    #[instrument(skip(self, doc_ids))]
    pub fn ranked_search(
        &self,
        query: &str,
        doc_ids: Option<&[String]>,
        top_k: usize,
    ) -> Vec<(String, f64)> {
        if self.documents.is_empty() {
            return Vec::new();
        }
        let scores = self.bm25.scores(&tokenize(query));
        let allowed: Option<std::collections::HashSet<&str>> = doc_ids
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().map(String::as_str).collect());

        let mut results: Vec<(String, f64)> = self
            .documents
            .documents
            .iter()
            .zip(scores)
            .filter(|(doc, _)| {
                allowed
                    .as_ref()
                    .map_or(true, |set| set.contains(doc.doc_id.as_str()))
            })
            .map(|(doc, score)| (doc.doc_id.clone(), score))
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    /// Code blocks containing `keyword` (case-insensitive literal).
    pub fn find_code_examples(
        &self,
        keyword: &str,
        doc_ids: Option<&[String]>,
        max_examples: usize,
    ) -> Vec<CodeExample> {
        let re = literal_matcher(keyword);
        let mut examples = Vec::new();
        if max_examples == 0 {
            return examples;
        }
        for doc in self.documents.select(doc_ids) {
            for code in doc.code_blocks.iter().filter(|c| re.is_match(c)) {
                examples.push(CodeExample {
                    doc_id: doc.doc_id.clone(),
                    doc_title: display_title(doc),
                    doc_url: doc.url.clone(),
                    code: code.clone(),
                });
                if examples.len() >= max_examples {
                    return examples;
                }
            }
        }
        examples
    }

    /// Headers containing `keyword` (case-insensitive literal).
    pub fn search_headers(&self, keyword: &str, doc_ids: Option<&[String]>) -> Vec<HeaderMatch> {
        let re = literal_matcher(keyword);
        self.documents
            .select(doc_ids)
            .into_iter()
            .flat_map(|doc| {
                doc.headers
                    .iter()
                    .filter(|h| re.is_match(&h.text))
                    .map(move |h| HeaderMatch {
                        doc_id: doc.doc_id.clone(),
                        doc_title: display_title(doc),
                        doc_url: doc.url.clone(),
                        header: h.text.clone(),
                        level: h.level,
                    })
            })
            .collect()
    }
}

/// Case-insensitive substring test.
struct LiteralMatcher {
    needle: String,
}

impl LiteralMatcher {
    fn is_match(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.needle)
    }
}

fn literal_matcher(keyword: &str) -> LiteralMatcher {
    LiteralMatcher {
        needle: keyword.to_lowercase(),
    }
}

fn display_title(doc: &DocumentRecord) -> String {
    if doc.title.is_empty() {
        "Untitled".to_string()
    } else {
        doc.title.clone()
    }
}

/// The last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((i, _)) if n > 0 => &s[i..],
        _ if n == 0 => "",
        _ => s,
    }
}

/// The first `n` characters of `s`.
fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
