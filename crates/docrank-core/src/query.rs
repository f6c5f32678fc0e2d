//! Rule-based query analysis.
//!
//! Turns a raw user query into a [`QueryAnalysis`]: intent, keywords,
//! technical term categories, whether code is wanted, and the difficulty
//! the user seems to expect. All matching is on the lowercased query.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Difficulty, QueryAnalysis, QueryIntent};

/// Checked in order; the first intent with a matching phrase wins.
const INTENT_PATTERNS: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::HowTo,
        &["how to", "how do i", "how can i", "steps to", "tutorial"],
    ),
    (
        QueryIntent::WhatIs,
        &["what is", "what are", "define", "explain", "meaning of"],
    ),
    (QueryIntent::Example, &["example", "sample", "demo", "show me"]),
    (
        QueryIntent::Troubleshoot,
        &["error", "problem", "issue", "not working", "debug", "fix"],
    ),
    (
        QueryIntent::Comparison,
        &["vs", "versus", "compare", "difference", "better"],
    ),
    (
        QueryIntent::ApiReference,
        &["function", "method", "class", "parameter", "api", "reference"],
    ),
    (
        QueryIntent::BestPractice,
        &["best practice", "recommended", "should i", "better way"],
    ),
    (
        QueryIntent::CodeGeneration,
        &["write code", "generate", "create", "implement", "build"],
    ),
];

const STOP_WORDS: &[&str] = &[
    "how", "to", "do", "i", "can", "what", "is", "are", "the", "a", "an", "and", "or", "but", "in",
    "on", "at", "for", "with", "by", "from", "of", "as", "this", "that",
];

const TECH_PATTERNS: &[(&str, &[&str])] = &[
    ("cuda_q", &["cuda-q", "cudaq"]),
    (
        "quantum",
        &["quantum", "qubit", "gate", "circuit", "entanglement"],
    ),
    (
        "programming",
        &["function", "class", "method", "variable", "parameter"],
    ),
    ("data_types", &["array", "matrix", "vector", "list", "string"]),
    ("operations", &["compile", "execute", "run", "build", "install"]),
    (
        "concepts",
        &["algorithm", "optimization", "simulation", "measurement"],
    ),
];

const CODE_INDICATORS: &[&str] = &[
    "code", "example", "implement", "write", "create", "build", "function", "class", "method",
    "syntax", "snippet",
];

const BEGINNER_TERMS: &[&str] = &["basic", "simple", "introduction", "getting started", "beginner"];
const ADVANCED_TERMS: &[&str] = &["advanced", "complex", "optimization", "performance", "internals"];

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]+\b").expect("valid word regex"));

/// Analyse a query.
///
/// # Example
///
/// ```rust
/// use docrank_core::models::QueryIntent;
/// use docrank_core::query::analyze_query;
///
/// let qa = analyze_query("How do I create a quantum circuit?");
/// assert_eq!(qa.intent, QueryIntent::HowTo);
/// assert_eq!(qa.keywords, vec!["create", "quantum", "circuit"]);
/// ```
pub fn analyze_query(query: &str) -> QueryAnalysis {
    let normalized = query.trim().to_lowercase();
    QueryAnalysis {
        original_query: query.to_string(),
        intent: classify_intent(&normalized),
        keywords: extract_keywords(&normalized),
        tech_terms: tech_terms(&normalized),
        is_code_query: CODE_INDICATORS.iter().any(|c| normalized.contains(c)),
        difficulty_preference: difficulty_preference(&normalized),
        normalized_query: normalized,
    }
}

fn classify_intent(query: &str) -> QueryIntent {
    INTENT_PATTERNS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| query.contains(p)))
        .map(|(intent, _)| *intent)
        .unwrap_or(QueryIntent::General)
}

/// Alphabetic words, stop words and words of two letters or fewer removed,
/// deduplicated in first-seen order.
fn extract_keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    WORD.find_iter(query)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn tech_terms(query: &str) -> Vec<String> {
    TECH_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| query.contains(p)))
        .map(|(category, _)| category.to_string())
        .collect()
}

fn difficulty_preference(query: &str) -> Difficulty {
    if BEGINNER_TERMS.iter().any(|t| query.contains(t)) {
        Difficulty::Beginner
    } else if ADVANCED_TERMS.iter().any(|t| query.contains(t)) {
        Difficulty::Advanced
    } else {
        Difficulty::Intermediate
    }
}
