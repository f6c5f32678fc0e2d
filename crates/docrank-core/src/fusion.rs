//! Relevance fusion and token-budgeted selection.
//!
//! Combines vector-similarity candidates with keyword and query-analysis
//! signals into a single composite score, then picks the best candidates
//! that fit the caller's chunk and token budget.
//!
//! # Pipeline
//!
//! 1. Drop candidates below `similarity_threshold`.
//! 2. Keep candidates containing at least one literal keyword filter
//!    (case-insensitive); fall back to the thresholded set if none do.
//! 3. Score: `similarity + intent + code + keyword + difficulty − short`,
//!    clamped to `[0, 1]`.
//! 4. Stable sort by score, descending.
//! 5. Optionally suppress near-duplicates (word-set Jaccard).
//! 6. Greedily accept while `count < max_chunks` and the running token sum
//!    stays within `max_tokens`. The first evaluated candidate is accepted
//!    even when it alone exceeds the budget.
//!
//! Every step is a pure function of its inputs.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::models::{ContentType, QueryAnalysis, QueryIntent, SearchCandidate};

const INTENT_MATCH_BOOST: f64 = 0.20;
const HOW_TO_BOOST: f64 = 0.15;
const CODE_GENERATION_BOOST: f64 = 0.10;
const CODE_QUERY_BOOST: f64 = 0.10;
const KEYWORD_BOOST_PER_MATCH: f64 = 0.05;
const KEYWORD_BOOST_CAP: f64 = 0.15;
const DIFFICULTY_BOOST: f64 = 0.10;
const SHORT_CONTENT_PENALTY: f64 = 0.10;
const SHORT_CONTENT_CHARS: usize = 100;

/// Near-duplicate suppression settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DiversityParams {
    /// A candidate whose Jaccard similarity to any kept candidate exceeds
    /// this value is dropped.
    pub threshold: f64,
    /// Stop once this many candidates are kept.
    pub max_kept: Option<usize>,
}

impl Default for DiversityParams {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            max_kept: None,
        }
    }
}

/// Inputs for one [`fuse`] call, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionParams {
    pub similarity_threshold: f64,
    pub max_chunks: usize,
    pub max_tokens: usize,
    /// Run diversity re-ranking between ranking and selection.
    pub diversity: Option<DiversityParams>,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            max_chunks: 10,
            max_tokens: 30_000,
            diversity: None,
        }
    }
}

/// How a candidate's composite score was put together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub similarity: f64,
    pub intent_boost: f64,
    pub code_boost: f64,
    pub keyword_boost: f64,
    pub difficulty_boost: f64,
    /// Zero or negative.
    pub length_penalty: f64,
    /// Sum of the above, clamped to `[0, 1]`.
    pub total: f64,
}

/// A candidate with its composite score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: SearchCandidate,
    pub score: ScoreBreakdown,
}

impl ScoredCandidate {
    pub fn relevance(&self) -> f64 {
        self.score.total
    }

    pub fn token_count(&self) -> usize {
        self.candidate.chunk.token_count
    }
}

/// Result of [`fuse`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionOutcome {
    /// Selected candidates, best first.
    pub selected: Vec<ScoredCandidate>,
    /// Candidates that passed the similarity threshold.
    pub above_threshold: usize,
    /// Whether keyword filtering emptied the set and was undone.
    pub keyword_fallback: bool,
}

/// How many candidates to request from the vector index.
///
/// `max_chunks × factor`, capped at `cap`, and never below `max_chunks`.
pub fn overfetch_size(max_chunks: usize, factor: usize, cap: usize) -> usize {
    max_chunks.saturating_mul(factor).min(cap).max(max_chunks)
}

pub fn apply_threshold(candidates: Vec<SearchCandidate>, threshold: f64) -> Vec<SearchCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.similarity_score >= threshold)
        .collect()
}

/// Keep candidates that contain at least one filter term.
///
/// Survivors record the filter terms they contain in `matched_keywords`.
/// Returns the input unchanged (and `false`) when no filters are given;
/// returns the input unchanged (and `true`) when filtering would leave
/// nothing.
pub fn apply_keyword_filters(
    candidates: Vec<SearchCandidate>,
    filters: &[String],
) -> (Vec<SearchCandidate>, bool) {
    let filters: Vec<String> = filters
        .iter()
        .map(|f| f.to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();
    if filters.is_empty() {
        return (candidates, false);
    }

    let matched: Vec<Vec<String>> = candidates
        .iter()
        .map(|c| {
            let content = c.chunk.content.to_lowercase();
            filters
                .iter()
                .filter(|f| content.contains(f.as_str()))
                .cloned()
                .collect()
        })
        .collect();
    if matched.iter().all(Vec::is_empty) {
        return (candidates, true);
    }

    let kept = candidates
        .into_iter()
        .zip(matched)
        .filter(|(_, m)| !m.is_empty())
        .map(|(mut c, m)| {
            c.matched_keywords = m;
            c
        })
        .collect();
    (kept, false)
}

/// Composite relevance of one candidate for an analysed query.
pub fn composite_score(candidate: &SearchCandidate, query: &QueryAnalysis) -> ScoreBreakdown {
    let meta = &candidate.chunk.metadata;

    let intent_boost = match query.intent {
        QueryIntent::Example if meta.content_type == ContentType::Example => INTENT_MATCH_BOOST,
        QueryIntent::ApiReference if meta.content_type == ContentType::ApiReference => {
            INTENT_MATCH_BOOST
        }
        QueryIntent::HowTo
            if matches!(meta.content_type, ContentType::Tutorial | ContentType::Guide) =>
        {
            HOW_TO_BOOST
        }
        QueryIntent::CodeGeneration if meta.has_code_examples => CODE_GENERATION_BOOST,
        _ => 0.0,
    };
    let code_boost = if query.is_code_query && meta.is_code {
        CODE_QUERY_BOOST
    } else {
        0.0
    };
    let keyword_boost =
        (candidate.matched_keywords.len() as f64 * KEYWORD_BOOST_PER_MATCH).min(KEYWORD_BOOST_CAP);
    let difficulty_boost = if query.difficulty_preference == meta.difficulty_level {
        DIFFICULTY_BOOST
    } else {
        0.0
    };
    let length_penalty = if candidate.chunk.content.chars().count() < SHORT_CONTENT_CHARS {
        -SHORT_CONTENT_PENALTY
    } else {
        0.0
    };

    let raw = candidate.similarity_score
        + intent_boost
        + code_boost
        + keyword_boost
        + difficulty_boost
        + length_penalty;

    ScoreBreakdown {
        similarity: candidate.similarity_score,
        intent_boost,
        code_boost,
        keyword_boost,
        difficulty_boost,
        length_penalty,
        total: raw.clamp(0.0, 1.0),
    }
}

/// Score and sort candidates, best first; ties keep input order.
pub fn rank_candidates(
    candidates: Vec<SearchCandidate>,
    query: &QueryAnalysis,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| ScoredCandidate {
            score: composite_score(&candidate, query),
            candidate,
        })
        .collect();
    scored.sort_by(|a, b| {
        b.relevance()
            .partial_cmp(&a.relevance())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// Greedy token-budgeted selection over a ranked list.
///
/// A candidate that does not fit is skipped and scanning continues, until
/// `max_chunks` are accepted. If the very first candidate exceeds
/// `max_tokens` on its own it is accepted alone.
pub fn select_within_budget(
    ranked: Vec<ScoredCandidate>,
    max_chunks: usize,
    max_tokens: usize,
) -> Vec<ScoredCandidate> {
    let mut selected: Vec<ScoredCandidate> = Vec::new();
    let mut total_tokens = 0usize;

    for candidate in ranked {
        if selected.len() >= max_chunks && !selected.is_empty() {
            break;
        }
        let tokens = candidate.token_count();
        if total_tokens + tokens <= max_tokens && selected.len() < max_chunks {
            total_tokens += tokens;
            selected.push(candidate);
        } else if selected.is_empty() {
            selected.push(candidate);
            break;
        }
    }
    selected
}

/// Drop near-duplicates from a ranked list, keeping the first of each group.
pub fn diversify(ranked: Vec<ScoredCandidate>, params: &DiversityParams) -> Vec<ScoredCandidate> {
    let mut kept: Vec<ScoredCandidate> = Vec::new();
    let mut kept_words: Vec<HashSet<String>> = Vec::new();

    for candidate in ranked {
        if params.max_kept.is_some_and(|cap| kept.len() >= cap) {
            break;
        }
        let words = word_set(&candidate.candidate.chunk.content);
        let duplicate = kept_words
            .iter()
            .any(|other| jaccard(&words, other) > params.threshold);
        if !duplicate {
            kept_words.push(words);
            kept.push(candidate);
        }
    }
    kept
}

/// Jaccard similarity of the lowercase whitespace-separated word sets.
///
/// Returns 0.0 when either text has no words.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    jaccard(&word_set(a), &word_set(b))
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Run the full fusion pipeline over vector-index candidates.
pub fn fuse(
    candidates: Vec<SearchCandidate>,
    query: &QueryAnalysis,
    keyword_filters: &[String],
    params: &FusionParams,
) -> FusionOutcome {
    let fetched = candidates.len();
    let thresholded = apply_threshold(candidates, params.similarity_threshold);
    let above_threshold = thresholded.len();
    let (filtered, keyword_fallback) = apply_keyword_filters(thresholded, keyword_filters);

    let mut ranked = rank_candidates(filtered, query);
    if let Some(diversity) = &params.diversity {
        ranked = diversify(ranked, diversity);
    }
    let selected = select_within_budget(ranked, params.max_chunks, params.max_tokens);

    debug!(
        fetched,
        above_threshold,
        keyword_fallback,
        selected = selected.len(),
        "fusion finished"
    );
    FusionOutcome {
        selected,
        above_threshold,
        keyword_fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata, Difficulty};
    use crate::query::analyze_query;
    use proptest::prelude::*;

    fn candidate(id: &str, content: &str, ct: ContentType, sim: f64, tokens: usize) -> SearchCandidate {
        SearchCandidate::new(
            Chunk {
                chunk_id: id.to_string(),
                content: content.to_string(),
                metadata: ChunkMetadata {
                    document_url: format!("https://x.dev/{}.html", id),
                    document_title: id.to_string(),
                    content_type: ct,
                    token_count: tokens,
                    ..Default::default()
                },
                token_count: tokens,
                embedding: None,
            },
            sim,
        )
    }

    fn long_text(topic: &str) -> String {
        format!(
            "{} is described here at length so that the content is well over one hundred characters long in total.",
            topic
        )
    }

    fn ids(selected: &[ScoredCandidate]) -> Vec<&str> {
        selected
            .iter()
            .map(|s| s.candidate.chunk.chunk_id.as_str())
            .collect()
    }

    #[test]
    fn test_how_to_prefers_tutorial() {
        let qa = analyze_query("How do I create a quantum circuit?");
        assert_eq!(qa.intent, QueryIntent::HowTo);
        let cands = vec![
            candidate("api", &long_text("circuit api"), ContentType::ApiReference, 0.70, 50),
            candidate("tut", &long_text("circuit tutorial"), ContentType::Tutorial, 0.72, 50),
        ];
        let ranked = rank_candidates(cands, &qa);
        assert_eq!(ids(&ranked), vec!["tut", "api"]);
        assert!((ranked[0].score.intent_boost - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_budget_cutoff_before_count_cap() {
        let qa = analyze_query("kernels");
        let cands: Vec<SearchCandidate> = (0..5)
            .map(|i| {
                candidate(
                    &format!("c{}", i),
                    &long_text(&format!("topic {}", i)),
                    ContentType::Documentation,
                    0.9 - i as f64 * 0.01,
                    40,
                )
            })
            .collect();
        let params = FusionParams {
            similarity_threshold: 0.5,
            max_chunks: 3,
            max_tokens: 100,
            diversity: None,
        };
        let outcome = fuse(cands, &qa, &[], &params);
        assert_eq!(ids(&outcome.selected), vec!["c0", "c1"]);
    }

    #[test]
    fn test_single_chunk_overflow() {
        let qa = analyze_query("kernels");
        let cands = vec![
            candidate("big", &long_text("big"), ContentType::Documentation, 0.9, 500),
            candidate("small", &long_text("small"), ContentType::Documentation, 0.8, 10),
        ];
        let ranked = rank_candidates(cands, &qa);
        let selected = select_within_budget(ranked, 5, 100);
        assert_eq!(ids(&selected), vec!["big"]);
    }

    #[test]
    fn test_selection_skips_oversized_and_continues() {
        let qa = analyze_query("kernels");
        let cands = vec![
            candidate("a", &long_text("a"), ContentType::Documentation, 0.9, 60),
            candidate("b", &long_text("b"), ContentType::Documentation, 0.8, 60),
            candidate("c", &long_text("c"), ContentType::Documentation, 0.7, 30),
        ];
        let selected = select_within_budget(rank_candidates(cands, &qa), 5, 100);
        assert_eq!(ids(&selected), vec!["a", "c"]);
    }

    #[test]
    fn test_threshold_and_empty_input() {
        let qa = analyze_query("kernels");
        let cands = vec![candidate("low", &long_text("low"), ContentType::Documentation, 0.3, 10)];
        let outcome = fuse(cands, &qa, &[], &FusionParams::default());
        assert!(outcome.selected.is_empty());
        assert_eq!(outcome.above_threshold, 0);
        assert!(fuse(Vec::new(), &qa, &[], &FusionParams::default()).selected.is_empty());
    }

    #[test]
    fn test_keyword_filter_records_matches_and_falls_back() {
        let cands = vec![
            candidate("a", "Sampling with cudaq.sample returns counts.", ContentType::Documentation, 0.8, 10),
            candidate("b", "Observe computes expectation values.", ContentType::Documentation, 0.8, 10),
        ];
        let filters = vec!["SAMPLE".to_string(), "counts".to_string()];
        let (kept, fallback) = apply_keyword_filters(cands.clone(), &filters);
        assert!(!fallback);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].matched_keywords, vec!["sample", "counts"]);

        let (kept, fallback) = apply_keyword_filters(cands, &["tensor".to_string()]);
        assert!(fallback);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|c| c.matched_keywords.is_empty()));
    }

    #[test]
    fn test_score_components() {
        let mut qa = analyze_query("write code for a simple kernel");
        assert!(qa.is_code_query);
        assert_eq!(qa.difficulty_preference, Difficulty::Beginner);
        qa.intent = QueryIntent::CodeGeneration;

        let mut c = candidate("k", "short", ContentType::Code, 0.5, 5);
        c.chunk.metadata.is_code = true;
        c.chunk.metadata.has_code_examples = true;
        c.chunk.metadata.difficulty_level = Difficulty::Beginner;
        c.matched_keywords = vec!["a".into(), "b".into(), "c".into(), "d".into()];

        let s = composite_score(&c, &qa);
        assert_eq!(s.intent_boost, CODE_GENERATION_BOOST);
        assert_eq!(s.code_boost, CODE_QUERY_BOOST);
        assert_eq!(s.keyword_boost, KEYWORD_BOOST_CAP);
        assert_eq!(s.difficulty_boost, DIFFICULTY_BOOST);
        assert_eq!(s.length_penalty, -SHORT_CONTENT_PENALTY);
        assert!((s.total - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped() {
        let qa = analyze_query("show me an example");
        let c = candidate("e", &long_text("example"), ContentType::Example, 0.98, 5);
        assert_eq!(composite_score(&c, &qa).total, 1.0);
        let c = candidate("n", "tiny", ContentType::Documentation, 0.0, 5);
        let mut qa = qa;
        qa.difficulty_preference = Difficulty::Advanced;
        assert_eq!(composite_score(&c, &qa).total, 0.0);
    }

    #[test]
    fn test_diversity_drops_near_duplicates() {
        let qa = analyze_query("kernels");
        let text = long_text("kernels");
        let cands = vec![
            candidate("a", &text, ContentType::Documentation, 0.9, 10),
            candidate("a2", &format!("{} extra", text), ContentType::Documentation, 0.85, 10),
            candidate("b", &long_text("observables and spin operators"), ContentType::Documentation, 0.8, 10),
        ];
        let kept = diversify(rank_candidates(cands.clone(), &qa), &DiversityParams::default());
        assert_eq!(ids(&kept), vec!["a", "b"]);

        let capped = diversify(
            rank_candidates(cands, &qa),
            &DiversityParams {
                threshold: 0.8,
                max_kept: Some(1),
            },
        );
        assert_eq!(ids(&capped), vec!["a"]);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard_similarity("a b", ""), 0.0);
        assert_eq!(jaccard_similarity("A b", "a B"), 1.0);
        assert!((jaccard_similarity("a b c", "b c d") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_overfetch_size() {
        assert_eq!(overfetch_size(10, 3, 50), 30);
        assert_eq!(overfetch_size(20, 3, 50), 50);
        assert_eq!(overfetch_size(60, 3, 50), 60);
    }

    fn arb_candidates() -> impl Strategy<Value = Vec<SearchCandidate>> {
        prop::collection::vec((0.0f64..1.0, 1usize..200, 0usize..4, 0usize..250), 0..25).prop_map(
            |specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (sim, tokens, ct, len))| {
                        let ct = [
                            ContentType::Documentation,
                            ContentType::Tutorial,
                            ContentType::ApiReference,
                            ContentType::Code,
                        ][ct];
                        candidate(&format!("c{}", i), &"x".repeat(len), ct, sim, tokens)
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_budget_respected(cands in arb_candidates(), max_chunks in 1usize..8, max_tokens in 1usize..600) {
            let qa = analyze_query("how to build a circuit");
            let ranked = rank_candidates(cands, &qa);
            let selected = select_within_budget(ranked, max_chunks, max_tokens);
            prop_assert!(selected.len() <= max_chunks);
            let total: usize = selected.iter().map(|s| s.token_count()).sum();
            prop_assert!(total <= max_tokens || selected.len() == 1);
        }

        #[test]
        fn prop_fusion_idempotent(cands in arb_candidates()) {
            let qa = analyze_query("api reference for sample");
            let params = FusionParams { similarity_threshold: 0.2, ..Default::default() };
            let a = fuse(cands.clone(), &qa, &[], &params);
            let b = fuse(cands, &qa, &[], &params);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_rank_monotonic_in_similarity(cands in arb_candidates(), pick in 0usize..25, bump in 0.0f64..0.5) {
            prop_assume!(!cands.is_empty());
            let pick = pick % cands.len();
            let qa = analyze_query("how to build a circuit");
            let target = cands[pick].chunk.chunk_id.clone();
            let position = |ranked: &[ScoredCandidate]| {
                ranked.iter().position(|s| s.candidate.chunk.chunk_id == target).unwrap()
            };

            let before = position(&rank_candidates(cands.clone(), &qa));
            let mut raised = cands;
            raised[pick].similarity_score = (raised[pick].similarity_score + bump).min(1.0);
            let after = position(&rank_candidates(raised, &qa));
            prop_assert!(after <= before);
        }
    }
}
