//! Document profiling, cleaning, and relevance filtering.
//!
//! A [`DocumentProfile`] classifies a crawled page from its URL, title,
//! headers, and body: where it sits in the site (category/subcategory),
//! what kind of page it is ([`ContentType`]), how hard it reads
//! ([`Difficulty`]), and which keywords and technologies it mentions. The
//! chunker stamps the profile into every chunk's metadata so the ranking
//! stage can boost on it without going back to the document.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::models::{ContentType, Difficulty, RawDocument};

/// URL path segments that name a documentation category.
const CATEGORY_SEGMENTS: &[&str] = &["api", "examples", "tutorials", "guides", "reference"];

const KEYWORD_STOP_WORDS: &[&str] = &[
    "with", "from", "this", "that", "they", "them", "their", "there", "where", "when", "what",
    "which", "will", "would", "could", "should",
];

const MAX_KEYWORDS: usize = 20;

const TECHNOLOGY_PATTERNS: &[(&str, &[&str])] = &[
    ("cuda-q", &["cuda-q", "cudaq"]),
    ("python", &["python", "py"]),
    ("c++", &["c++", "cpp", "cxx"]),
    ("cuda", &["cuda", "gpu"]),
    ("quantum", &["quantum", "qubit", "quantum computing"]),
    ("linear_algebra", &["matrix", "vector", "linear algebra"]),
    ("simulation", &["simulation", "simulator"]),
    ("optimization", &["optimization", "optimizer"]),
    ("machine_learning", &["machine learning", "ml", "neural network"]),
    ("docker", &["docker", "container"]),
    ("cmake", &["cmake", "makefile"]),
    ("git", &["git", "github", "version control"]),
];

const BEGINNER_TITLE_TERMS: &[&str] = &[
    "introduction",
    "getting started",
    "basics",
    "overview",
    "first",
    "simple",
    "basic",
];

const ADVANCED_TERMS: &[&str] = &[
    "advanced",
    "optimization",
    "performance",
    "internals",
    "architecture",
    "deep dive",
];

const COMPLEXITY_INDICATORS: &[&str] = &["class", "template", "namespace", "algorithm", "complex"];

/// Navigation boilerplate removed by [`clean_content`].
const BOILERPLATE_PATTERNS: &[&str] = &[
    r"Table of Contents",
    r"Skip to main content",
    r"Previous\s*Next",
    r"Edit on GitHub",
    r"© \d{4}.*",
    r"All rights reserved",
];

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("valid blank-run regex"));
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid whitespace regex"));
static BOILERPLATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BOILERPLATE_PATTERNS
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("valid boilerplate regex")
        })
        .collect()
});

/// Document-level classification stamped into chunk metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentProfile {
    pub category: String,
    pub subcategory: String,
    pub content_type: ContentType,
    pub keywords: Vec<String>,
    pub technologies: Vec<String>,
    pub difficulty: Difficulty,
    pub has_code_examples: bool,
}

/// Classify a document from its URL, title, headers, and body.
pub fn profile_document(doc: &RawDocument) -> DocumentProfile {
    let (category, subcategory) = categorize_url(&doc.url);
    DocumentProfile {
        category,
        subcategory,
        content_type: classify_content_type(&doc.title, &doc.url),
        keywords: extract_keywords(doc),
        technologies: identify_technologies(&doc.content),
        difficulty: estimate_difficulty(&doc.content, &doc.title),
        has_code_examples: !doc.code_blocks.is_empty(),
    }
}

/// Category and subcategory from the first category-like URL segment.
///
/// `https://x/docs/api/languages/python_api.html` → `("api", "languages")`.
fn categorize_url(url: &str) -> (String, String) {
    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if CATEGORY_SEGMENTS.contains(part) {
            let subcategory = parts
                .get(i + 1)
                .map(|next| next.replace(".html", "").replace('_', " "))
                .unwrap_or_else(|| "overview".to_string());
            return (part.to_string(), subcategory);
        }
    }
    ("general".to_string(), "overview".to_string())
}

fn classify_content_type(title: &str, url: &str) -> ContentType {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    if title.contains("example") || url.contains("example") {
        ContentType::Example
    } else if url.contains("api") || url.contains("reference") {
        ContentType::ApiReference
    } else if title.contains("tutorial") || url.contains("tutorial") {
        ContentType::Tutorial
    } else if title.contains("guide") || url.contains("guide") {
        ContentType::Guide
    } else {
        ContentType::Documentation
    }
}

/// Keywords from the title and header words, longer than three characters.
///
/// Sorted and capped at twenty so the result does not depend on hash order.
fn extract_keywords(doc: &RawDocument) -> Vec<String> {
    let mut keywords = BTreeSet::new();
    let sources = std::iter::once(doc.title.as_str()).chain(doc.headers.iter().map(|h| h.text.as_str()));
    for text in sources {
        for word in text.split_whitespace() {
            let word = word
                .to_lowercase()
                .trim_matches(|c| ".,!?()[]".contains(c))
                .to_string();
            if word.chars().count() > 3 && !KEYWORD_STOP_WORDS.contains(&word.as_str()) {
                keywords.insert(word);
            }
        }
    }
    keywords.into_iter().take(MAX_KEYWORDS).collect()
}

fn identify_technologies(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    TECHNOLOGY_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(tech, _)| tech.to_string())
        .collect()
}

fn estimate_difficulty(content: &str, title: &str) -> Difficulty {
    let title = title.to_lowercase();
    let content = content.to_lowercase();

    if BEGINNER_TITLE_TERMS.iter().any(|t| title.contains(t)) {
        return Difficulty::Beginner;
    }
    if ADVANCED_TERMS
        .iter()
        .any(|t| title.contains(t) || content.contains(t))
    {
        return Difficulty::Advanced;
    }
    let complexity: usize = COMPLEXITY_INDICATORS
        .iter()
        .map(|i| content.matches(i).count())
        .sum();
    if complexity > 10 {
        return Difficulty::IntermediateAdvanced;
    }
    Difficulty::Intermediate
}

/// Normalize whitespace and strip navigation boilerplate from page text.
pub fn clean_content(content: &str) -> String {
    let collapsed = BLANK_RUNS.replace_all(content, "\n\n");
    let mut cleaned = HORIZONTAL_SPACE.replace_all(&collapsed, " ").into_owned();
    for pattern in BOILERPLATE.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}

/// Rules for dropping crawled pages that carry no useful documentation.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    pub min_word_count: usize,
    pub skip_patterns: Vec<String>,
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self {
            min_word_count: 50,
            skip_patterns: [
                "index",
                "sitemap",
                "search",
                "404",
                "error",
                "genindex",
                "modindex",
                "py-modindex",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl RelevanceFilter {
    /// Clean and keep the documents worth chunking, in input order.
    ///
    /// Kept documents have their `content` replaced by the cleaned text and
    /// `word_count` recomputed.
    pub fn apply(&self, documents: Vec<RawDocument>) -> Vec<RawDocument> {
        documents
            .into_iter()
            .filter_map(|doc| self.clean_if_relevant(doc))
            .collect()
    }

    fn clean_if_relevant(&self, mut doc: RawDocument) -> Option<RawDocument> {
        if doc.word_count < self.min_word_count {
            return None;
        }
        let title = doc.title.to_lowercase();
        let url = doc.url.to_lowercase();
        if self
            .skip_patterns
            .iter()
            .any(|p| title.contains(p.as_str()) || url.contains(p.as_str()))
        {
            return None;
        }
        let cleaned = clean_content(&doc.content);
        if cleaned.chars().count() < self.min_word_count * 5 {
            return None;
        }
        doc.word_count = cleaned.split_whitespace().count();
        doc.content = cleaned;
        Some(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Header;

    fn doc(url: &str, title: &str, content: &str) -> RawDocument {
        RawDocument {
            url: url.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            code_blocks: Vec::new(),
            headers: Vec::new(),
            word_count: content.split_whitespace().count(),
            content_hash: String::new(),
        }
    }

    #[test]
    fn test_category_from_url() {
        let d = doc(
            "https://nvidia.github.io/cuda-quantum/latest/api/languages/python_api.html",
            "Python API",
            "",
        );
        let p = profile_document(&d);
        assert_eq!(p.category, "api");
        assert_eq!(p.subcategory, "languages");
        assert_eq!(p.content_type, ContentType::ApiReference);
    }

    #[test]
    fn test_uncategorized_url() {
        let p = profile_document(&doc("https://x.dev/docs/install.html", "Install", ""));
        assert_eq!(p.category, "general");
        assert_eq!(p.subcategory, "overview");
        assert_eq!(p.content_type, ContentType::Documentation);
    }

    #[test]
    fn test_content_type_precedence() {
        assert_eq!(
            classify_content_type("VQE Example", "https://x.dev/api/vqe.html"),
            ContentType::Example
        );
        assert_eq!(
            classify_content_type("Quantum Tutorial", "https://x.dev/learn/q.html"),
            ContentType::Tutorial
        );
        assert_eq!(
            classify_content_type("Install guide", "https://x.dev/setup.html"),
            ContentType::Guide
        );
    }

    #[test]
    fn test_difficulty_levels() {
        assert_eq!(
            estimate_difficulty("anything", "Getting Started"),
            Difficulty::Beginner
        );
        assert_eq!(
            estimate_difficulty("tuning performance of kernels", "Kernels"),
            Difficulty::Advanced
        );
        let dense = "class template namespace algorithm ".repeat(3);
        assert_eq!(
            estimate_difficulty(&dense, "Kernels"),
            Difficulty::IntermediateAdvanced
        );
        assert_eq!(estimate_difficulty("plain text", "Kernels"), Difficulty::Intermediate);
    }

    #[test]
    fn test_keywords_from_title_and_headers() {
        let mut d = doc("https://x.dev/a.html", "Building Quantum Kernels", "");
        d.headers = vec![
            Header {
                level: 2,
                text: "Which (Simulator) targets?".to_string(),
                anchor_id: None,
            },
            Header {
                level: 2,
                text: "Kernels".to_string(),
                anchor_id: None,
            },
        ];
        let p = profile_document(&d);
        assert_eq!(
            p.keywords,
            vec!["building", "kernels", "quantum", "simulator", "targets"]
        );
    }

    #[test]
    fn test_technologies() {
        let techs = identify_technologies("Run cudaq on a GPU with Docker");
        assert!(techs.contains(&"cuda-q".to_string()));
        assert!(techs.contains(&"cuda".to_string()));
        assert!(techs.contains(&"docker".to_string()));
    }

    #[test]
    fn test_clean_content_strips_boilerplate() {
        let raw = "Skip to main content\nIntro   text\t here\n\n\n\nNext part\nEdit on GitHub";
        let cleaned = clean_content(raw);
        assert_eq!(cleaned, "Intro text here\n\nNext part");
    }

    #[test]
    fn test_relevance_filter() {
        let body = "Quantum kernels describe circuits in a typed language. ".repeat(20);
        let keep = doc("https://x.dev/guide/kernels.html", "Kernels", &body);
        let short = doc("https://x.dev/guide/short.html", "Short", "too short");
        let skipped = doc("https://x.dev/genindex.html", "Index", &body);

        let kept = RelevanceFilter::default().apply(vec![keep, short, skipped]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://x.dev/guide/kernels.html");
        assert_eq!(kept[0].word_count, kept[0].content.split_whitespace().count());
    }
}
