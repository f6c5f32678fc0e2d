//! Crawled corpus loading.
//!
//! Walks `corpus.root`, selects files with the include/exclude globs, and
//! parses each as crawler output: either a JSON array of documents or a
//! single document object. Files are read in sorted relative-path order so
//! the resulting document list (and therefore every positional doc id) is
//! deterministic.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use docrank_core::models::RawDocument;

use crate::config::CorpusConfig;

#[derive(Deserialize)]
#[serde(untagged)]
enum CrawlFile {
    Many(Vec<RawDocument>),
    One(RawDocument),
}

/// Load every document under the corpus root.
///
/// Documents whose URL was already seen in an earlier file are dropped.
/// When `filter_documents` is set, documents are cleaned and filtered with
/// the configured relevance rules.
pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<RawDocument>> {
    let files = scan_corpus_files(config)?;
    let mut seen = HashSet::new();
    let mut documents = Vec::new();

    for path in &files {
        for doc in read_documents(path)? {
            if seen.insert(doc.url.clone()) {
                documents.push(doc);
            } else {
                debug!(url = %doc.url, "duplicate document skipped");
            }
        }
    }

    let loaded = documents.len();
    if config.filter_documents {
        documents = config.relevance_filter().apply(documents);
    }
    info!(
        files = files.len(),
        loaded,
        kept = documents.len(),
        "corpus loaded"
    );
    Ok(documents)
}

/// Matching corpus files, sorted by path relative to the root.
pub fn scan_corpus_files(config: &CorpusConfig) -> Result<Vec<PathBuf>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

/// Parse one crawler output file.
pub fn read_documents(path: &Path) -> Result<Vec<RawDocument>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let parsed: CrawlFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?;
    let docs = match parsed {
        CrawlFile::Many(docs) => docs,
        CrawlFile::One(doc) => vec![doc],
    };
    Ok(docs
        .into_iter()
        .filter(|d| {
            if d.url.is_empty() {
                warn!(file = %path.display(), "document without url skipped");
                false
            } else {
                true
            }
        })
        .collect())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn config(root: &Path) -> CorpusConfig {
        CorpusConfig {
            root: root.to_path_buf(),
            filter_documents: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_loads_arrays_and_single_objects_in_path_order() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "b/site.json",
            r#"[{"url": "https://x.dev/b1"}, {"url": "https://x.dev/b2"}]"#,
        );
        write(tmp.path(), "a.json", r#"{"url": "https://x.dev/a", "title": "A"}"#);
        write(tmp.path(), "notes.txt", "ignored");

        let docs = load_corpus(&config(tmp.path())).unwrap();
        let urls: Vec<&str> = docs.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.dev/a", "https://x.dev/b1", "https://x.dev/b2"]);
    }

    #[test]
    fn test_duplicates_and_missing_urls_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1.json", r#"[{"url": "https://x.dev/a"}, {"url": ""}]"#);
        write(tmp.path(), "2.json", r#"[{"url": "https://x.dev/a", "title": "dup"}]"#);
        let docs = load_corpus(&config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "");
    }

    #[test]
    fn test_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "keep.json", r#"{"url": "https://x.dev/k"}"#);
        write(tmp.path(), "old/skip.json", r#"{"url": "https://x.dev/s"}"#);
        let mut cfg = config(tmp.path());
        cfg.exclude_globs = vec!["old/**".to_string()];
        assert_eq!(load_corpus(&cfg).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_root_and_bad_json_fail() {
        let tmp = TempDir::new().unwrap();
        assert!(load_corpus(&config(&tmp.path().join("nope"))).is_err());
        write(tmp.path(), "bad.json", "{not json");
        let err = load_corpus(&config(tmp.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse corpus file"));
    }
}
