//! Hierarchical document map.
//!
//! Mirrors the URL path structure of a crawled corpus as a directory tree
//! and keeps a flat `doc_id → record` lookup beside it. Routing layers use
//! the tree to pick a subtree, then pass the ids under it to the keyword
//! index to scope literal and ranked searches.
//!
//! Document ids are positional (`doc_{i}` over the input order), so a map
//! rebuilt from the same document list yields the same ids.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Header, RawDocument};

/// Number of header texts kept on a tree entry.
const TREE_HEADER_PREVIEW: usize = 5;

/// One directory level of the URL tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    #[serde(rename = "_subdirs", default)]
    pub subdirs: BTreeMap<String, DirEntry>,
    #[serde(rename = "_documents", default)]
    pub documents: Vec<DocumentRef>,
}

/// A document as listed inside the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub doc_id: String,
    pub title: String,
    pub url: String,
    pub filename: String,
    pub word_count: usize,
    pub headers: Vec<String>,
}

/// Full document data in the flat lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub code_blocks: Vec<String>,
    pub headers: Vec<Header>,
    pub word_count: usize,
    /// URL path without the leading slash, e.g. `latest/api/python.html`.
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMap {
    pub hierarchy: DirEntry,
    /// Records in doc id order.
    pub documents: Vec<DocumentRecord>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl DocumentMap {
    /// Build the map from documents in input order.
    ///
    /// Documents with an empty URL are skipped but still consume their
    /// positional id.
    pub fn build(documents: &[RawDocument]) -> Self {
        let mut map = DocumentMap::default();

        for (idx, doc) in documents.iter().enumerate() {
            if doc.url.is_empty() {
                continue;
            }
            let doc_id = format!("doc_{}", idx);
            let (host, parts) = split_url(&doc.url);

            let mut level = &mut map.hierarchy;
            if let Some((_, dirs)) = parts.split_last() {
                for dir in dirs {
                    level = level.subdirs.entry(dir.to_string()).or_default();
                }
            }
            let filename = parts.last().copied().unwrap_or(host).to_string();
            level.documents.push(DocumentRef {
                doc_id: doc_id.clone(),
                title: if doc.title.is_empty() {
                    filename.clone()
                } else {
                    doc.title.clone()
                },
                url: doc.url.clone(),
                filename,
                word_count: doc.word_count,
                headers: doc
                    .headers
                    .iter()
                    .take(TREE_HEADER_PREVIEW)
                    .map(|h| h.text.clone())
                    .collect(),
            });

            map.documents.push(DocumentRecord {
                doc_id,
                url: doc.url.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
                code_blocks: doc.code_blocks.clone(),
                headers: doc.headers.clone(),
                word_count: doc.word_count,
                path: parts.join("/"),
            });
        }

        map.reindex();
        map
    }

    /// Parse a map previously written with `serde_json`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut map: DocumentMap = serde_json::from_str(json)?;
        map.reindex();
        Ok(map)
    }

    fn reindex(&mut self) {
        self.index = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.doc_id.clone(), i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, doc_id: &str) -> Option<&DocumentRecord> {
        self.index.get(doc_id).map(|&i| &self.documents[i])
    }

    /// Resolve an optional id filter to records, in first-seen filter order.
    ///
    /// `None` or an empty filter selects every document; unknown and
    /// repeated ids are skipped.
    pub fn select<'a>(&'a self, doc_ids: Option<&[String]>) -> Vec<&'a DocumentRecord> {
        match doc_ids {
            Some(ids) if !ids.is_empty() => {
                let mut seen = HashSet::new();
                ids.iter()
                    .filter_map(|id| self.index.get(id.as_str()).copied())
                    .filter(|&i| seen.insert(i))
                    .map(|i| &self.documents[i])
                    .collect()
            }
            _ => self.documents.iter().collect(),
        }
    }

    /// Every doc id at or below a `/`-separated directory path.
    ///
    /// An empty path means the whole corpus. Returns an empty list when the
    /// path does not exist.
    pub fn doc_ids_under(&self, path: &str) -> Vec<String> {
        let mut level = &self.hierarchy;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            match level.subdirs.get(part) {
                Some(next) => level = next,
                None => return Vec::new(),
            }
        }
        let mut ids = Vec::new();
        collect_ids(level, &mut ids);
        ids
    }
}

fn collect_ids(entry: &DirEntry, out: &mut Vec<String>) {
    out.extend(entry.documents.iter().map(|d| d.doc_id.clone()));
    for sub in entry.subdirs.values() {
        collect_ids(sub, out);
    }
}

/// Split a URL into its host and non-empty path segments.
///
/// Query strings and fragments are dropped.
fn split_url(url: &str) -> (&str, Vec<&str>) {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    (host, path.split('/').filter(|p| !p.is_empty()).collect())
}
