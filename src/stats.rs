//! Corpus and chunk statistics.
//!
//! A quick summary of what a processing run produced: document and chunk
//! counts, token totals, and breakdowns by content type and category.
//! Useful for checking that filtering and chunking settings behave as
//! expected before a corpus is indexed.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use docrank_core::models::{Chunk, RawDocument};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub documents: usize,
    pub chunks: usize,
    pub total_words: usize,
    pub total_tokens: usize,
    pub code_chunks: usize,
    pub text_chunks: usize,
    pub by_content_type: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

impl ProcessingStats {
    pub fn collect(documents: &[RawDocument], chunks: &[Chunk]) -> Self {
        let mut stats = ProcessingStats {
            documents: documents.len(),
            chunks: chunks.len(),
            total_words: documents.iter().map(|d| d.word_count).sum(),
            ..Default::default()
        };

        for chunk in chunks {
            stats.total_tokens += chunk.token_count;
            if chunk.metadata.is_code {
                stats.code_chunks += 1;
            } else {
                stats.text_chunks += 1;
            }
            *stats
                .by_content_type
                .entry(chunk.metadata.content_type.as_str().to_string())
                .or_default() += 1;
            let category = if chunk.metadata.category.is_empty() {
                "uncategorized".to_string()
            } else {
                chunk.metadata.category.clone()
            };
            *stats.by_category.entry(category).or_default() += 1;
        }
        stats
    }

    pub fn avg_tokens_per_chunk(&self) -> f64 {
        if self.chunks == 0 {
            0.0
        } else {
            self.total_tokens as f64 / self.chunks as f64
        }
    }
}

impl fmt::Display for ProcessingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processing Stats")?;
        writeln!(f, "================")?;
        writeln!(f)?;
        writeln!(f, "  Documents:   {}", self.documents)?;
        writeln!(f, "  Words:       {}", self.total_words)?;
        writeln!(
            f,
            "  Chunks:      {} ({} text, {} code)",
            self.chunks, self.text_chunks, self.code_chunks
        )?;
        writeln!(f, "  Tokens:      {}", self.total_tokens)?;
        writeln!(f, "  Avg tokens:  {:.1}", self.avg_tokens_per_chunk())?;

        for (label, counts) in [
            ("By content type:", &self.by_content_type),
            ("By category:", &self.by_category),
        ] {
            if counts.is_empty() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "  {}", label)?;
            let mut rows: Vec<(&String, &usize)> = counts.iter().collect();
            rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (name, count) in rows {
                writeln!(f, "  {:<24} {:>6}", name, count)?;
            }
        }
        Ok(())
    }
}
