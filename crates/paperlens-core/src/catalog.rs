//! The evidence catalog: the only sources a synthesis may cite.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ChunkId, ChunkSummary};

static CHUNK_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bC(\d{3,})\b").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub chunk_id: ChunkId,
    pub evidence_pointer: String,
}

/// Ordered `chunk_id -> evidence pointer` pairs for one paper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceCatalog {
    entries: Vec<CatalogEntry>,
}

impl EvidenceCatalog {
    pub fn from_summaries(summaries: &[ChunkSummary]) -> Self {
        Self {
            entries: summaries
                .iter()
                .map(|s| CatalogEntry {
                    chunk_id: s.chunk_id,
                    evidence_pointer: s.evidence_pointer.clone(),
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.entries.iter().any(|e| e.chunk_id == id)
    }

    /// One `- C001: (pointer)` line per entry.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("- {}: {}", e.chunk_id, e.evidence_pointer))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Chunk ids cited in `text` that are not in the catalog, deduplicated and sorted.
    pub fn unknown_refs(&self, text: &str) -> Vec<ChunkId> {
        CHUNK_REF
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .map(ChunkId)
            .filter(|id| !self.contains(*id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkFacts;

    fn summary(id: u32, pointer: &str) -> ChunkSummary {
        ChunkSummary {
            chunk_id: ChunkId(id),
            evidence_pointer: pointer.into(),
            facts: ChunkFacts::default(),
            degraded: false,
        }
    }

    #[test]
    fn renders_in_chunk_order() {
        let catalog = EvidenceCatalog::from_summaries(&[
            summary(1, "(Intro, paragraphs 1-3, anchor S1)"),
            summary(2, "(pages 4-5)"),
        ]);
        assert_eq!(
            catalog.render(),
            "- C001: (Intro, paragraphs 1-3, anchor S1)\n- C002: (pages 4-5)"
        );
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn flags_refs_outside_catalog() {
        let catalog = EvidenceCatalog::from_summaries(&[summary(1, "a"), summary(2, "b")]);
        let text = "See C001 and C002; also C007, C007 again, and C012. Not C1 nor ABC003.";
        assert_eq!(catalog.unknown_refs(text), vec![ChunkId(7), ChunkId(12)]);
        assert!(catalog.unknown_refs("only C002 (pages 1-2)").is_empty());
    }

    #[test]
    fn empty_catalog() {
        let catalog = EvidenceCatalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.render(), "");
    }
}
