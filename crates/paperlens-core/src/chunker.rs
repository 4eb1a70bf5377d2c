//! Greedy, structure-aligned packing of an extraction into [`TextChunk`]s.
//!
//! Size accounting covers the whole chunk text, header and separators
//! included, so a chunk only exceeds `max_chars` when a single paragraph or
//! page is too long on its own.

use crate::text_utils::{char_len, truncate_chars};
use crate::{
    ChunkId, EvidencePointer, ExtractedBody, ExtractionResult, HtmlSection, PdfPage, TextChunk,
};

/// Split `result` into chunks with sequential ids starting at `C001`.
///
/// Falls back to one truncated chunk of `full_text` when the structured body
/// yields nothing.
pub fn chunk(result: &ExtractionResult, max_chars: usize) -> Vec<TextChunk> {
    let mut ids = IdSequence::default();
    let chunks = match &result.body {
        ExtractedBody::Html(sections) => chunk_sections(sections, max_chars, &mut ids),
        ExtractedBody::Pdf(pages) => chunk_pages(pages, max_chars, &mut ids),
    };
    if !chunks.is_empty() {
        return chunks;
    }

    tracing::debug!(
        source_url = %result.source_url,
        "no structured chunks, using truncated body"
    );
    vec![TextChunk {
        id: ChunkId::first(),
        text: truncate_chars(&result.full_text, max_chars).to_string(),
        evidence: EvidencePointer::Unsegmented,
    }]
}

#[derive(Default)]
struct IdSequence {
    last: Option<ChunkId>,
}

impl IdSequence {
    fn next(&mut self) -> ChunkId {
        let id = self.last.map_or_else(ChunkId::first, ChunkId::next);
        self.last = Some(id);
        id
    }
}

fn chunk_sections(
    sections: &[HtmlSection],
    max_chars: usize,
    ids: &mut IdSequence,
) -> Vec<TextChunk> {
    let mut chunks = Vec::new();

    for section in sections.iter().filter(|s| !s.paragraphs.is_empty()) {
        let header = format!("Section: {}\n", section.heading);
        let header_len = char_len(&header);
        let anchor = (!section.anchor_id.is_empty()).then(|| section.anchor_id.clone());

        let emit = |chunks: &mut Vec<TextChunk>,
                    ids: &mut IdSequence,
                    first: usize,
                    paras: &[String]| {
            chunks.push(TextChunk {
                id: ids.next(),
                text: format!("{header}{}", paras.join("\n")),
                evidence: EvidencePointer::Section {
                    heading: section.heading.clone(),
                    first_paragraph: first,
                    last_paragraph: first + paras.len() - 1,
                    anchor: anchor.clone(),
                },
            });
        };

        let mut start = 0;
        // Each packed paragraph costs its length plus one separator.
        let mut packed_len = 0;
        for (i, para) in section.paragraphs.iter().enumerate() {
            let len = char_len(para);
            if i > start && header_len + packed_len + len > max_chars {
                emit(&mut chunks, ids, start + 1, &section.paragraphs[start..i]);
                start = i;
                packed_len = 0;
            }
            packed_len += len + 1;
        }
        emit(&mut chunks, ids, start + 1, &section.paragraphs[start..]);
    }

    chunks
}

fn chunk_pages(pages: &[PdfPage], max_chars: usize, ids: &mut IdSequence) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut first_page = 0;
    let mut last_page = 0;
    let mut packed_len = 0;

    let mut flush = |current: &mut Vec<String>, first: usize, last: usize| {
        if current.is_empty() {
            return;
        }
        chunks.push(TextChunk {
            id: ids.next(),
            text: current.join("\n"),
            evidence: EvidencePointer::Pages { first, last },
        });
        current.clear();
    };

    for page in pages {
        let line = format!("[Page {}] {}", page.number, page.text);
        let cost = char_len(&line) + 1;
        if !current.is_empty() && packed_len + cost - 1 > max_chars {
            flush(&mut current, first_page, last_page);
            packed_len = 0;
        }
        if current.is_empty() {
            first_page = page.number;
        }
        last_page = page.number;
        packed_len += cost;
        current.push(line);
    }
    flush(&mut current, first_page, last_page);

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::assemble_pdf;

    fn html(sections: Vec<HtmlSection>) -> ExtractionResult {
        ExtractionResult {
            source_url: "u".into(),
            full_text: crate::extract::html::sections_full_text(&sections),
            body: ExtractedBody::Html(sections),
        }
    }

    fn section(heading: &str, anchor: &str, paragraphs: &[String]) -> HtmlSection {
        HtmlSection {
            heading: heading.into(),
            anchor_id: anchor.into(),
            paragraphs: paragraphs.to_vec(),
        }
    }

    fn ids(chunks: &[TextChunk]) -> Vec<String> {
        chunks.iter().map(|c| c.id.to_string()).collect()
    }

    // ── HTML ──────────────────────────────────────────────────────────

    #[test]
    fn packs_paragraphs_within_section() {
        let paras: Vec<String> = (0..5).map(|i| format!("{i}").repeat(30)).collect();
        let result = html(vec![section("Method", "S3", &paras)]);
        // header (16) + two paragraphs (30 + 1 + 30) = 77 fits, a third would not
        let chunks = chunk(&result, 80);

        assert_eq!(ids(&chunks), vec!["C001", "C002", "C003"]);
        assert_eq!(chunks[0].evidence.to_string(), "(Method, paragraphs 1-2, anchor S3)");
        assert_eq!(chunks[2].evidence.to_string(), "(Method, paragraphs 5-5, anchor S3)");
        assert!(chunks[0].text.starts_with("Section: Method\n000"));
        for c in &chunks {
            assert!(char_len(&c.text) <= 80, "{} too long", c.id);
        }
    }

    #[test]
    fn oversized_paragraph_gets_own_chunk() {
        let paras = vec!["short paragraph".to_string(), "x".repeat(500), "tail".to_string()];
        let result = html(vec![section("Intro", "", &paras)]);
        let chunks = chunk(&result, 100);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].evidence.to_string(), "(Intro, paragraphs 2-2, anchor N/A)");
        assert!(char_len(&chunks[1].text) > 100);
    }

    #[test]
    fn ids_continue_across_sections() {
        let result = html(vec![
            section("Intro", "S1", &["a".repeat(50)]),
            section("Empty", "S2", &[]),
            section("Method", "S3", &["b".repeat(50)]),
        ]);
        let chunks = chunk(&result, 1000);
        assert_eq!(ids(&chunks), vec!["C001", "C002"]);
        assert_eq!(chunks[1].evidence.to_string(), "(Method, paragraphs 1-1, anchor S3)");
    }

    // ── PDF ───────────────────────────────────────────────────────────

    #[test]
    fn packs_pages_by_range() {
        let result = assemble_pdf(
            vec!["a".repeat(40), "b".repeat(40), String::new(), "c".repeat(40)],
            "u".into(),
        );
        // "[Page 1] " + 40 = 49 per line; two lines joined = 99
        let chunks = chunk(&result, 100);

        assert_eq!(ids(&chunks), vec!["C001", "C002"]);
        assert_eq!(chunks[0].evidence.to_string(), "(pages 1-2)");
        assert_eq!(chunks[1].evidence.to_string(), "(pages 4-4)");
        assert_eq!(char_len(&chunks[0].text), 99);
        assert!(chunks[0].text.contains("\n[Page 2] bbb"));
    }

    #[test]
    fn page_limit_is_inclusive() {
        let result = assemble_pdf(vec!["a".repeat(40), "b".repeat(40)], "u".into());
        assert_eq!(chunk(&result, 99).len(), 1);
        assert_eq!(chunk(&result, 98).len(), 2);
    }

    // ── fallback ──────────────────────────────────────────────────────

    #[test]
    fn empty_structure_falls_back_to_truncated_body() {
        let result = ExtractionResult {
            source_url: "u".into(),
            full_text: "é".repeat(30),
            body: ExtractedBody::Pdf(vec![]),
        };
        let chunks = chunk(&result, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id.to_string(), "C001");
        assert_eq!(chunks[0].text, "é".repeat(10));
        assert_eq!(chunks[0].evidence, EvidencePointer::Unsegmented);
    }
}
