use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::ExtractError;
use crate::text_utils::{char_len, clean_text, truncate_chars};
use crate::{ExtractedBody, ExtractionResult, HtmlSection};

/// Paragraphs shorter than this (in characters) are treated as noise.
pub const MIN_PARAGRAPH_CHARS: usize = 40;
pub const MAX_HEADING_CHARS: usize = 180;

const FRONT_MATTER: &str = "Front Matter";
const NON_CONTENT_TAGS: [&str; 3] = ["script", "style", "noscript"];

/// Candidate content roots, most specific first.
static CONTENT_ROOTS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", "main", "div#content", "body"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, h4, p").unwrap());

/// Parse an HTML rendering and wrap its sections in an [`ExtractionResult`].
pub async fn extract_html(
    html: String,
    source_url: String,
) -> Result<ExtractionResult, ExtractError> {
    // Parse in spawn_blocking to avoid !Send scraper types
    let sections = tokio::task::spawn_blocking(move || parse_html(&html)).await?;
    let full_text = sections_full_text(&sections);
    tracing::debug!(
        source_url = %source_url,
        sections = sections.len(),
        chars = char_len(&full_text),
        "extracted HTML body"
    );
    Ok(ExtractionResult {
        source_url,
        full_text,
        body: ExtractedBody::Html(sections),
    })
}

/// Split a document into heading-delimited sections, in document order.
///
/// Text before the first heading lands in a "Front Matter" section. Sections
/// that end up with no retained paragraphs are dropped.
pub fn parse_html(html: &str) -> Vec<HtmlSection> {
    let document = Html::parse_document(html);
    let root = CONTENT_ROOTS
        .iter()
        .find_map(|sel| document.select(sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut sections = Vec::new();
    let mut current = HtmlSection {
        heading: FRONT_MATTER.to_string(),
        anchor_id: String::new(),
        paragraphs: Vec::new(),
    };

    for element in root.select(&BLOCKS) {
        if has_non_content_ancestor(element) {
            continue;
        }

        if element.value().name() == "p" {
            let text = visible_text(element);
            if char_len(&text) >= MIN_PARAGRAPH_CHARS {
                current.paragraphs.push(text);
            }
            continue;
        }

        let heading = visible_text(element);
        if heading.is_empty() {
            continue;
        }
        let next = HtmlSection {
            heading: truncate_chars(&heading, MAX_HEADING_CHARS).to_string(),
            anchor_id: anchor_for(element),
            paragraphs: Vec::new(),
        };
        let finished = std::mem::replace(&mut current, next);
        if !finished.paragraphs.is_empty() {
            sections.push(finished);
        }
    }

    if !current.paragraphs.is_empty() {
        sections.push(current);
    }
    sections
}

/// `"\n## heading"` lines followed by each section's paragraphs.
pub fn sections_full_text(sections: &[HtmlSection]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for section in sections {
        parts.push(format!("\n## {}", section.heading));
        parts.extend(section.paragraphs.iter().cloned());
    }
    parts.join("\n").trim().to_string()
}

fn is_non_content(element: &ElementRef<'_>) -> bool {
    NON_CONTENT_TAGS.contains(&element.value().name())
}

fn has_non_content_ancestor(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_non_content(&a))
}

/// Whitespace-collapsed text of `element`, skipping script/style/noscript content.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| is_non_content(&a));
        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }
    clean_text(&raw)
}

/// The heading's own id, else the nearest ancestor id, else empty.
fn anchor_for(heading: ElementRef<'_>) -> String {
    if let Some(id) = heading.value().id().filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    heading
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|a| a.value().attr("id"))
        .unwrap_or_default()
        .to_string()
}
