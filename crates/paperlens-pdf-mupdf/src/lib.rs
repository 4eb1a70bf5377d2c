use std::io::Write;

use mupdf::{Document, Page, TextPageFlags};

use paperlens_core::{BackendError, PdfBackend};

/// MuPDF implementation of [`PdfBackend`].
///
/// Kept in its own crate so only binaries that read PDFs link the
/// AGPL-licensed mupdf.
///
/// Extracts every text block by default. [`MupdfBackend::trim_margins`]
/// drops blocks lying entirely in the top or bottom band of a page, where
/// arXiv PDFs put running heads and page numbers.
#[derive(Default)]
pub struct MupdfBackend {
    /// Fraction of page height at the top treated as margin. `None` keeps it.
    header_ratio: Option<f32>,
    /// Fraction of page height at the bottom treated as margin.
    footer_ratio: Option<f32>,
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop blocks in the top 4% and bottom 5% of each page.
    pub fn trim_margins(mut self) -> Self {
        self.header_ratio = Some(0.04);
        self.footer_ratio = Some(0.05);
        self
    }

    fn page_text(&self, page: &Page) -> Result<String, BackendError> {
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let bounds = page
            .bounds()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let height = bounds.y1 - bounds.y0;
        let top = self.header_ratio.map(|r| bounds.y0 + height * r);
        let bottom = self.footer_ratio.map(|r| bounds.y1 - height * r);

        let mut text = String::new();
        for block in text_page.blocks() {
            let b = block.bounds();
            if top.is_some_and(|t| b.y1 <= t) || bottom.is_some_and(|t| b.y0 >= t) {
                continue;
            }
            for line in block.lines() {
                text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                text.push('\n');
            }
        }
        Ok(text)
    }
}

impl PdfBackend for MupdfBackend {
    fn page_texts(&self, pdf: &[u8]) -> Result<Vec<String>, BackendError> {
        // mupdf opens by path, so the bytes go through a temp file first
        let mut file = tempfile::Builder::new()
            .prefix("paperlens-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(pdf)?;
        file.flush()?;
        let path = file
            .path()
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid temp path encoding".into()))?;

        let document = Document::open(path).map_err(|e| BackendError::OpenError(e.to_string()))?;
        let mut pages = Vec::new();
        for page in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            pages.push(self.page_text(&page)?);
        }
        tracing::debug!(pages = pages.len(), bytes = pdf.len(), "mupdf extracted pages");
        Ok(pages)
    }
}
