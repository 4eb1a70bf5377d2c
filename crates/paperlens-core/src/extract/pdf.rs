use std::sync::Arc;

use super::ExtractError;
use crate::backend::PdfBackend;
use crate::text_utils::{char_len, clean_text};
use crate::{ExtractedBody, ExtractionResult, PdfPage};

/// Run `backend` over the document bytes on the blocking pool.
pub async fn extract_pdf(
    backend: Arc<dyn PdfBackend>,
    pdf: Vec<u8>,
    source_url: String,
) -> Result<ExtractionResult, ExtractError> {
    let raw_pages = tokio::task::spawn_blocking(move || backend.page_texts(&pdf)).await??;
    let result = assemble_pdf(raw_pages, source_url);
    tracing::debug!(
        source_url = %result.source_url,
        pages = result.pages().len(),
        chars = char_len(&result.full_text),
        "extracted PDF body"
    );
    Ok(result)
}

/// Clean raw page texts and number them from 1.
///
/// Pages that clean to nothing are dropped without renumbering the rest, so
/// `number` always matches the source page.
pub fn assemble_pdf(raw_pages: Vec<String>, source_url: String) -> ExtractionResult {
    let pages: Vec<PdfPage> = raw_pages
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let text = clean_text(raw);
            (!text.is_empty()).then_some(PdfPage {
                number: idx + 1,
                text,
            })
        })
        .collect();

    let full_text = pages
        .iter()
        .map(|p| format!("[Page {}]\n{}", p.number, p.text))
        .collect::<Vec<_>>()
        .join("\n");

    ExtractionResult {
        source_url,
        full_text,
        body: ExtractedBody::Pdf(pages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StubPdf;

    #[test]
    fn blank_pages_keep_numbering() {
        let result = assemble_pdf(
            vec![
                "First   page\ntext".into(),
                "  \n ".into(),
                "Third page".into(),
            ],
            "https://arxiv.org/pdf/1.pdf".into(),
        );
        let numbers: Vec<usize> = result.pages().iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(result.pages()[0].text, "First page text");
        assert_eq!(
            result.full_text,
            "[Page 1]\nFirst page text\n[Page 3]\nThird page"
        );
        assert!(result.sections().is_empty());
    }

    #[test]
    fn empty_document_has_empty_text() {
        let result = assemble_pdf(vec![], "u".into());
        assert!(result.pages().is_empty());
        assert_eq!(result.full_text, "");
    }

    #[tokio::test]
    async fn backend_runs_on_blocking_pool() {
        let backend: Arc<dyn PdfBackend> = Arc::new(StubPdf::pages(&["alpha", "", "gamma"]));
        let result = extract_pdf(backend, b"%PDF".to_vec(), "u".into())
            .await
            .unwrap();
        assert_eq!(result.source_type(), crate::SourceType::Pdf);
        assert_eq!(result.pages().len(), 2);
        assert_eq!(result.pages()[1].number, 3);
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let backend: Arc<dyn PdfBackend> = Arc::new(StubPdf::broken("not a PDF"));
        let err = extract_pdf(backend, vec![], "u".into()).await.unwrap_err();
        assert!(err.to_string().contains("not a PDF"));
    }
}
