use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors only turn document bytes into raw per-page text; whitespace
/// cleanup, page numbering and `full_text` assembly live in
/// [`crate::extract::pdf`].
pub trait PdfBackend: Send + Sync {
    /// Raw text of every page, in page order. Index `i` is source page `i + 1`.
    fn page_texts(&self, pdf: &[u8]) -> Result<Vec<String>, BackendError>;
}
