//! Turn fetched bytes into an [`ExtractionResult`](crate::ExtractionResult).
//!
//! Both extractors do CPU-bound parsing, so the async entry points run on the
//! blocking pool.

pub mod html;
pub mod pdf;

use thiserror::Error;

use crate::backend::BackendError;

pub use html::{extract_html, parse_html};
pub use pdf::{assemble_pdf, extract_pdf};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
