//! PDF text extraction via lopdf.

use lopdf::Document as PdfDocument;

use crate::{AcquisitionFailure, DocifyError, Result};

/// Text pulled out of a PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfText {
    /// Page texts joined with blank lines.
    pub text: String,
    /// Pages in the document, including any beyond the extraction limit.
    pub page_count: usize,
    /// Pages whose text was extracted.
    pub pages_read: usize,
}

/// Extract text from the first `max_pages` pages of a PDF.
///
/// Pages whose content streams cannot be decoded are skipped; a document
/// that cannot be loaded at all is a decode error.
pub fn extract_pdf_text(bytes: &[u8], max_pages: usize) -> Result<PdfText> {
    let doc = PdfDocument::load_mem(bytes)
        .map_err(|e| DocifyError::acquisition(AcquisitionFailure::DecodeError, format!("unreadable PDF: {}", e)))?;

    let pages = doc.get_pages();
    let page_count = pages.len();
    let mut parts = Vec::new();
    let mut pages_read = 0;

    for page_number in pages.keys().take(max_pages) {
        pages_read += 1;
        match doc.extract_text(&[*page_number]) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Err(e) => tracing::debug!(page = page_number, error = %e, "skipping undecodable PDF page"),
        }
    }

    Ok(PdfText { text: parts.join("\n\n"), page_count, pages_read })
}
