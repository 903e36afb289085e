use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::path::Path;

pub const DEFAULT_MIN_TEXT_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct PdfProcessor {
    min_text_chars: usize,
}

impl PdfProcessor {
    pub fn new(min_text_chars: usize) -> Self {
        Self { min_text_chars }
    }

    /// Extract text directly from PDF using lopdf
    pub fn extract_text_direct(&self, pdf_path: &Path) -> Result<(String, usize)> {
        let document = lopdf::Document::load(pdf_path).context("Failed to load PDF document")?;

        let mut text = String::new();
        let pages = document.get_pages();
        let page_count = pages.len();

        for page_num in pages.keys() {
            match document.extract_text(&[*page_num]) {
                Ok(page_text) => {
                    if !page_text.trim().is_empty() {
                        text.push_str(&page_text);
                        text.push('\n');
                    }
                }
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", page_num, e);
                }
            }
        }

        // lopdf misses text behind some font encodings; pdf-extract handles more of them
        if !self.has_extractable_text(&text) {
            match extract_with_pdf_extract(pdf_path) {
                Ok(extracted) => {
                    if extracted.trim().len() > text.trim().len() {
                        info!("Using pdf-extract fallback for {}", pdf_path.display());
                        return Ok((extracted, page_count));
                    }
                }
                Err(e) => {
                    warn!("pdf-extract fallback failed: {:#}", e);
                }
            }
        }

        debug!(
            "Direct extraction of {} gave {} chars over {} pages",
            pdf_path.display(),
            text.len(),
            page_count
        );
        Ok((text, page_count))
    }

    /// Whether the text layer is substantial enough to skip OCR
    pub fn has_extractable_text(&self, text: &str) -> bool {
        let len = text.trim().chars().count();
        len > 0 && len >= self.min_text_chars
    }

    /// Get PDF page count
    pub fn get_page_count(&self, pdf_path: &Path) -> Result<usize> {
        let document =
            lopdf::Document::load(pdf_path).context("Failed to load PDF for page count")?;

        Ok(document.get_pages().len())
    }
}

/// pdf-extract can panic on malformed PDFs; turn that into an error.
fn extract_with_pdf_extract(pdf_path: &Path) -> Result<String> {
    let bytes = std::fs::read(pdf_path)
        .with_context(|| format!("Failed to read {}", pdf_path.display()))?;

    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(anyhow!("pdf-extract error: {}", e)),
        Err(_) => Err(anyhow!("pdf-extract panicked on {}", pdf_path.display())),
    }
}
