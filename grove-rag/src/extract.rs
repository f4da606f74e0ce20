//! Plain-text extraction from source documents.
//!
//! Extraction never fails as a whole: a unit (PDF page) that cannot be read
//! is skipped and reported as an [`ExtractionWarning`], and an unreadable
//! document yields empty text. Callers treat empty text as "no content",
//! not as something to retry.

use std::path::Path;

use serde::Serialize;
use tracing::warn;

/// A unit that could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionWarning {
    /// Identifier of the document.
    pub source_id: String,
    /// One-based unit number; `0` means the whole document.
    pub unit: usize,
    /// A description of the failure.
    pub message: String,
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.unit == 0 {
            write!(f, "{}: {}", self.source_id, self.message)
        } else {
            write!(f, "{} (unit {}): {}", self.source_id, self.unit, self.message)
        }
    }
}

/// Output of a [`TextExtractor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Text of all readable units, newline-separated, in source order.
    pub text: String,
    /// Number of units that contributed text.
    pub units: usize,
    /// Units that were skipped.
    pub warnings: Vec<ExtractionWarning>,
}

impl Extraction {
    fn unreadable(source_id: &str, message: String) -> Self {
        warn!(source_id, error = %message, "document unreadable; contributing no content");
        Self {
            text: String::new(),
            units: 0,
            warnings: vec![ExtractionWarning { source_id: source_id.to_string(), unit: 0, message }],
        }
    }

    /// Whether the document contributed any non-blank text.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Pulls plain text out of a document's raw bytes.
pub trait TextExtractor: Send + Sync {
    /// Extract text from `bytes`; `source_id` is used in warnings.
    fn extract(&self, source_id: &str, bytes: &[u8]) -> Extraction;
}

/// Treats the whole input as one UTF-8 text unit.
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, source_id: &str, bytes: &[u8]) -> Extraction {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let units = usize::from(!text.trim().is_empty());
        if text.contains(char::REPLACEMENT_CHARACTER) {
            warn!(source_id, "invalid UTF-8 replaced during extraction");
        }
        Extraction { text, units, warnings: Vec::new() }
    }
}

#[cfg(feature = "pdf")]
pub use pdf::PdfExtractor;

#[cfg(feature = "pdf")]
mod pdf {
    use lopdf::Document as PdfDocument;
    use tracing::{debug, warn};

    use super::{Extraction, ExtractionWarning, TextExtractor};

    /// Extracts PDF text page by page with `lopdf`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PdfExtractor;

    impl TextExtractor for PdfExtractor {
        fn extract(&self, source_id: &str, bytes: &[u8]) -> Extraction {
            let doc = match PdfDocument::load_mem(bytes) {
                Ok(doc) => doc,
                Err(e) => return Extraction::unreadable(source_id, format!("cannot parse PDF: {e}")),
            };

            let page_numbers: Vec<u32> = doc.get_pages().into_keys().collect();
            if page_numbers.is_empty() {
                return Extraction::unreadable(source_id, "PDF has no pages".to_string());
            }

            let mut pages = Vec::new();
            let mut warnings = Vec::new();
            for page_number in page_numbers {
                match doc.extract_text(&[page_number]) {
                    Ok(text) => pages.push(text),
                    Err(e) => {
                        warn!(source_id, page = page_number, error = %e, "skipping unreadable page");
                        warnings.push(ExtractionWarning {
                            source_id: source_id.to_string(),
                            unit: page_number as usize,
                            message: e.to_string(),
                        });
                    }
                }
            }

            debug!(source_id, pages = pages.len(), skipped = warnings.len(), "extracted PDF");
            Extraction { units: pages.len(), text: pages.join("\n"), warnings }
        }
    }
}

/// Pick an extractor for `path` by file extension.
///
/// PDFs use [`PdfExtractor`] (feature `pdf`); everything else is read as
/// plain text.
pub fn extractor_for(path: &Path) -> Box<dyn TextExtractor> {
    let is_pdf =
        path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        #[cfg(feature = "pdf")]
        return Box::new(PdfExtractor);
        #[cfg(not(feature = "pdf"))]
        warn!(path = %path.display(), "PDF support disabled; reading as plain text");
    }
    Box::new(PlainTextExtractor)
}

/// The document identifier for `path`: its file name.
pub fn source_id_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read and extract the file at `path`.
///
/// A file that cannot be read yields an empty [`Extraction`] with a warning.
pub async fn extract_path(path: &Path) -> Extraction {
    let source_id = source_id_for(path);
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => return Extraction::unreadable(&source_id, format!("cannot read file: {e}")),
    };
    extractor_for(path).extract(&source_id, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_unit() {
        let extraction = PlainTextExtractor.extract("notes.txt", b"hello\nworld");
        assert_eq!(extraction.text, "hello\nworld");
        assert_eq!(extraction.units, 1);
        assert!(extraction.warnings.is_empty());
    }

    #[test]
    fn blank_plain_text_contributes_nothing() {
        let extraction = PlainTextExtractor.extract("blank.txt", b"  \n ");
        assert!(extraction.is_empty());
        assert_eq!(extraction.units, 0);
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn malformed_pdf_yields_empty_text_and_warning() {
        let extraction = PdfExtractor.extract("broken.pdf", b"%PDF-1.4 not really a pdf");
        assert!(extraction.is_empty());
        assert_eq!(extraction.warnings.len(), 1);
        assert_eq!(extraction.warnings[0].unit, 0);
    }

    #[test]
    fn source_id_is_file_name() {
        assert_eq!(source_id_for(Path::new("/data/docs/Arquivo 1.pdf")), "Arquivo 1.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let extraction = extract_path(Path::new("/definitely/not/here.txt")).await;
        assert!(extraction.is_empty());
        assert_eq!(extraction.warnings.len(), 1);
    }
}
