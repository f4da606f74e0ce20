//! Data types for documents, segments, metadata records and query results.

use serde::{Deserialize, Serialize};

/// A source document with its extracted plain text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier of the document, typically the file name.
    pub id: String,
    /// The plain text content of the document.
    pub text: String,
}

impl Document {
    /// Create a document from an identifier and its text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// A contiguous token window of a [`Document`].
///
/// Segments are produced by the chunker and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Text of the window, cut from the document at character boundaries.
    pub text: String,
    /// Number of tokens in the window. Above the configured maximum only
    /// when a single character needs more tokens than that.
    pub token_count: usize,
    /// Offset of the window's first token in the document token stream.
    pub token_offset: usize,
}

/// Citation metadata for one indexed vector.
///
/// Position `i` in the metadata store always describes vector `i` in the
/// vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataRecord {
    /// Identifier of the originating document.
    pub source_id: String,
    /// Short whitespace-collapsed excerpt for citation display.
    pub preview: String,
    /// Complete segment text, when the corpus stores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

impl MetadataRecord {
    /// Build a record for a segment of `source_id`.
    ///
    /// The preview keeps at most `preview_chars` characters.
    pub fn from_segment(
        source_id: &str,
        segment: &Segment,
        preview_chars: usize,
        store_full_text: bool,
    ) -> Self {
        Self {
            source_id: source_id.to_string(),
            preview: make_preview(&segment.text, preview_chars),
            full_text: store_full_text.then(|| segment.text.clone()),
        }
    }

    /// The text used as grounding context: full text when stored, else the preview.
    pub fn context_text(&self) -> &str {
        self.full_text.as_deref().unwrap_or(&self.preview)
    }
}

/// A [`MetadataRecord`] paired with the inner-product score of its vector.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResult {
    /// The retrieved record.
    pub record: MetadataRecord,
    /// Raw inner product between query and segment vectors (cosine similarity).
    pub similarity_score: f32,
    /// Position of the record in the corpus.
    pub position: usize,
}

/// Collapse whitespace runs to single spaces and keep at most `max_chars` characters.
///
/// Truncation always lands on a character boundary.
pub fn make_preview(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars * 4));
    let mut chars = 0;
    for word in text.split_whitespace() {
        if chars >= max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
            chars += 1;
        }
        for c in word.chars() {
            if chars >= max_chars {
                break;
            }
            out.push(c);
            chars += 1;
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_collapses_whitespace() {
        assert_eq!(make_preview("  a\n\nb\t c  ", 100), "a b c");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let preview = make_preview("ação florestal sustentável", 6);
        assert_eq!(preview, "ação f");
        assert_eq!(preview.chars().count(), 6);
    }

    #[test]
    fn preview_of_blank_text_is_empty() {
        assert_eq!(make_preview(" \n\t ", 10), "");
    }

    #[test]
    fn context_text_prefers_full_text() {
        let segment =
            Segment { text: "full body\nwith lines".into(), token_count: 4, token_offset: 0 };
        let with_full = MetadataRecord::from_segment("a.pdf", &segment, 4, true);
        assert_eq!(with_full.context_text(), "full body\nwith lines");
        let preview_only = MetadataRecord::from_segment("a.pdf", &segment, 4, false);
        assert_eq!(preview_only.context_text(), "full");
    }
}
