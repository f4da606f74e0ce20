//! Token-window chunking.
//!
//! This module provides the [`Chunker`] trait and [`TokenChunker`], which
//! slides a fixed-width token window over a document with a configurable
//! overlap. Windows are computed by [`window_ranges`], a pure function over
//! the token count.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::document::Segment;
use crate::error::Result;
use crate::tokenizer::Tokenizer;

/// A strategy for splitting document text into segments.
pub trait Chunker: Send + Sync {
    /// Split text into segments.
    ///
    /// Returns an empty `Vec` for empty text. Segments whose text is blank
    /// after trimming are discarded.
    fn chunk(&self, text: &str) -> Result<Vec<Segment>>;
}

/// Compute the token windows for a stream of `len` tokens.
///
/// Windows are `max_tokens` wide and start `max_tokens - overlap_tokens`
/// apart; the advance is clamped to at least one token so the walk always
/// terminates. The walk stops at the first window that reaches the end of
/// the stream.
pub fn window_ranges(len: usize, max_tokens: usize, overlap_tokens: usize) -> Vec<Range<usize>> {
    aligned_window_ranges(len, max_tokens, overlap_tokens, |_| true)
}

/// Like [`window_ranges`], but every window edge lands on a position for
/// which `is_boundary` holds. Positions `0` and `len` are always boundaries.
///
/// Edges are moved back to the nearest boundary, so a window never exceeds
/// `max_tokens` unless a single unbreakable run is longer than that; such a
/// run becomes a window of its own. Consecutive windows still meet or
/// overlap, so every token lies in some window.
pub fn aligned_window_ranges(
    len: usize,
    max_tokens: usize,
    overlap_tokens: usize,
    is_boundary: impl Fn(usize) -> bool,
) -> Vec<Range<usize>> {
    if len == 0 || max_tokens == 0 {
        return Vec::new();
    }

    let floor = |mut i: usize| {
        while i > 0 && !is_boundary(i) {
            i -= 1;
        }
        i
    };
    let ceil = |mut i: usize| {
        while i < len && !is_boundary(i) {
            i += 1;
        }
        i
    };

    let step = max_tokens.saturating_sub(overlap_tokens).max(1);
    let mut ranges = Vec::with_capacity(len.div_ceil(step));
    let mut start = 0;

    loop {
        let mut end = floor((start + max_tokens).min(len));
        if end <= start {
            end = ceil(start + 1);
        }
        ranges.push(start..end);
        if end == len {
            break;
        }
        let mut next = floor(start + step);
        if next <= start {
            next = ceil(start + 1);
        }
        start = next;
    }

    ranges
}

/// Splits text into overlapping windows of at most `max_tokens` tokens.
///
/// The text is tokenized once and each window is cut from the original text
/// at the byte offsets of its first and last token. Window edges that would
/// split a multi-byte character move back to the character's first token.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use grove_rag::{TiktokenTokenizer, TokenChunker, Chunker};
///
/// let chunker = TokenChunker::new(Arc::new(TiktokenTokenizer::cl100k()?), 500, 50);
/// let segments = chunker.chunk(&text)?;
/// ```
#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
    overlap_tokens: usize,
}

impl TokenChunker {
    /// Create a new `TokenChunker`.
    ///
    /// # Arguments
    ///
    /// * `max_tokens`: maximum number of tokens per segment
    /// * `overlap_tokens`: number of tokens shared by consecutive segments
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize, overlap_tokens: usize) -> Self {
        Self { tokenizer, max_tokens, overlap_tokens }
    }

    /// The tokenizer used for both encoding and decoding.
    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("tokenizer", &self.tokenizer.name())
            .field("max_tokens", &self.max_tokens)
            .field("overlap_tokens", &self.overlap_tokens)
            .finish()
    }
}

impl Chunker for TokenChunker {
    fn chunk(&self, text: &str) -> Result<Vec<Segment>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let (tokens, offsets) = self.tokenizer.encode_with_offsets(text);
        let byte_at = |i: usize| offsets.get(i).copied().unwrap_or(text.len());
        let ranges = aligned_window_ranges(
            tokens.len(),
            self.max_tokens,
            self.overlap_tokens,
            |i| text.is_char_boundary(byte_at(i)),
        );
        let mut segments = Vec::with_capacity(ranges.len());
        let mut discarded = 0usize;

        for range in ranges {
            let piece = text.get(byte_at(range.start)..byte_at(range.end)).unwrap_or_default();
            if piece.trim().is_empty() {
                discarded += 1;
                continue;
            }
            segments.push(Segment {
                text: piece.to_string(),
                token_count: range.len(),
                token_offset: range.start,
            });
        }

        debug!(
            token_count = tokens.len(),
            segment_count = segments.len(),
            discarded,
            "chunked text"
        );

        Ok(segments)
    }
}
