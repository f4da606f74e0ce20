//! Tokenizers used to measure and slice text into segments.
//!
//! The chunker only needs token ids and the byte offset where each token
//! starts, so segments are cut from the original text rather than decoded.
//! [`TiktokenTokenizer`] provides the `cl100k_base` encoding used by OpenAI
//! embedding models; `HfTokenizer` (feature `hf-tokenizer`) loads any
//! HuggingFace `tokenizer.json`.

use tiktoken_rs::CoreBPE;

use crate::error::{RagError, Result};

/// Encodes text into token ids.
pub trait Tokenizer: Send + Sync {
    /// Short name of the encoding, recorded in logs.
    fn name(&self) -> &str;

    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Encode text and report where each token starts in `text`, in bytes.
    ///
    /// Byte-level BPE can split one character over several tokens, so an
    /// offset may fall inside a multi-byte character. Callers slicing `text`
    /// must only cut at offsets that are character boundaries.
    fn encode_with_offsets(&self, text: &str) -> (Vec<u32>, Vec<usize>);

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// `tiktoken` BPE tokenizer (`cl100k_base` by default).
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
    name: &'static str,
}

impl TiktokenTokenizer {
    /// The `cl100k_base` encoding used by `text-embedding-3-*` and GPT-4 class models.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| RagError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe, name: "cl100k_base" })
    }

    /// The `o200k_base` encoding used by GPT-4o class models.
    pub fn o200k() -> Result<Self> {
        let bpe = tiktoken_rs::o200k_base().map_err(|e| RagError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe, name: "o200k_base" })
    }
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer").field("name", &self.name).finish()
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn name(&self) -> &str {
        self.name
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn encode_with_offsets(&self, text: &str) -> (Vec<u32>, Vec<usize>) {
        let tokens = self.bpe.encode_ordinary(text);
        let mut offsets = Vec::with_capacity(tokens.len());
        let mut pos = 0;
        // Ordinary encoding is lossless: the token bytes concatenate to `text`.
        for bytes in self.bpe._decode_native_and_split(tokens.clone()) {
            offsets.push(pos);
            pos += bytes.len();
        }
        (tokens, offsets)
    }
}

#[cfg(feature = "hf-tokenizer")]
pub use hf::HfTokenizer;

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use std::path::Path;

    use super::Tokenizer;
    use crate::error::{RagError, Result};

    /// HuggingFace `tokenizers` adapter loaded from a `tokenizer.json`.
    ///
    /// Special tokens are not added on encode.
    pub struct HfTokenizer {
        inner: tokenizers::Tokenizer,
        name: String,
    }

    impl HfTokenizer {
        /// Load a tokenizer from a `tokenizer.json` file.
        pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let inner = tokenizers::Tokenizer::from_file(path)
                .map_err(|e| RagError::Tokenizer(format!("{}: {e}", path.display())))?;
            Ok(Self { inner, name: path.display().to_string() })
        }

        /// Load a tokenizer from in-memory `tokenizer.json` contents.
        pub fn from_bytes(name: impl Into<String>, json: &[u8]) -> Result<Self> {
            let inner = tokenizers::Tokenizer::from_bytes(json)
                .map_err(|e| RagError::Tokenizer(e.to_string()))?;
            Ok(Self { inner, name: name.into() })
        }
    }

    impl Tokenizer for HfTokenizer {
        fn name(&self) -> &str {
            &self.name
        }

        fn encode(&self, text: &str) -> Vec<u32> {
            match self.inner.encode(text, false) {
                Ok(encoding) => encoding.get_ids().to_vec(),
                Err(e) => {
                    tracing::warn!(tokenizer = %self.name, error = %e, "encoding failed");
                    Vec::new()
                }
            }
        }

        fn encode_with_offsets(&self, text: &str) -> (Vec<u32>, Vec<usize>) {
            match self.inner.encode(text, false) {
                Ok(encoding) => (
                    encoding.get_ids().to_vec(),
                    encoding.get_offsets().iter().map(|(start, _)| *start).collect(),
                ),
                Err(e) => {
                    tracing::warn!(tokenizer = %self.name, error = %e, "encoding failed");
                    (Vec::new(), Vec::new())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cl100k_counts_tokens() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "The forest survives through sustainable economics.";
        let tokens = tokenizer.encode(text);
        assert!(!tokens.is_empty());
        assert_eq!(tokenizer.count(text), tokens.len());
    }

    #[test]
    fn offsets_partition_the_text() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "🌿🌿🌿 floresta amazônica 🌳🌳";
        let (tokens, offsets) = tokenizer.encode_with_offsets(text);
        assert_eq!(tokens, tokenizer.encode(text));
        assert_eq!(offsets.len(), tokens.len());
        assert_eq!(offsets[0], 0);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert!(*offsets.last().unwrap() < text.len());
        // Emoji are split across tokens, so some offsets land mid-character.
        assert!(offsets.iter().any(|&o| !text.is_char_boundary(o)));
    }
}
