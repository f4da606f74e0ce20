//! Property tests for token-window chunking.

use std::sync::Arc;

use grove_rag::chunking::window_ranges;
use grove_rag::{Chunker, TiktokenTokenizer, TokenChunker, Tokenizer};
use proptest::prelude::*;

fn cl100k() -> Arc<dyn Tokenizer> {
    Arc::new(TiktokenTokenizer::cl100k().unwrap())
}

/// Every token is covered, no window exceeds `max_tokens`, and the walk
/// terminates even when the overlap is not smaller than the window.
mod prop_window_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn windows_cover_stream_and_respect_max(
            len in 0usize..2000,
            max_tokens in 1usize..300,
            overlap_tokens in 0usize..400,
        ) {
            let ranges = window_ranges(len, max_tokens, overlap_tokens);

            let mut covered = vec![false; len];
            for range in &ranges {
                prop_assert!(range.end - range.start <= max_tokens);
                prop_assert!(range.start < range.end);
                for slot in &mut covered[range.clone()] {
                    *slot = true;
                }
            }
            prop_assert!(covered.iter().all(|c| *c));

            // Windows are emitted in order and bounded by the stream length.
            prop_assert!(ranges.windows(2).all(|w| w[0].start < w[1].start));
            prop_assert!(ranges.len() <= len.max(1));
        }
    }
}

fn multibyte_text() -> impl Strategy<Value = String> {
    let pieces = vec![
        "🌳", "🌿", "🦜", "🐆", "🌺", "👩‍🔬", "floresta", "ção", "é", "森林", "保护", "a", " ", "\n",
    ];
    prop::collection::vec(prop::sample::select(pieces), 1..40).prop_map(|p| p.concat())
}

/// Window edges never split a character: chunking accepts any text and
/// every visible character lands in some segment.
mod prop_multibyte_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn every_character_reaches_a_segment(
            text in multibyte_text(),
            max_tokens in 1usize..8,
            overlap_tokens in 0usize..=1,
        ) {
            let chunker = TokenChunker::new(cl100k(), max_tokens, overlap_tokens);
            let segments = chunker.chunk(&text);
            prop_assert!(segments.is_ok(), "{:?}", segments.err());
            let segments = segments.unwrap();

            for segment in &segments {
                prop_assert!(text.contains(segment.text.as_str()));
                // A four-byte character is at most four byte-level tokens.
                prop_assert!(segment.token_count <= max_tokens.max(4));
            }
            for c in text.chars().filter(|c| !c.is_whitespace()) {
                prop_assert!(segments.iter().any(|s| s.text.contains(c)), "{c:?} missing");
            }
        }
    }
}

#[test]
fn emoji_text_splits_without_loss() {
    let text = "🌳🌿🦜🐆🌺🍃🌲🦋🐸🌴";
    for max_tokens in [4, 5, 7] {
        let chunker = TokenChunker::new(cl100k(), max_tokens, 0);
        let segments = chunker.chunk(text).unwrap();
        let joined: String = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, text, "max_tokens = {max_tokens}");
    }
}

#[test]
fn overlapping_windows_keep_mixed_script_characters() {
    let text = "A floresta 🌳🌿🦜 sobrevive com 🌺🍃 economia sustentável.";
    let chunker = TokenChunker::new(cl100k(), 6, 1);
    let segments = chunker.chunk(text).unwrap();
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        assert!(segments.iter().any(|s| s.text.contains(c)), "{c:?} missing");
    }
}

#[test]
fn token_count_matches_window_for_ascii() {
    let text = "Conservation only works when people can earn a living.";
    let tokenizer = cl100k();
    let segments = TokenChunker::new(tokenizer.clone(), 500, 0).chunk(text).unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].token_count, tokenizer.count(text));
    assert_eq!(segments[0].text, text);
}

#[test]
fn segments_fit_window_and_share_overlap() {
    let text = "The forest survives through sustainable economics. ".repeat(80);
    let chunker = TokenChunker::new(cl100k(), 40, 10);
    let segments = chunker.chunk(&text).unwrap();

    assert!(segments.len() > 1);
    for segment in &segments {
        assert!(segment.token_count <= 40);
        assert!(!segment.text.trim().is_empty());
    }
    for pair in segments.windows(2) {
        assert_eq!(pair[1].token_offset - pair[0].token_offset, 30);
    }
}

#[test]
fn reencoding_a_segment_stays_within_budget() {
    let text = "Conservation only works when the people living in the forest can earn a living. "
        .repeat(30);
    let tokenizer = cl100k();
    let chunker = TokenChunker::new(tokenizer.clone(), 25, 5);
    for segment in chunker.chunk(&text).unwrap() {
        assert!(tokenizer.count(&segment.text) <= 25, "segment re-encodes too long: {segment:?}");
    }
}

#[test]
fn overlap_not_smaller_than_window_still_terminates() {
    let chunker = TokenChunker::new(cl100k(), 5, 9);
    let segments = chunker.chunk("one two three four five six seven eight nine ten").unwrap();
    assert!(!segments.is_empty());
    let offsets: Vec<usize> = segments.iter().map(|s| s.token_offset).collect();
    assert!(offsets.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn blank_text_yields_no_segments() {
    let chunker = TokenChunker::new(cl100k(), 50, 5);
    assert!(chunker.chunk("").unwrap().is_empty());
    assert!(chunker.chunk(" \n\n\t ").unwrap().is_empty());
}
