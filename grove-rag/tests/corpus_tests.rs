//! Corpus parity and persistence tests.

use std::fs;

use grove_rag::corpus::{METADATA_FILE, VECTORS_FILE};
use grove_rag::{Corpus, MetadataRecord, RagError};
use proptest::prelude::*;
use tempfile::TempDir;

fn record(source: &str, text: &str) -> MetadataRecord {
    MetadataRecord { source_id: source.into(), preview: text.into(), full_text: Some(text.into()) }
}

fn sample_corpus() -> Corpus {
    let mut corpus = Corpus::new("hash-embedding");
    corpus
        .append(
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.6, 0.8]],
            vec![record("a.pdf", "first segment"), record("b.pdf", "second segment")],
        )
        .unwrap();
    corpus
}

/// Vectors and records stay the same length after any mix of valid and
/// invalid appends.
mod prop_parity {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn index_and_metadata_never_diverge(
            steps in proptest::collection::vec((0usize..5, 0usize..5, 2usize..4), 1..20),
        ) {
            let mut corpus = Corpus::new("m");
            for (vector_count, record_count, dim) in steps {
                let vectors = vec![vec![0.5; dim]; vector_count];
                let records = vec![record("doc", "text"); record_count];
                let _ = corpus.append(vectors, records);
                prop_assert_eq!(corpus.index().len(), corpus.metadata().len());
                prop_assert!(corpus.verify().is_ok());
            }
        }
    }
}

#[test]
fn save_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let corpus = sample_corpus();
    corpus.save(dir.path()).unwrap();

    assert!(dir.path().join(VECTORS_FILE).exists());
    assert!(dir.path().join(METADATA_FILE).exists());

    let loaded = Corpus::load(dir.path()).unwrap();
    assert_eq!(loaded, corpus);
    assert_eq!(loaded.embedding_model(), "hash-embedding");
    assert_eq!(loaded.record(1).unwrap().source_id, "b.pdf");
}

#[test]
fn save_overwrites_previous_revision() {
    let dir = TempDir::new().unwrap();
    sample_corpus().save(dir.path()).unwrap();

    let mut bigger = sample_corpus();
    bigger.append(vec![vec![0.0, 1.0, 0.0]], vec![record("c.pdf", "third")]).unwrap();
    bigger.save(dir.path()).unwrap();

    assert_eq!(Corpus::load(dir.path()).unwrap().len(), 3);
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn missing_metadata_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    sample_corpus().save(dir.path()).unwrap();
    fs::remove_file(dir.path().join(METADATA_FILE)).unwrap();

    let err = Corpus::load(dir.path()).unwrap_err();
    assert!(matches!(err, RagError::CorruptCorpus { .. }), "got {err:?}");
}

#[test]
fn missing_vector_file_is_corrupt() {
    let dir = TempDir::new().unwrap();
    sample_corpus().save(dir.path()).unwrap();
    fs::remove_file(dir.path().join(VECTORS_FILE)).unwrap();

    assert!(matches!(Corpus::load(dir.path()), Err(RagError::CorruptCorpus { .. })));
}

#[test]
fn empty_directory_is_not_found_rather_than_corrupt() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(Corpus::load(dir.path()), Err(RagError::Io(_))));
}

#[test]
fn vectors_from_another_save_fail_the_checksum() {
    let old = TempDir::new().unwrap();
    let new = TempDir::new().unwrap();
    sample_corpus().save(old.path()).unwrap();

    let mut bigger = sample_corpus();
    bigger.append(vec![vec![0.0, 1.0, 0.0]], vec![record("c.pdf", "third")]).unwrap();
    bigger.save(new.path()).unwrap();

    // Pair the new vector file with the old metadata.
    fs::copy(new.path().join(VECTORS_FILE), old.path().join(VECTORS_FILE)).unwrap();
    match Corpus::load(old.path()) {
        Err(RagError::CorruptCorpus { reason, .. }) => assert!(reason.contains("checksum")),
        other => panic!("expected checksum failure, got {other:?}"),
    }
}

#[test]
fn flipped_vector_byte_is_detected() {
    let dir = TempDir::new().unwrap();
    sample_corpus().save(dir.path()).unwrap();
    let path = dir.path().join(VECTORS_FILE);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(Corpus::load(dir.path()), Err(RagError::CorruptCorpus { .. })));
}

#[test]
fn loading_for_another_model_is_rejected() {
    let dir = TempDir::new().unwrap();
    sample_corpus().save(dir.path()).unwrap();

    assert!(Corpus::load_for_model(dir.path(), "hash-embedding").is_ok());
    let err = Corpus::load_for_model(dir.path(), "text-embedding-3-large").unwrap_err();
    assert!(matches!(err, RagError::Config(_)));
}
