//! Per-chunk bloom index construction and query-side 4-gram decomposition.
//!
//! Both sides fold case and drop zero hashes the same way; a mismatch would
//! turn the filter from conservative pruning into silent false negatives.

use ahash::AHashSet;

use crate::utils::bloom::{bloom_update, index_hash_iterations, index_size_for};
use crate::utils::casefold::{casefold, ngram};

/// A built chunk index: raw bloom bytes plus the probe iteration count
/// recorded in the chunk header. Empty when the chunk is too small to index.
#[derive(Default)]
pub struct ChunkIndex {
    pub data: Vec<u8>,
    pub iterations: u32,
}

/// Build the bloom index over a chunk's data region (file contents only,
/// headers and names excluded).
pub fn build_chunk_index(data: &[u8]) -> ChunkIndex {
    let index_size = index_size_for(data.len());
    if index_size == 0 {
        return ChunkIndex::default();
    }

    // Collect distinct case-folded 4-grams; windows crossing a line boundary
    // are skipped since a match never spans lines.
    let mut ngrams: AHashSet<u32> = AHashSet::new();

    for window in data.windows(4) {
        if window.contains(&b'\n') {
            continue;
        }
        let hash = ngram(
            casefold(window[0]),
            casefold(window[1]),
            casefold(window[2]),
            casefold(window[3]),
        );
        if hash != 0 {
            ngrams.insert(hash);
        }
    }

    let iterations = index_hash_iterations(index_size, ngrams.len());

    let mut index = vec![0u8; index_size];
    for &hash in &ngrams {
        bloom_update(&mut index, hash, iterations);
    }

    ChunkIndex {
        data: index,
        iterations,
    }
}

/// Decompose a literal query into the 4-gram hashes to test against chunk
/// filters. Case is always folded to match the build side; windows with a
/// `'\n'` or a zero hash are skipped (the filter cannot speak for them).
pub fn query_ngrams(literal: &[u8]) -> Vec<u32> {
    let mut hashes = Vec::new();

    for window in literal.windows(4) {
        if window.contains(&b'\n') {
            continue;
        }
        let hash = ngram(
            casefold(window[0]),
            casefold(window[1]),
            casefold(window[2]),
            casefold(window[3]),
        );
        if hash != 0 && !hashes.contains(&hash) {
            hashes.push(hash);
        }
    }

    hashes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bloom::bloom_test;

    fn indexed_content() -> Vec<u8> {
        // Enough data to clear the minimum index size (>= 50 KiB).
        let mut content = Vec::new();
        for i in 0..2000 {
            content.extend_from_slice(format!("line number {} with Words\n", i).as_bytes());
        }
        content
    }

    #[test]
    fn test_every_present_ngram_tests_positive() {
        let content = indexed_content();
        let index = build_chunk_index(&content);
        assert!(!index.data.is_empty());
        assert!((1..=16).contains(&index.iterations));

        for window in content.windows(4) {
            if window.contains(&b'\n') {
                continue;
            }
            let hash = ngram(
                casefold(window[0]),
                casefold(window[1]),
                casefold(window[2]),
                casefold(window[3]),
            );
            if hash != 0 {
                assert!(bloom_test(&index.data, hash, index.iterations));
            }
        }
    }

    #[test]
    fn test_small_chunk_has_no_index() {
        let index = build_chunk_index(b"tiny\n");
        assert!(index.data.is_empty());
        assert_eq!(index.iterations, 0);
    }

    #[test]
    fn test_index_size_matches_formula() {
        let content = indexed_content();
        let index = build_chunk_index(&content);
        assert_eq!(index.data.len(), content.len() / 50);
    }

    #[test]
    fn test_query_ngrams_fold_case() {
        assert_eq!(query_ngrams(b"Hello"), query_ngrams(b"hello"));
    }

    #[test]
    fn test_query_ngrams_skip_newline_windows() {
        // "ab\ncd" has no window free of '\n' except none (len 5 -> windows
        // ab\nc, b\ncd), so nothing usable.
        assert!(query_ngrams(b"ab\ncd").is_empty());
        assert_eq!(query_ngrams(b"abc").len(), 0);
        assert_eq!(query_ngrams(b"abcd").len(), 1);
    }

    #[test]
    fn test_query_matches_build_side() {
        let content = indexed_content();
        let index = build_chunk_index(&content);

        for &hash in &query_ngrams(b"Words") {
            assert!(bloom_test(&index.data, hash, index.iterations));
        }
    }
}
