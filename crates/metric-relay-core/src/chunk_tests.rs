//! Tests for the chunk splitter

use super::*;

#[test]
fn test_splits_into_full_chunks_plus_remainder() {
    let chunks = split_chunks(3, (1..=7).collect::<Vec<_>>());

    assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
}

#[test]
fn test_exact_multiple_has_no_remainder() {
    let chunks = split_chunks(2, vec!["a", "b", "c", "d"]);

    assert_eq!(chunks, vec![vec!["a", "b"], vec!["c", "d"]]);
}

#[test]
fn test_chunk_larger_than_input_yields_single_chunk() {
    let chunks = split_chunks(10, vec![1, 2, 3]);

    assert_eq!(chunks, vec![vec![1, 2, 3]]);
}

#[test]
fn test_empty_input_yields_no_chunks() {
    let chunks: Vec<Vec<i32>> = split_chunks(3, Vec::new());

    assert!(chunks.is_empty());
}

#[test]
fn test_zero_chunk_size_degrades_to_single_chunk() {
    let chunks = split_chunks(0, vec![1, 2, 3]);

    assert_eq!(chunks, vec![vec![1, 2, 3]]);
}

#[test]
fn test_concatenation_equals_input() {
    let input: Vec<u32> = (0..97).collect();
    let chunks = split_chunks(10, input.clone());

    assert!(chunks.iter().all(|c| c.len() <= 10));
    assert!(chunks[..chunks.len() - 1].iter().all(|c| c.len() == 10));

    let rejoined: Vec<u32> = chunks.into_iter().flatten().collect();
    assert_eq!(rejoined, input);
}
