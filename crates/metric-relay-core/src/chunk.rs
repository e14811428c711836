//! Fixed-size chunking for send waves.

/// Split `items` into consecutive windows of at most `chunk_size`.
///
/// The concatenation of the returned chunks equals the input; every
/// chunk except possibly the last has exactly `chunk_size` elements.
/// A `chunk_size` of zero returns the whole input as a single chunk so
/// a misconfigured dispatcher degrades to one request per wave instead
/// of panicking.
///
/// # Examples
///
/// ```rust
/// use metric_relay_core::split_chunks;
///
/// let chunks = split_chunks(3, vec![1, 2, 3, 4, 5, 6, 7]);
/// assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
/// ```
pub fn split_chunks<T>(chunk_size: usize, items: Vec<T>) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![items];
    }

    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut current = Vec::with_capacity(chunk_size);
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(chunk_size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
#[path = "chunk_tests.rs"]
mod tests;
