//! Fixed-size chunks of consecutive dataset items.

use std::marker::PhantomData;

use burn::data::dataset::Dataset;

/// Dataset whose item `i` holds items `[i * chunk_size, min((i + 1) * chunk_size, len))`
/// of the wrapped dataset.
///
/// Burn's multi-threaded loader splits a dataset between its workers before
/// batching. Loading chunks with a batch size of 1 keeps every batch made of
/// `chunk_size` consecutive samples, the last one possibly shorter.
#[derive(Debug)]
pub struct ChunkedDataset<D, I> {
    dataset: D,
    chunk_size: usize,
    _item: PhantomData<I>,
}

impl<D, I> ChunkedDataset<D, I>
where
    D: Dataset<I>,
{
    /// Wraps `dataset` into chunks of `chunk_size` items.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is 0.
    pub fn new(dataset: D, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "Chunk size must be greater than 0");
        Self {
            dataset,
            chunk_size,
            _item: PhantomData,
        }
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl<D, I> Dataset<Vec<I>> for ChunkedDataset<D, I>
where
    D: Dataset<I>,
    I: Send + Sync,
{
    fn get(&self, index: usize) -> Option<Vec<I>> {
        let start = index.checked_mul(self.chunk_size)?;
        let len = self.dataset.len();
        if start >= len {
            return None;
        }
        let end = (start + self.chunk_size).min(len);
        (start..end).map(|i| self.dataset.get(i)).collect()
    }

    fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use burn::data::dataset::InMemDataset;

    use super::*;

    #[test]
    fn chunks_are_consecutive_and_the_last_is_shorter() {
        let chunks = ChunkedDataset::new(InMemDataset::new((0..7).collect::<Vec<u32>>()), 3);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.get(0), Some(vec![0, 1, 2]));
        assert_eq!(chunks.get(1), Some(vec![3, 4, 5]));
        assert_eq!(chunks.get(2), Some(vec![6]));
        assert_eq!(chunks.get(3), None);
    }

    #[test]
    fn exact_multiple_has_no_partial_chunk() {
        let chunks = ChunkedDataset::new(InMemDataset::new(vec!["a", "b", "c", "d"]), 2);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.get(1), Some(vec!["c", "d"]));
        assert_eq!(chunks.get(2), None);
    }

    #[test]
    #[should_panic = "Chunk size must be greater than 0"]
    fn zero_chunk_size_is_rejected() {
        let _ = ChunkedDataset::new(InMemDataset::new(vec![1u8]), 0);
    }
}
