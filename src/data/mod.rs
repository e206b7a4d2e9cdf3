//! Data pipeline: Dataset trait and a batching DataLoader. Loaders deliver
//! tensors built with `Tensor::from_vec`; no on-disk format is dictated
//! here.

use crate::tensor::Tensor;

/// Dataset: indexed collection of (input, target) pairs.
pub trait Dataset {
    /// Number of samples.
    fn len(&self) -> usize;

    /// Sample at index: (input tensor, target tensor).
    fn get(&self, index: usize) -> Option<(Tensor, Tensor)>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batching iterator over a dataset. The final batch may be short.
pub struct DataLoader<D: Dataset> {
    dataset: D,
    batch_size: usize,
    index: usize,
}

impl<D: Dataset> DataLoader<D> {
    pub fn new(dataset: D, batch_size: usize) -> Self {
        DataLoader {
            dataset,
            batch_size: batch_size.max(1),
            index: 0,
        }
    }

    /// Next batch of samples, or None at the end of the dataset.
    pub fn next_batch(&mut self) -> Option<Vec<(Tensor, Tensor)>> {
        let start = self.index;
        if start >= self.dataset.len() {
            return None;
        }
        let end = (start + self.batch_size).min(self.dataset.len());
        let mut samples = Vec::with_capacity(end - start);
        for i in start..end {
            if let Some(pair) = self.dataset.get(i) {
                samples.push(pair);
            }
        }
        self.index = end;
        if samples.is_empty() {
            None
        } else {
            Some(samples)
        }
    }

    /// Rewind to the start of the dataset.
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

/// In-memory dataset over a vec of (input, target) views.
pub struct InMemoryDataset {
    samples: Vec<(Tensor, Tensor)>,
}

impl InMemoryDataset {
    pub fn new(samples: Vec<(Tensor, Tensor)>) -> Self {
        InMemoryDataset { samples }
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Option<(Tensor, Tensor)> {
        self.samples
            .get(index)
            .map(|(x, y)| (x.view(), y.view()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    fn sample(v: f32) -> (Tensor, Tensor) {
        (
            Tensor::from_vec(vec![v], Shape::new(vec![1])).unwrap(),
            Tensor::from_vec(vec![v * 2.0], Shape::new(vec![1])).unwrap(),
        )
    }

    #[test]
    fn batches_and_reset() {
        let ds = InMemoryDataset::new((0..5).map(|i| sample(i as f32)).collect());
        let mut loader = DataLoader::new(ds, 2);
        assert_eq!(loader.next_batch().unwrap().len(), 2);
        assert_eq!(loader.next_batch().unwrap().len(), 2);
        assert_eq!(loader.next_batch().unwrap().len(), 1);
        assert!(loader.next_batch().is_none());
        loader.reset();
        assert_eq!(loader.next_batch().unwrap().len(), 2);
    }
}
