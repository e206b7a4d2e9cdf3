//! Shape management for tensors: dimension sizes, canonical row-major
//! strides, and the multi-index iterator the strided kernels walk.

use std::fmt;
use thiserror::Error;

/// Error when a shape is invalid for an operation.
#[derive(Error, Debug)]
#[error("shape error: {0}")]
pub struct ShapeError(pub String);

/// Shape of a tensor: ordered list of dimension sizes. Rank 0 is a scalar.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a shape from dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Rank-0 scalar shape.
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension sizes as slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements. 1 for rank-0.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Element-wise shape equality.
    pub fn same_as(&self, other: &Shape) -> bool {
        self.dims == other.dims
    }

    /// True for rank 0 or a single-element shape.
    pub fn is_scalar(&self) -> bool {
        self.numel() <= 1
    }

    /// Canonical row-major strides: stride[i] = product of dims[i+1..].
    /// Rank-0 has empty strides.
    pub fn canonical_strides(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.dims.len()];
        let mut acc = 1usize;
        for (i, &d) in self.dims.iter().enumerate().rev() {
            strides[i] = acc;
            acc *= d;
        }
        strides
    }

    /// Linear offset of a multi-index under the given strides.
    pub fn offset_of(indices: &[usize], strides: &[usize]) -> usize {
        indices
            .iter()
            .zip(strides.iter())
            .map(|(&i, &s)| i * s)
            .sum()
    }

    /// Linear row-major index of a multi-index (canonical strides).
    /// Returns None when the index count or any coordinate is out of range.
    pub fn linear_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.dims.len() {
            return None;
        }
        let mut linear = 0usize;
        let mut acc = 1usize;
        for (&idx, &d) in indices.iter().zip(self.dims.iter()).rev() {
            if idx >= d {
                return None;
            }
            linear += idx * acc;
            acc *= d;
        }
        Some(linear)
    }

    /// Iterator over every multi-index in row-major order.
    pub fn index_iter(&self) -> IndexIter<'_> {
        IndexIter::new(&self.dims, &[])
    }

    /// Row-major index iterator with the chosen axes fixed to chosen values.
    /// Fixed axes keep their value; the remaining axes run their full range.
    pub fn index_iter_fixed(&self, fixed: &[(usize, usize)]) -> IndexIter<'_> {
        IndexIter::new(&self.dims, fixed)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{:?}", self.dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

/// Row-major multi-index iterator. Yields a borrow of the current index;
/// call [`IndexIter::next_index`] in a while-let loop.
pub struct IndexIter<'a> {
    dims: &'a [usize],
    current: Vec<usize>,
    /// free[i] is true when axis i advances; fixed axes stay put.
    free: Vec<bool>,
    started: bool,
    done: bool,
}

impl<'a> IndexIter<'a> {
    fn new(dims: &'a [usize], fixed: &[(usize, usize)]) -> Self {
        let mut current = vec![0usize; dims.len()];
        let mut free = vec![true; dims.len()];
        let mut done = dims.iter().any(|&d| d == 0);
        for &(axis, value) in fixed {
            if axis >= dims.len() || value >= dims[axis] {
                done = true;
                continue;
            }
            current[axis] = value;
            free[axis] = false;
        }
        IndexIter {
            dims,
            current,
            free,
            started: false,
            done,
        }
    }

    /// Advance and return the next multi-index, or None when exhausted.
    /// Rank-0 yields exactly one empty index.
    pub fn next_index(&mut self) -> Option<&[usize]> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(&self.current);
        }
        // Odometer increment over the free axes, last axis fastest.
        for axis in (0..self.dims.len()).rev() {
            if !self.free[axis] {
                continue;
            }
            self.current[axis] += 1;
            if self.current[axis] < self.dims[axis] {
                return Some(&self.current);
            }
            self.current[axis] = 0;
        }
        self.done = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_numel() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.rank(), 3);
    }

    #[test]
    fn canonical_strides_row_major() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.canonical_strides(), vec![12, 4, 1]);
        assert_eq!(Shape::scalar().canonical_strides(), Vec::<usize>::new());
    }

    #[test]
    fn linear_index_matches_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        let strides = s.canonical_strides();
        assert_eq!(s.linear_index(&[1, 2, 3]), Some(23));
        assert_eq!(Shape::offset_of(&[1, 2, 3], &strides), 23);
        assert_eq!(s.linear_index(&[2, 0, 0]), None);
        assert_eq!(s.linear_index(&[0, 0]), None);
    }

    #[test]
    fn index_iter_row_major_order() {
        let s = Shape::new(vec![2, 2]);
        let mut it = s.index_iter();
        let mut seen = Vec::new();
        while let Some(idx) = it.next_index() {
            seen.push(idx.to_vec());
        }
        assert_eq!(
            seen,
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
    }

    #[test]
    fn index_iter_fixed_axis() {
        let s = Shape::new(vec![2, 3]);
        let mut it = s.index_iter_fixed(&[(0, 1)]);
        let mut seen = Vec::new();
        while let Some(idx) = it.next_index() {
            seen.push(idx.to_vec());
        }
        assert_eq!(seen, vec![vec![1, 0], vec![1, 1], vec![1, 2]]);
    }

    #[test]
    fn index_iter_rank0_yields_once() {
        let s = Shape::scalar();
        let mut it = s.index_iter();
        assert_eq!(it.next_index(), Some(&[][..]));
        assert!(it.next_index().is_none());
    }

    #[test]
    fn index_iter_zero_size_is_empty() {
        let s = Shape::new(vec![2, 0, 3]);
        let mut it = s.index_iter();
        assert!(it.next_index().is_none());
    }
}
