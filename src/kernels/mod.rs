//! Kernel layer: pure computational primitives over flat FP32 buffers,
//! parameterized by logical shape and per-operand strides. Kernels never
//! allocate; validation happens at the tensor layer and kernels
//! `debug_assert!` their preconditions. Every element-wise entry point
//! selects a contiguous fast path when all operand strides are canonical
//! for the operation shape, and falls back to multi-index walking otherwise.

pub mod activation;
pub mod blas;
pub mod conv;
pub mod decomp;
pub mod elementwise;
pub mod pool;
pub mod reduce;

use thiserror::Error;

/// Error from a kernel that can fail numerically (decompositions).
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("numeric failure: {0}")]
    NumericFailure(String),
}

pub type KernelResult<T> = Result<T, KernelError>;

/// Maximum tensor rank the kernel layer walks without allocating.
pub const MAX_RANK: usize = 8;

/// Flat-range size above which parallel kernels split work across the
/// rayon pool. Below it everything runs on the scalar path.
pub const PAR_THRESHOLD: usize = 64 * 1024;

/// Layout of one operand: element offset into its buffer plus per-axis
/// strides. `strides: None` denotes canonical row-major for the operation
/// shape.
#[derive(Clone, Copy, Debug)]
pub struct Layout<'a> {
    pub offset: usize,
    pub strides: Option<&'a [usize]>,
}

impl<'a> Layout<'a> {
    /// Canonical layout starting at `offset`.
    pub const fn contiguous(offset: usize) -> Layout<'static> {
        Layout {
            offset,
            strides: None,
        }
    }

    /// Custom-strided layout.
    pub const fn strided(offset: usize, strides: &'a [usize]) -> Layout<'a> {
        Layout {
            offset,
            strides: Some(strides),
        }
    }

    /// True when the strides equal canonical row-major for `dims`.
    pub fn is_canonical(&self, dims: &[usize]) -> bool {
        match self.strides {
            None => true,
            Some(s) => strides_are_canonical(s, dims),
        }
    }

    /// Buffer offset of a multi-index. `linear` is the running row-major
    /// counter of the walk, which equals the canonical linear index.
    #[inline]
    pub fn at(&self, index: &[usize], linear: usize) -> usize {
        match self.strides {
            None => self.offset + linear,
            Some(s) => {
                let mut off = self.offset;
                for (&i, &st) in index.iter().zip(s.iter()) {
                    off += i * st;
                }
                off
            }
        }
    }
}

/// Compare strides against canonical row-major for `dims` without
/// materializing the canonical vector.
pub fn strides_are_canonical(strides: &[usize], dims: &[usize]) -> bool {
    if strides.len() != dims.len() {
        return false;
    }
    let mut acc = 1usize;
    for i in (0..dims.len()).rev() {
        if strides[i] != acc {
            return false;
        }
        acc *= dims[i];
    }
    true
}

/// Visit every multi-index of `dims` in row-major order. Rank 0 visits the
/// empty index exactly once; a zero-sized shape visits nothing. Walks with
/// a fixed-size odometer, no allocation.
pub fn for_each_index(dims: &[usize], mut f: impl FnMut(&[usize])) {
    let rank = dims.len();
    debug_assert!(rank <= MAX_RANK, "rank {} exceeds kernel MAX_RANK", rank);
    if dims.iter().any(|&d| d == 0) {
        return;
    }
    let mut idx = [0usize; MAX_RANK];
    loop {
        f(&idx[..rank]);
        let mut axis = rank;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < dims[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_detection() {
        assert!(strides_are_canonical(&[12, 4, 1], &[2, 3, 4]));
        assert!(!strides_are_canonical(&[4, 4, 1], &[2, 3, 4]));
        assert!(!strides_are_canonical(&[1], &[2, 3]));
        assert!(strides_are_canonical(&[], &[]));
    }

    #[test]
    fn layout_at_custom_strides() {
        // Transposed 2x3 view of a 3x2 buffer: strides [1, 2].
        let l = Layout::strided(0, &[1, 2]);
        assert_eq!(l.at(&[0, 2], 2), 4);
        assert_eq!(l.at(&[1, 1], 4), 3);
    }

    #[test]
    fn for_each_index_counts() {
        let mut n = 0usize;
        for_each_index(&[2, 3, 4], |_| n += 1);
        assert_eq!(n, 24);
        n = 0;
        for_each_index(&[], |_| n += 1);
        assert_eq!(n, 1);
        n = 0;
        for_each_index(&[3, 0], |_| n += 1);
        assert_eq!(n, 0);
    }
}
