//! Reduction kernels: sum and mean over an axis set, max/min/argmax along
//! a single axis. Reduced axes are removed from the output shape; reducing
//! every axis leaves a single element.

use super::{for_each_index, Layout, MAX_RANK};
use crate::shape::Shape;

/// Sum of a contiguous slice.
pub fn sum_all(src: &[f32]) -> f32 {
    src.iter().sum()
}

/// Mean of a contiguous slice. 0 for an empty slice.
pub fn mean_all(src: &[f32]) -> f32 {
    if src.is_empty() {
        0.0
    } else {
        sum_all(src) / src.len() as f32
    }
}

/// Sum over every element addressed by the layout.
pub fn sum_all_strided(src: &[f32], sl: &Layout, shape: &Shape) -> f32 {
    let dims = shape.dims();
    if sl.is_canonical(dims) {
        return sum_all(&src[sl.offset..sl.offset + shape.numel()]);
    }
    let mut total = 0.0f32;
    let mut k = 0usize;
    for_each_index(dims, |idx| {
        total += src[sl.at(idx, k)];
        k += 1;
    });
    total
}

/// Per-input-axis output strides for a reduction: reduced axes contribute
/// stride 0, surviving axes get canonical strides of the output shape.
/// Returns (strides, output element count).
fn reduction_strides(dims: &[usize], axes: &[usize]) -> ([usize; MAX_RANK], usize) {
    let rank = dims.len();
    debug_assert!(rank <= MAX_RANK);
    let mut reduced = [false; MAX_RANK];
    for &a in axes {
        debug_assert!(a < rank, "reduction axis {} out of range", a);
        reduced[a] = true;
    }
    let mut ostrides = [0usize; MAX_RANK];
    let mut acc = 1usize;
    for i in (0..rank).rev() {
        if !reduced[i] {
            ostrides[i] = acc;
            acc *= dims[i];
        }
    }
    (ostrides, acc)
}

/// Sum along the given axes. `dst` holds the output (reduced axes removed,
/// canonical layout) and is overwritten.
pub fn sum_axes(dst: &mut [f32], src: &[f32], sl: &Layout, shape: &Shape, axes: &[usize]) {
    let dims = shape.dims();
    let (ostrides, onumel) = reduction_strides(dims, axes);
    for v in dst[..onumel].iter_mut() {
        *v = 0.0;
    }
    let mut k = 0usize;
    for_each_index(dims, |idx| {
        let mut o = 0usize;
        for (i, &ix) in idx.iter().enumerate() {
            o += ix * ostrides[i];
        }
        dst[o] += src[sl.at(idx, k)];
        k += 1;
    });
}

/// Mean along the given axes: sum divided by the reduced element count.
pub fn mean_axes(dst: &mut [f32], src: &[f32], sl: &Layout, shape: &Shape, axes: &[usize]) {
    let dims = shape.dims();
    sum_axes(dst, src, sl, shape, axes);
    let (_, onumel) = reduction_strides(dims, axes);
    let total = shape.numel();
    if total == 0 || onumel == 0 {
        return;
    }
    let count = (total / onumel) as f32;
    for v in dst[..onumel].iter_mut() {
        *v /= count;
    }
}

/// Max along one axis. `vals` receives the maxima; `arg`, when given,
/// receives the winning coordinate along `axis` (first winner on ties).
pub fn max_axis(
    vals: &mut [f32],
    mut arg: Option<&mut [i32]>,
    src: &[f32],
    sl: &Layout,
    shape: &Shape,
    axis: usize,
) {
    let dims = shape.dims();
    let (ostrides, onumel) = reduction_strides(dims, &[axis]);
    for v in vals[..onumel].iter_mut() {
        *v = f32::NEG_INFINITY;
    }
    if let Some(a) = arg.as_deref_mut() {
        for v in a[..onumel].iter_mut() {
            *v = 0;
        }
    }
    let mut k = 0usize;
    for_each_index(dims, |idx| {
        let mut o = 0usize;
        for (i, &ix) in idx.iter().enumerate() {
            o += ix * ostrides[i];
        }
        let v = src[sl.at(idx, k)];
        if v > vals[o] {
            vals[o] = v;
            if let Some(a) = arg.as_deref_mut() {
                a[o] = idx[axis] as i32;
            }
        }
        k += 1;
    });
}

/// Min along one axis.
pub fn min_axis(vals: &mut [f32], src: &[f32], sl: &Layout, shape: &Shape, axis: usize) {
    let dims = shape.dims();
    let (ostrides, onumel) = reduction_strides(dims, &[axis]);
    for v in vals[..onumel].iter_mut() {
        *v = f32::INFINITY;
    }
    let mut k = 0usize;
    for_each_index(dims, |idx| {
        let mut o = 0usize;
        for (i, &ix) in idx.iter().enumerate() {
            o += ix * ostrides[i];
        }
        let v = src[sl.at(idx, k)];
        if v < vals[o] {
            vals[o] = v;
        }
        k += 1;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_one_axis() {
        // [[1,2,3],[4,5,6]] summed over axis 0 -> [5,7,9]; axis 1 -> [6,15].
        let src = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let s = Shape::new(vec![2, 3]);
        let l = Layout::contiguous(0);
        let mut d = [0.0f32; 3];
        sum_axes(&mut d, &src, &l, &s, &[0]);
        assert_eq!(d, [5.0, 7.0, 9.0]);
        let mut d2 = [0.0f32; 2];
        sum_axes(&mut d2, &src, &l, &s, &[1]);
        assert_eq!(d2, [6.0, 15.0]);
    }

    #[test]
    fn sum_all_axes_leaves_one() {
        let src = [1.0f32, 2.0, 3.0, 4.0];
        let s = Shape::new(vec![2, 2]);
        let l = Layout::contiguous(0);
        let mut d = [0.0f32; 1];
        sum_axes(&mut d, &src, &l, &s, &[0, 1]);
        assert_eq!(d, [10.0]);
    }

    #[test]
    fn mean_axes_divides_by_reduced_count() {
        let src = [2.0f32, 4.0, 6.0, 8.0];
        let s = Shape::new(vec![2, 2]);
        let l = Layout::contiguous(0);
        let mut d = [0.0f32; 2];
        mean_axes(&mut d, &src, &l, &s, &[0]);
        assert_eq!(d, [4.0, 6.0]);
    }

    #[test]
    fn max_with_argmax() {
        let src = [1.0f32, 9.0, 3.0, 7.0, 5.0, 2.0];
        let s = Shape::new(vec![2, 3]);
        let l = Layout::contiguous(0);
        let mut vals = [0.0f32; 2];
        let mut arg = [0i32; 2];
        max_axis(&mut vals, Some(&mut arg), &src, &l, &s, 1);
        assert_eq!(vals, [9.0, 7.0]);
        assert_eq!(arg, [1, 0]);
    }
}
