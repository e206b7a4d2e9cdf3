//! BLAS-like kernels over contiguous row-major buffers: matrix-vector and
//! matrix-matrix products, vector update primitives, and transpose. Large
//! matrix products split output rows across the rayon pool; each chunk
//! writes a disjoint region, so ordering is preserved.

use super::PAR_THRESHOLD;
use rayon::prelude::*;

/// y = A·x. A is m×n row-major, x has n elements, y has m.
pub fn gemv_n(y: &mut [f32], a: &[f32], x: &[f32], m: usize, n: usize) {
    debug_assert!(a.len() >= m * n && x.len() >= n && y.len() >= m);
    for i in 0..m {
        let row = &a[i * n..(i + 1) * n];
        let mut s = 0.0f32;
        for j in 0..n {
            s += row[j] * x[j];
        }
        y[i] = s;
    }
}

/// y = Aᵀ·x. A is m×n row-major, x has m elements, y has n.
pub fn gemv_t(y: &mut [f32], a: &[f32], x: &[f32], m: usize, n: usize) {
    debug_assert!(a.len() >= m * n && x.len() >= m && y.len() >= n);
    for v in y[..n].iter_mut() {
        *v = 0.0;
    }
    for i in 0..m {
        let row = &a[i * n..(i + 1) * n];
        let xi = x[i];
        for j in 0..n {
            y[j] += row[j] * xi;
        }
    }
}

/// C = A·B. A m×k, B k×n, C m×n, all row-major.
pub fn gemm_nn(c: &mut [f32], a: &[f32], b: &[f32], m: usize, k: usize, n: usize) {
    debug_assert!(a.len() >= m * k && b.len() >= k * n && c.len() >= m * n);
    let work = m * k * n;
    if work >= PAR_THRESHOLD && m > 1 {
        c[..m * n]
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, crow)| gemm_nn_row(crow, &a[i * k..(i + 1) * k], b, k, n));
    } else {
        for i in 0..m {
            gemm_nn_row(&mut c[i * n..(i + 1) * n], &a[i * k..(i + 1) * k], b, k, n);
        }
    }
}

#[inline]
fn gemm_nn_row(crow: &mut [f32], arow: &[f32], b: &[f32], k: usize, n: usize) {
    for v in crow[..n].iter_mut() {
        *v = 0.0;
    }
    for (p, &apv) in arow[..k].iter().enumerate() {
        let brow = &b[p * n..(p + 1) * n];
        for j in 0..n {
            crow[j] += apv * brow[j];
        }
    }
}

/// C = A·Bᵀ. A m×k, B n×k, C m×n.
pub fn gemm_nt(c: &mut [f32], a: &[f32], b: &[f32], m: usize, k: usize, n: usize) {
    debug_assert!(a.len() >= m * k && b.len() >= n * k && c.len() >= m * n);
    for i in 0..m {
        let arow = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let brow = &b[j * k..(j + 1) * k];
            let mut s = 0.0f32;
            for p in 0..k {
                s += arow[p] * brow[p];
            }
            c[i * n + j] = s;
        }
    }
}

/// C += Aᵀ·B. A k×m, B k×n, C m×n. Accumulating form used for weight
/// gradients.
pub fn gemm_tn_acc(c: &mut [f32], a: &[f32], b: &[f32], m: usize, k: usize, n: usize) {
    debug_assert!(a.len() >= k * m && b.len() >= k * n && c.len() >= m * n);
    for p in 0..k {
        let arow = &a[p * m..(p + 1) * m];
        let brow = &b[p * n..(p + 1) * n];
        for i in 0..m {
            let av = arow[i];
            if av == 0.0 {
                continue;
            }
            let crow = &mut c[i * n..(i + 1) * n];
            for j in 0..n {
                crow[j] += av * brow[j];
            }
        }
    }
}

/// General product: C = alpha·A·B + beta·C. A m×k, B k×n.
pub fn gemm(
    alpha: f32,
    a: &[f32],
    b: &[f32],
    beta: f32,
    c: &mut [f32],
    m: usize,
    k: usize,
    n: usize,
) {
    debug_assert!(a.len() >= m * k && b.len() >= k * n && c.len() >= m * n);
    for i in 0..m {
        let arow = &a[i * k..(i + 1) * k];
        let crow = &mut c[i * n..(i + 1) * n];
        if beta == 0.0 {
            for v in crow[..n].iter_mut() {
                *v = 0.0;
            }
        } else if beta != 1.0 {
            for v in crow[..n].iter_mut() {
                *v *= beta;
            }
        }
        for (p, &apv) in arow[..k].iter().enumerate() {
            let s = alpha * apv;
            if s == 0.0 {
                continue;
            }
            let brow = &b[p * n..(p + 1) * n];
            for j in 0..n {
                crow[j] += s * brow[j];
            }
        }
    }
}

/// A += alpha · x·yᵀ. Rank-1 update: A m×n, x m, y n.
pub fn ger_acc(a: &mut [f32], alpha: f32, x: &[f32], y: &[f32], m: usize, n: usize) {
    debug_assert!(a.len() >= m * n && x.len() >= m && y.len() >= n);
    for i in 0..m {
        let s = alpha * x[i];
        if s == 0.0 {
            continue;
        }
        let row = &mut a[i * n..(i + 1) * n];
        for j in 0..n {
            row[j] += s * y[j];
        }
    }
}

/// y += alpha·x.
pub fn axpy(y: &mut [f32], alpha: f32, x: &[f32]) {
    debug_assert_eq!(y.len(), x.len());
    for (yv, &xv) in y.iter_mut().zip(x.iter()) {
        *yv += alpha * xv;
    }
}

/// x *= alpha.
pub fn scal(x: &mut [f32], alpha: f32) {
    for v in x.iter_mut() {
        *v *= alpha;
    }
}

/// Dot product.
pub fn dot(x: &[f32], y: &[f32]) -> f32 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y.iter()).map(|(&a, &b)| a * b).sum()
}

/// dst = srcᵀ for a m×n row-major matrix; dst is n×m.
pub fn transpose(dst: &mut [f32], src: &[f32], m: usize, n: usize) {
    debug_assert!(src.len() >= m * n && dst.len() >= m * n);
    for i in 0..m {
        for j in 0..n {
            dst[j * m + i] = src[i * n + j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemv_both_orientations() {
        // A = [[1,2,3],[4,5,6]] (2x3).
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut y = [0.0f32; 2];
        gemv_n(&mut y, &a, &[1.0, 1.0, 1.0], 2, 3);
        assert_eq!(y, [6.0, 15.0]);
        let mut yt = [0.0f32; 3];
        gemv_t(&mut yt, &a, &[1.0, 1.0], 2, 3);
        assert_eq!(yt, [5.0, 7.0, 9.0]);
    }

    #[test]
    fn gemm_nn_small() {
        let a = [1.0f32, 2.0, 3.0, 4.0]; // 2x2
        let b = [5.0f32, 6.0, 7.0, 8.0]; // 2x2
        let mut c = [0.0f32; 4];
        gemm_nn(&mut c, &a, &b, 2, 2, 2);
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn gemm_variants_agree() {
        // C1 = A·Bᵀ computed via gemm_nt must equal gemm_nn with B
        // transposed by hand.
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
        let b = [1.0f32, 0.0, 2.0, -1.0, 1.0, 3.0]; // 2x3 (as n x k)
        let mut bt = [0.0f32; 6];
        transpose(&mut bt, &b, 2, 3);
        let mut c1 = [0.0f32; 4];
        gemm_nt(&mut c1, &a, &b, 2, 3, 2);
        let mut c2 = [0.0f32; 4];
        gemm_nn(&mut c2, &a, &bt, 2, 3, 2);
        assert_eq!(c1, c2);
    }

    #[test]
    fn ger_accumulates() {
        let mut a = [1.0f32; 4];
        ger_acc(&mut a, 2.0, &[1.0, 2.0], &[3.0, 4.0], 2, 2);
        assert_eq!(a, [7.0, 9.0, 13.0, 17.0]);
    }

    #[test]
    fn axpy_scal_dot() {
        let mut y = [1.0f32, 2.0];
        axpy(&mut y, 0.5, &[4.0, 8.0]);
        assert_eq!(y, [3.0, 6.0]);
        scal(&mut y, 2.0);
        assert_eq!(y, [6.0, 12.0]);
        assert_eq!(dot(&y, &[1.0, 1.0]), 18.0);
    }
}
