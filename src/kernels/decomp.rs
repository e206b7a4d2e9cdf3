//! Matrix decomposition kernels: LU with partial pivoting (+ inverse),
//! Householder QR, one-sided Jacobi SVD, and the SVD-based pseudo-inverse.
//! All matrices are row-major. Singularity and non-convergence surface as
//! [`KernelError::NumericFailure`]; these kernels never panic on bad data.

use super::{blas, KernelError, KernelResult};

const PIVOT_EPS: f32 = 1e-12;
const JACOBI_EPS: f32 = 1e-9;
const JACOBI_MAX_SWEEPS: usize = 60;

/// LU factorization with partial pivoting, in place. On return `a` holds
/// L (unit diagonal, below) and U (on and above); `piv[k]` is the row
/// swapped into position k.
pub fn getrf(a: &mut [f32], n: usize, piv: &mut [usize]) -> KernelResult<()> {
    debug_assert!(a.len() >= n * n && piv.len() >= n);
    for k in 0..n {
        // Pivot: largest magnitude in column k at or below the diagonal.
        let mut p = k;
        let mut best = a[k * n + k].abs();
        for i in k + 1..n {
            let v = a[i * n + k].abs();
            if v > best {
                best = v;
                p = i;
            }
        }
        if best <= PIVOT_EPS {
            return Err(KernelError::NumericFailure(format!(
                "lu: singular at column {}",
                k
            )));
        }
        piv[k] = p;
        if p != k {
            for j in 0..n {
                a.swap(k * n + j, p * n + j);
            }
        }
        let pivot = a[k * n + k];
        for i in k + 1..n {
            let l = a[i * n + k] / pivot;
            a[i * n + k] = l;
            for j in k + 1..n {
                a[i * n + j] -= l * a[k * n + j];
            }
        }
    }
    Ok(())
}

/// Matrix inverse from a [`getrf`] factorization: solves A·X = I column by
/// column. `inv` receives the n×n inverse.
pub fn getri(lu: &[f32], n: usize, piv: &[usize], inv: &mut [f32]) -> KernelResult<()> {
    debug_assert!(lu.len() >= n * n && inv.len() >= n * n);
    let mut col = vec![0.0f32; n];
    for rhs in 0..n {
        for v in col.iter_mut() {
            *v = 0.0;
        }
        col[rhs] = 1.0;
        // Apply row swaps to the right-hand side.
        for k in 0..n {
            col.swap(k, piv[k]);
        }
        // Forward substitution with unit-diagonal L.
        for i in 0..n {
            for j in 0..i {
                col[i] -= lu[i * n + j] * col[j];
            }
        }
        // Back substitution with U.
        for i in (0..n).rev() {
            for j in i + 1..n {
                col[i] -= lu[i * n + j] * col[j];
            }
            let d = lu[i * n + i];
            if d.abs() <= PIVOT_EPS {
                return Err(KernelError::NumericFailure("inverse: zero pivot".into()));
            }
            col[i] /= d;
        }
        for i in 0..n {
            inv[i * n + rhs] = col[i];
        }
    }
    Ok(())
}

/// Householder QR of an m×n matrix (m ≥ n), in place. On return the upper
/// triangle of `a` holds R; the Householder vectors live below the
/// diagonal with scaling factors in `tau`.
pub fn geqrf(a: &mut [f32], m: usize, n: usize, tau: &mut [f32]) -> KernelResult<()> {
    if m < n {
        return Err(KernelError::NumericFailure(
            "qr: requires m >= n".into(),
        ));
    }
    debug_assert!(a.len() >= m * n && tau.len() >= n);
    for k in 0..n {
        // Norm of the k-th column below the diagonal.
        let mut norm = 0.0f32;
        for i in k..m {
            norm += a[i * n + k] * a[i * n + k];
        }
        norm = norm.sqrt();
        if norm <= PIVOT_EPS {
            tau[k] = 0.0;
            continue;
        }
        let alpha = if a[k * n + k] > 0.0 { -norm } else { norm };
        let head = a[k * n + k] - alpha;
        // v = (1, a[k+1..m]/head); tau = -head/alpha.
        for i in k + 1..m {
            a[i * n + k] /= head;
        }
        tau[k] = -head / alpha;
        a[k * n + k] = alpha;
        // Apply the reflector to the remaining columns.
        for j in k + 1..n {
            let mut s = a[k * n + j];
            for i in k + 1..m {
                s += a[i * n + k] * a[i * n + j];
            }
            s *= tau[k];
            a[k * n + j] -= s;
            for i in k + 1..m {
                a[i * n + j] -= s * a[i * n + k];
            }
        }
    }
    Ok(())
}

/// Form the thin explicit Q (m×n) from a [`geqrf`] factorization.
pub fn orgqr(q: &mut [f32], a: &[f32], m: usize, n: usize, tau: &[f32]) {
    debug_assert!(q.len() >= m * n && a.len() >= m * n);
    // Start from the identity and apply reflectors in reverse order.
    for i in 0..m {
        for j in 0..n {
            q[i * n + j] = if i == j { 1.0 } else { 0.0 };
        }
    }
    for k in (0..n).rev() {
        if tau[k] == 0.0 {
            continue;
        }
        for j in 0..n {
            let mut s = q[k * n + j];
            for i in k + 1..m {
                s += a[i * n + k] * q[i * n + j];
            }
            s *= tau[k];
            q[k * n + j] -= s;
            for i in k + 1..m {
                q[i * n + j] -= s * a[i * n + k];
            }
        }
    }
}

/// One-sided Jacobi SVD of an m×n matrix with m ≥ n: A = U·diag(s)·Vᵀ.
/// `u` (m×n) receives the left singular vectors, `s` (n) the singular
/// values in the rotation's final order, `vt` (n×n) the right singular
/// vectors transposed. Fails after [`JACOBI_MAX_SWEEPS`] sweeps without
/// convergence.
pub fn gesvd(
    a: &[f32],
    m: usize,
    n: usize,
    u: &mut [f32],
    s: &mut [f32],
    vt: &mut [f32],
) -> KernelResult<()> {
    if m < n {
        return Err(KernelError::NumericFailure(
            "svd: requires m >= n".into(),
        ));
    }
    debug_assert!(a.len() >= m * n && u.len() >= m * n && s.len() >= n && vt.len() >= n * n);
    u[..m * n].copy_from_slice(&a[..m * n]);
    // V starts as the identity; rotations accumulate into it.
    let mut v = vec![0.0f32; n * n];
    for j in 0..n {
        v[j * n + j] = 1.0;
    }
    let mut converged = false;
    for _sweep in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0f32;
        for p in 0..n {
            for q in p + 1..n {
                let mut alpha = 0.0f32;
                let mut beta = 0.0f32;
                let mut gamma = 0.0f32;
                for i in 0..m {
                    let ap = u[i * n + p];
                    let aq = u[i * n + q];
                    alpha += ap * ap;
                    beta += aq * aq;
                    gamma += ap * aq;
                }
                off = off.max(gamma.abs() / (alpha * beta).sqrt().max(f32::MIN_POSITIVE));
                if gamma.abs() <= JACOBI_EPS * (alpha * beta).sqrt() {
                    continue;
                }
                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let sn = c * t;
                for i in 0..m {
                    let ap = u[i * n + p];
                    let aq = u[i * n + q];
                    u[i * n + p] = c * ap - sn * aq;
                    u[i * n + q] = sn * ap + c * aq;
                }
                for i in 0..n {
                    let vp = v[i * n + p];
                    let vq = v[i * n + q];
                    v[i * n + p] = c * vp - sn * vq;
                    v[i * n + q] = sn * vp + c * vq;
                }
            }
        }
        if off <= JACOBI_EPS {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(KernelError::NumericFailure(
            "svd: jacobi sweeps did not converge".into(),
        ));
    }
    // Column norms are the singular values; normalize U's columns.
    for j in 0..n {
        let mut norm = 0.0f32;
        for i in 0..m {
            norm += u[i * n + j] * u[i * n + j];
        }
        norm = norm.sqrt();
        s[j] = norm;
        if norm > 0.0 {
            for i in 0..m {
                u[i * n + j] /= norm;
            }
        }
    }
    for i in 0..n {
        for j in 0..n {
            vt[j * n + i] = v[i * n + j];
        }
    }
    Ok(())
}

/// Moore-Penrose pseudo-inverse via SVD: dst (n×m) = V·Σ⁺·Uᵀ.
/// Singular values below `max(m, n)·ε·σ_max` are treated as zero.
pub fn gepseu(dst: &mut [f32], a: &[f32], m: usize, n: usize) -> KernelResult<()> {
    debug_assert!(dst.len() >= n * m && a.len() >= m * n);
    if m < n {
        // (Aᵀ)⁺ = (A⁺)ᵀ: transpose, recurse, transpose back.
        let mut at = vec![0.0f32; n * m];
        blas::transpose(&mut at, a, m, n);
        let mut pinv_t = vec![0.0f32; m * n];
        gepseu(&mut pinv_t, &at, n, m)?;
        blas::transpose(dst, &pinv_t, m, n);
        return Ok(());
    }
    let mut u = vec![0.0f32; m * n];
    let mut s = vec![0.0f32; n];
    let mut vt = vec![0.0f32; n * n];
    gesvd(a, m, n, &mut u, &mut s, &mut vt)?;
    let smax = s.iter().cloned().fold(0.0f32, f32::max);
    let cutoff = m.max(n) as f32 * f32::EPSILON * smax;
    // dst = V·Σ⁺·Uᵀ, built as Σ_j (1/s_j)·v_j·u_jᵀ.
    for v in dst[..n * m].iter_mut() {
        *v = 0.0;
    }
    for j in 0..n {
        if s[j] <= cutoff {
            continue;
        }
        let inv = 1.0 / s[j];
        for r in 0..n {
            let vr = vt[j * n + r] * inv;
            if vr == 0.0 {
                continue;
            }
            for c in 0..m {
                dst[r * m + c] += vr * u[c * n + j];
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lu_inverse_round_trip() {
        let a = [4.0f32, 3.0, 6.0, 3.0];
        let mut lu = a;
        let mut piv = [0usize; 2];
        getrf(&mut lu, 2, &mut piv).unwrap();
        let mut inv = [0.0f32; 4];
        getri(&lu, 2, &piv, &mut inv).unwrap();
        // A · A⁻¹ = I.
        let mut id = [0.0f32; 4];
        blas::gemm_nn(&mut id, &a, &inv, 2, 2, 2);
        assert_relative_eq!(id[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(id[1], 0.0, epsilon = 1e-5);
        assert_relative_eq!(id[2], 0.0, epsilon = 1e-5);
        assert_relative_eq!(id[3], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn lu_rejects_singular() {
        let mut a = [1.0f32, 2.0, 2.0, 4.0];
        let mut piv = [0usize; 2];
        assert!(getrf(&mut a, 2, &mut piv).is_err());
    }

    #[test]
    fn qr_reconstructs() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3x2
        let mut f = a;
        let mut tau = [0.0f32; 2];
        geqrf(&mut f, 3, 2, &mut tau).unwrap();
        let mut q = [0.0f32; 6];
        orgqr(&mut q, &f, 3, 2, &tau);
        // R: upper triangle of f.
        let r = [f[0], f[1], 0.0, f[3]];
        let mut qr = [0.0f32; 6];
        blas::gemm_nn(&mut qr, &q, &r, 3, 2, 2);
        for i in 0..6 {
            assert_relative_eq!(qr[i], a[i], epsilon = 1e-4);
        }
    }

    #[test]
    fn svd_reconstructs() {
        let a = [3.0f32, 1.0, 1.0, 3.0, 0.5, -0.5]; // 3x2
        let mut u = [0.0f32; 6];
        let mut s = [0.0f32; 2];
        let mut vt = [0.0f32; 4];
        gesvd(&a, 3, 2, &mut u, &mut s, &mut vt).unwrap();
        // U·diag(s)·Vᵀ = A.
        let us = [
            u[0] * s[0],
            u[1] * s[1],
            u[2] * s[0],
            u[3] * s[1],
            u[4] * s[0],
            u[5] * s[1],
        ];
        let mut back = [0.0f32; 6];
        blas::gemm_nn(&mut back, &us, &vt, 3, 2, 2);
        for i in 0..6 {
            assert_relative_eq!(back[i], a[i], epsilon = 1e-3);
        }
    }

    #[test]
    fn pseudo_inverse_of_square_matches_inverse() {
        let a = [4.0f32, 7.0, 2.0, 6.0];
        let mut pinv = [0.0f32; 4];
        gepseu(&mut pinv, &a, 2, 2).unwrap();
        let mut id = [0.0f32; 4];
        blas::gemm_nn(&mut id, &a, &pinv, 2, 2, 2);
        assert_relative_eq!(id[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(id[3], 1.0, epsilon = 1e-3);
        assert_relative_eq!(id[1], 0.0, epsilon = 1e-3);
        assert_relative_eq!(id[2], 0.0, epsilon = 1e-3);
    }
}
