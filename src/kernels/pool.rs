//! Pooling kernels over contiguous NCHW buffers, plus the scatter-add
//! primitive max-pool backward routes its gradients through. The
//! with-indices max-pool variant records the flat source index of each
//! winning cell; backward scatters into a zeroed input-shaped buffer, so
//! gradient flux is conserved.

/// Spatial output length of a pooling window (no padding).
pub fn pool_out_len(input: usize, kernel: usize, stride: usize) -> usize {
    debug_assert!(input >= kernel && stride > 0);
    (input - kernel) / stride + 1
}

/// Max-pool. src `[n, c, h, w]`, dst `[n, c, h_out, w_out]`.
#[allow(clippy::too_many_arguments)]
pub fn maxpool2d(
    dst: &mut [f32],
    src: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
) {
    maxpool2d_impl(dst, None, src, n, c, h, w, kh, kw, stride);
}

/// Max-pool recording, per output cell, the flat index of the winning
/// input cell (row-major index into the whole `[n, c, h, w]` source).
#[allow(clippy::too_many_arguments)]
pub fn maxpool2d_with_indices(
    dst: &mut [f32],
    idx: &mut [i32],
    src: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
) {
    maxpool2d_impl(dst, Some(idx), src, n, c, h, w, kh, kw, stride);
}

#[allow(clippy::too_many_arguments)]
fn maxpool2d_impl(
    dst: &mut [f32],
    mut idx: Option<&mut [i32]>,
    src: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
) {
    let h_out = pool_out_len(h, kh, stride.0);
    let w_out = pool_out_len(w, kw, stride.1);
    for p in 0..n * c {
        let ibase = p * h * w;
        let obase = p * h_out * w_out;
        for oh in 0..h_out {
            for ow in 0..w_out {
                let mut best = f32::NEG_INFINITY;
                let mut best_at = ibase;
                for i in 0..kh {
                    let ih = oh * stride.0 + i;
                    let irow = ibase + ih * w;
                    for j in 0..kw {
                        let iw = ow * stride.1 + j;
                        let v = src[irow + iw];
                        if v > best {
                            best = v;
                            best_at = irow + iw;
                        }
                    }
                }
                let o = obase + oh * w_out + ow;
                dst[o] = best;
                if let Some(ix) = idx.as_deref_mut() {
                    ix[o] = best_at as i32;
                }
            }
        }
    }
}

/// Max-pool backward: routes each output gradient to the input cell its
/// forward pass selected. Zeroes dst, then scatter-adds.
pub fn maxpool2d_backward(dst: &mut [f32], grad_out: &[f32], idx: &[i32]) {
    scatter_add(dst, idx, grad_out);
}

/// dst[index[i]] += values[i] over a zeroed dst.
pub fn scatter_add(dst: &mut [f32], index: &[i32], values: &[f32]) {
    debug_assert_eq!(index.len(), values.len());
    for v in dst.iter_mut() {
        *v = 0.0;
    }
    for (&at, &v) in index.iter().zip(values.iter()) {
        dst[at as usize] += v;
    }
}

/// Average-pool. src `[n, c, h, w]`, dst `[n, c, h_out, w_out]`.
#[allow(clippy::too_many_arguments)]
pub fn avgpool2d(
    dst: &mut [f32],
    src: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
) {
    let h_out = pool_out_len(h, kh, stride.0);
    let w_out = pool_out_len(w, kw, stride.1);
    let window = (kh * kw) as f32;
    for p in 0..n * c {
        let ibase = p * h * w;
        let obase = p * h_out * w_out;
        for oh in 0..h_out {
            for ow in 0..w_out {
                let mut s = 0.0f32;
                for i in 0..kh {
                    let irow = ibase + (oh * stride.0 + i) * w;
                    for j in 0..kw {
                        s += src[irow + ow * stride.1 + j];
                    }
                }
                dst[obase + oh * w_out + ow] = s / window;
            }
        }
    }
}

/// Average-pool backward: each output gradient spreads uniformly over its
/// window, divided by the window size. Zeroes dst first.
#[allow(clippy::too_many_arguments)]
pub fn avgpool2d_backward(
    dst: &mut [f32],
    grad_out: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
) {
    let h_out = pool_out_len(h, kh, stride.0);
    let w_out = pool_out_len(w, kw, stride.1);
    let window = (kh * kw) as f32;
    for v in dst[..n * c * h * w].iter_mut() {
        *v = 0.0;
    }
    for p in 0..n * c {
        let ibase = p * h * w;
        let obase = p * h_out * w_out;
        for oh in 0..h_out {
            for ow in 0..w_out {
                let g = grad_out[obase + oh * w_out + ow] / window;
                for i in 0..kh {
                    let irow = ibase + (oh * stride.0 + i) * w;
                    for j in 0..kw {
                        dst[irow + ow * stride.1 + j] += g;
                    }
                }
            }
        }
    }
}

/// Global average pool: src `[n, c, h, w]` -> dst `[n, c]`.
pub fn global_avgpool2d(dst: &mut [f32], src: &[f32], n: usize, c: usize, h: usize, w: usize) {
    let plane = h * w;
    for p in 0..n * c {
        let base = p * plane;
        let mut s = 0.0f32;
        for v in &src[base..base + plane] {
            s += v;
        }
        dst[p] = s / plane as f32;
    }
}

/// Global average pool backward: the per-channel gradient spreads
/// uniformly over all spatial positions.
pub fn global_avgpool2d_backward(
    dst: &mut [f32],
    grad_out: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
) {
    let plane = h * w;
    for p in 0..n * c {
        let g = grad_out[p] / plane as f32;
        let base = p * plane;
        for v in dst[base..base + plane].iter_mut() {
            *v = g;
        }
    }
}

/// Adaptive average pool to a target spatial size. Window bounds per
/// output cell: `[⌊i·in/out⌋, ⌈(i+1)·in/out⌉)`.
#[allow(clippy::too_many_arguments)]
pub fn adaptive_avgpool2d(
    dst: &mut [f32],
    src: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    out_h: usize,
    out_w: usize,
) {
    for p in 0..n * c {
        let ibase = p * h * w;
        let obase = p * out_h * out_w;
        for oh in 0..out_h {
            let h0 = oh * h / out_h;
            let h1 = ((oh + 1) * h).div_ceil(out_h);
            for ow in 0..out_w {
                let w0 = ow * w / out_w;
                let w1 = ((ow + 1) * w).div_ceil(out_w);
                let mut s = 0.0f32;
                for ih in h0..h1 {
                    for iw in w0..w1 {
                        s += src[ibase + ih * w + iw];
                    }
                }
                dst[obase + oh * out_w + ow] = s / ((h1 - h0) * (w1 - w0)) as f32;
            }
        }
    }
}
