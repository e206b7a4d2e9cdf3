//! Convolution kernels over contiguous NCHW buffers: 1-D/2-D/3-D forward,
//! transposed, grouped/dilated/depth-wise 2-D, kernel-gradient kernels, and
//! the im2col/col2im/pad shape glue. Weight layout is
//! `[c_out, c_in/groups, k..]`; spatial output size is
//! `(in + 2·pad − eff_kernel) / stride + 1` with
//! `eff_kernel = (kernel − 1)·dilation + 1`.

use super::PAR_THRESHOLD;
use rayon::prelude::*;

/// Spatial output length of a (possibly dilated) convolution.
pub fn conv_out_len(input: usize, kernel: usize, stride: usize, pad: usize, dilation: usize) -> usize {
    let eff = (kernel - 1) * dilation + 1;
    debug_assert!(input + 2 * pad >= eff);
    (input + 2 * pad - eff) / stride + 1
}

/// Spatial output length of a transposed convolution.
/// `output_pad` must be smaller than `stride`.
pub fn conv_transposed_out_len(
    input: usize,
    kernel: usize,
    stride: usize,
    pad: usize,
    output_pad: usize,
) -> usize {
    debug_assert!(output_pad < stride.max(1));
    (input - 1) * stride + kernel + output_pad - 2 * pad
}

/// 1-D convolution. src `[n, c_in, l]`, weights `[c_out, c_in, kl]`,
/// dst `[n, c_out, l_out]`.
#[allow(clippy::too_many_arguments)]
pub fn conv1d(
    dst: &mut [f32],
    src: &[f32],
    w: &[f32],
    n: usize,
    c_in: usize,
    l_in: usize,
    c_out: usize,
    kl: usize,
    stride: usize,
    pad: usize,
) {
    let l_out = conv_out_len(l_in, kl, stride, pad, 1);
    debug_assert!(dst.len() >= n * c_out * l_out);
    for b in 0..n {
        for co in 0..c_out {
            let wbase = co * c_in * kl;
            let obase = (b * c_out + co) * l_out;
            for ol in 0..l_out {
                let mut s = 0.0f32;
                for ci in 0..c_in {
                    let ibase = (b * c_in + ci) * l_in;
                    let kbase = wbase + ci * kl;
                    for k in 0..kl {
                        let il = (ol * stride + k) as isize - pad as isize;
                        if il >= 0 && (il as usize) < l_in {
                            s += src[ibase + il as usize] * w[kbase + k];
                        }
                    }
                }
                dst[obase + ol] = s;
            }
        }
    }
}

/// 2-D convolution with stride, padding, dilation, and groups.
/// src `[n, c_in, h, w]`, weights `[c_out, c_in/groups, kh, kw]`,
/// dst `[n, c_out, h_out, w_out]`. Large outputs split `(batch, channel)`
/// planes across the rayon pool.
#[allow(clippy::too_many_arguments)]
pub fn conv2d(
    dst: &mut [f32],
    src: &[f32],
    w: &[f32],
    n: usize,
    c_in: usize,
    h_in: usize,
    w_in: usize,
    c_out: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
    pad: (usize, usize),
    dilation: (usize, usize),
    groups: usize,
) {
    debug_assert!(groups >= 1 && c_in % groups == 0 && c_out % groups == 0);
    let h_out = conv_out_len(h_in, kh, stride.0, pad.0, dilation.0);
    let w_out = conv_out_len(w_in, kw, stride.1, pad.1, dilation.1);
    let plane = h_out * w_out;
    debug_assert!(dst.len() >= n * c_out * plane);
    let work = n * c_out * plane * kh * kw;
    if work >= PAR_THRESHOLD && n * c_out > 1 {
        dst[..n * c_out * plane]
            .par_chunks_mut(plane)
            .enumerate()
            .for_each(|(p, out)| {
                let b = p / c_out;
                let co = p % c_out;
                conv2d_plane(
                    out, src, w, b, co, c_in, h_in, w_in, c_out, kh, kw, stride, pad, dilation,
                    groups,
                );
            });
    } else {
        for b in 0..n {
            for co in 0..c_out {
                let obase = (b * c_out + co) * plane;
                conv2d_plane(
                    &mut dst[obase..obase + plane],
                    src,
                    w,
                    b,
                    co,
                    c_in,
                    h_in,
                    w_in,
                    c_out,
                    kh,
                    kw,
                    stride,
                    pad,
                    dilation,
                    groups,
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn conv2d_plane(
    out: &mut [f32],
    src: &[f32],
    w: &[f32],
    b: usize,
    co: usize,
    c_in: usize,
    h_in: usize,
    w_in: usize,
    c_out: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
    pad: (usize, usize),
    dilation: (usize, usize),
    groups: usize,
) {
    let h_out = conv_out_len(h_in, kh, stride.0, pad.0, dilation.0);
    let w_out = conv_out_len(w_in, kw, stride.1, pad.1, dilation.1);
    let cg = c_in / groups;
    let g = co / (c_out / groups);
    let wbase = co * cg * kh * kw;
    for oh in 0..h_out {
        for ow in 0..w_out {
            let mut s = 0.0f32;
            for cig in 0..cg {
                let ci = g * cg + cig;
                let ibase = (b * c_in + ci) * h_in * w_in;
                let kbase = wbase + cig * kh * kw;
                for i in 0..kh {
                    let ih = (oh * stride.0 + i * dilation.0) as isize - pad.0 as isize;
                    if ih < 0 || ih as usize >= h_in {
                        continue;
                    }
                    let irow = ibase + ih as usize * w_in;
                    let krow = kbase + i * kw;
                    for j in 0..kw {
                        let iw = (ow * stride.1 + j * dilation.1) as isize - pad.1 as isize;
                        if iw < 0 || iw as usize >= w_in {
                            continue;
                        }
                        s += src[irow + iw as usize] * w[krow + j];
                    }
                }
            }
            out[oh * w_out + ow] = s;
        }
    }
}

/// Depth-wise 2-D convolution: one group per input channel.
#[allow(clippy::too_many_arguments)]
pub fn conv2d_depthwise(
    dst: &mut [f32],
    src: &[f32],
    w: &[f32],
    n: usize,
    c: usize,
    h_in: usize,
    w_in: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
    pad: (usize, usize),
) {
    conv2d(
        dst,
        src,
        w,
        n,
        c,
        h_in,
        w_in,
        c,
        kh,
        kw,
        stride,
        pad,
        (1, 1),
        c,
    );
}

/// Transposed 2-D convolution: each source element scatters through the
/// kernel. src `[n, c_src, h, w]`, weights `[c_src, c_dst/groups, kh, kw]`
/// in forward layout, so this kernel is also the input-gradient of
/// `conv2d`. dst `[n, c_dst, h_dst, w_dst]`. Zeroes dst before
/// accumulating.
#[allow(clippy::too_many_arguments)]
pub fn conv2d_transposed(
    dst: &mut [f32],
    src: &[f32],
    w: &[f32],
    n: usize,
    c_src: usize,
    h_src: usize,
    w_src: usize,
    c_dst: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
    pad: (usize, usize),
    dilation: (usize, usize),
    output_pad: (usize, usize),
    groups: usize,
) {
    debug_assert!(groups >= 1 && c_src % groups == 0 && c_dst % groups == 0);
    let eff_h = (kh - 1) * dilation.0 + 1;
    let eff_w = (kw - 1) * dilation.1 + 1;
    let h_dst = conv_transposed_out_len(h_src, eff_h, stride.0, pad.0, output_pad.0);
    let w_dst = conv_transposed_out_len(w_src, eff_w, stride.1, pad.1, output_pad.1);
    let total = n * c_dst * h_dst * w_dst;
    let cg = c_dst / groups;
    debug_assert!(dst.len() >= total);
    for v in dst[..total].iter_mut() {
        *v = 0.0;
    }
    for b in 0..n {
        for cs in 0..c_src {
            let g = cs / (c_src / groups);
            let sbase = (b * c_src + cs) * h_src * w_src;
            let wbase = cs * cg * kh * kw;
            for sh in 0..h_src {
                for sw in 0..w_src {
                    let v = src[sbase + sh * w_src + sw];
                    if v == 0.0 {
                        continue;
                    }
                    for cdg in 0..cg {
                        let cd = g * cg + cdg;
                        let dbase = (b * c_dst + cd) * h_dst * w_dst;
                        let kbase = wbase + cdg * kh * kw;
                        for i in 0..kh {
                            let dh = (sh * stride.0 + i * dilation.0) as isize - pad.0 as isize;
                            if dh < 0 || dh as usize >= h_dst {
                                continue;
                            }
                            let drow = dbase + dh as usize * w_dst;
                            let krow = kbase + i * kw;
                            for j in 0..kw {
                                let dw = (sw * stride.1 + j * dilation.1) as isize - pad.1 as isize;
                                if dw < 0 || dw as usize >= w_dst {
                                    continue;
                                }
                                dst[drow + dw as usize] += v * w[krow + j];
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Kernel gradient of `conv2d`: dw `[c_out, c_in/groups, kh, kw]` receives
/// `dw += Σ input ⊛ grad_out`. Accumulating; the caller zeros `dw` when it
/// wants a fresh gradient.
#[allow(clippy::too_many_arguments)]
pub fn conv2d_kernel_grad(
    dw: &mut [f32],
    src: &[f32],
    grad_out: &[f32],
    n: usize,
    c_in: usize,
    h_in: usize,
    w_in: usize,
    c_out: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
    pad: (usize, usize),
    dilation: (usize, usize),
    groups: usize,
) {
    let h_out = conv_out_len(h_in, kh, stride.0, pad.0, dilation.0);
    let w_out = conv_out_len(w_in, kw, stride.1, pad.1, dilation.1);
    let cg = c_in / groups;
    debug_assert!(dw.len() >= c_out * cg * kh * kw);
    for b in 0..n {
        for co in 0..c_out {
            let g = co / (c_out / groups);
            let gbase = (b * c_out + co) * h_out * w_out;
            let wbase = co * cg * kh * kw;
            for oh in 0..h_out {
                for ow in 0..w_out {
                    let gv = grad_out[gbase + oh * w_out + ow];
                    if gv == 0.0 {
                        continue;
                    }
                    for cig in 0..cg {
                        let ci = g * cg + cig;
                        let ibase = (b * c_in + ci) * h_in * w_in;
                        let kbase = wbase + cig * kh * kw;
                        for i in 0..kh {
                            let ih = (oh * stride.0 + i * dilation.0) as isize - pad.0 as isize;
                            if ih < 0 || ih as usize >= h_in {
                                continue;
                            }
                            let irow = ibase + ih as usize * w_in;
                            let krow = kbase + i * kw;
                            for j in 0..kw {
                                let iw =
                                    (ow * stride.1 + j * dilation.1) as isize - pad.1 as isize;
                                if iw < 0 || iw as usize >= w_in {
                                    continue;
                                }
                                dw[krow + j] += src[irow + iw as usize] * gv;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Input gradient of `conv1d`: transposed 1-D convolution of grad_out with
/// the forward weights `[c_out, c_in, kl]`. Zeroes dst first.
#[allow(clippy::too_many_arguments)]
pub fn conv1d_input_grad(
    dst: &mut [f32],
    grad_out: &[f32],
    w: &[f32],
    n: usize,
    c_in: usize,
    l_in: usize,
    c_out: usize,
    kl: usize,
    stride: usize,
    pad: usize,
) {
    let l_out = conv_out_len(l_in, kl, stride, pad, 1);
    let total = n * c_in * l_in;
    for v in dst[..total].iter_mut() {
        *v = 0.0;
    }
    for b in 0..n {
        for co in 0..c_out {
            let gbase = (b * c_out + co) * l_out;
            let wbase = co * c_in * kl;
            for ol in 0..l_out {
                let gv = grad_out[gbase + ol];
                if gv == 0.0 {
                    continue;
                }
                for ci in 0..c_in {
                    let ibase = (b * c_in + ci) * l_in;
                    let kbase = wbase + ci * kl;
                    for k in 0..kl {
                        let il = (ol * stride + k) as isize - pad as isize;
                        if il >= 0 && (il as usize) < l_in {
                            dst[ibase + il as usize] += gv * w[kbase + k];
                        }
                    }
                }
            }
        }
    }
}

/// Kernel gradient of `conv1d`. Accumulating.
#[allow(clippy::too_many_arguments)]
pub fn conv1d_kernel_grad(
    dw: &mut [f32],
    src: &[f32],
    grad_out: &[f32],
    n: usize,
    c_in: usize,
    l_in: usize,
    c_out: usize,
    kl: usize,
    stride: usize,
    pad: usize,
) {
    let l_out = conv_out_len(l_in, kl, stride, pad, 1);
    for b in 0..n {
        for co in 0..c_out {
            let gbase = (b * c_out + co) * l_out;
            let wbase = co * c_in * kl;
            for ol in 0..l_out {
                let gv = grad_out[gbase + ol];
                if gv == 0.0 {
                    continue;
                }
                for ci in 0..c_in {
                    let ibase = (b * c_in + ci) * l_in;
                    let kbase = wbase + ci * kl;
                    for k in 0..kl {
                        let il = (ol * stride + k) as isize - pad as isize;
                        if il >= 0 && (il as usize) < l_in {
                            dw[kbase + k] += src[ibase + il as usize] * gv;
                        }
                    }
                }
            }
        }
    }
}

/// 3-D convolution. src `[n, c_in, d, h, w]`, weights
/// `[c_out, c_in, kd, kh, kw]`, dst `[n, c_out, d_out, h_out, w_out]`.
#[allow(clippy::too_many_arguments)]
pub fn conv3d(
    dst: &mut [f32],
    src: &[f32],
    w: &[f32],
    n: usize,
    c_in: usize,
    d_in: usize,
    h_in: usize,
    w_in: usize,
    c_out: usize,
    kd: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize, usize),
    pad: (usize, usize, usize),
) {
    let d_out = conv_out_len(d_in, kd, stride.0, pad.0, 1);
    let h_out = conv_out_len(h_in, kh, stride.1, pad.1, 1);
    let w_out = conv_out_len(w_in, kw, stride.2, pad.2, 1);
    for b in 0..n {
        for co in 0..c_out {
            let obase = (b * c_out + co) * d_out * h_out * w_out;
            let wco = co * c_in * kd * kh * kw;
            for od in 0..d_out {
                for oh in 0..h_out {
                    for ow in 0..w_out {
                        let mut s = 0.0f32;
                        for ci in 0..c_in {
                            let ibase = (b * c_in + ci) * d_in * h_in * w_in;
                            let kci = wco + ci * kd * kh * kw;
                            for a in 0..kd {
                                let id = (od * stride.0 + a) as isize - pad.0 as isize;
                                if id < 0 || id as usize >= d_in {
                                    continue;
                                }
                                for i in 0..kh {
                                    let ih = (oh * stride.1 + i) as isize - pad.1 as isize;
                                    if ih < 0 || ih as usize >= h_in {
                                        continue;
                                    }
                                    let irow =
                                        ibase + (id as usize * h_in + ih as usize) * w_in;
                                    let krow = kci + (a * kh + i) * kw;
                                    for j in 0..kw {
                                        let iw =
                                            (ow * stride.2 + j) as isize - pad.2 as isize;
                                        if iw < 0 || iw as usize >= w_in {
                                            continue;
                                        }
                                        s += src[irow + iw as usize] * w[krow + j];
                                    }
                                }
                            }
                        }
                        dst[obase + (od * h_out + oh) * w_out + ow] = s;
                    }
                }
            }
        }
    }
}

/// Unroll one image `[c, h, w]` into columns `[c·kh·kw, h_out·w_out]`.
#[allow(clippy::too_many_arguments)]
pub fn im2col(
    dst: &mut [f32],
    src: &[f32],
    c: usize,
    h_in: usize,
    w_in: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
    pad: (usize, usize),
    dilation: (usize, usize),
) {
    let h_out = conv_out_len(h_in, kh, stride.0, pad.0, dilation.0);
    let w_out = conv_out_len(w_in, kw, stride.1, pad.1, dilation.1);
    let cols = h_out * w_out;
    for ci in 0..c {
        for i in 0..kh {
            for j in 0..kw {
                let row = ((ci * kh + i) * kw + j) * cols;
                for oh in 0..h_out {
                    let ih = (oh * stride.0 + i * dilation.0) as isize - pad.0 as isize;
                    for ow in 0..w_out {
                        let iw = (ow * stride.1 + j * dilation.1) as isize - pad.1 as isize;
                        let v = if ih >= 0
                            && (ih as usize) < h_in
                            && iw >= 0
                            && (iw as usize) < w_in
                        {
                            src[(ci * h_in + ih as usize) * w_in + iw as usize]
                        } else {
                            0.0
                        };
                        dst[row + oh * w_out + ow] = v;
                    }
                }
            }
        }
    }
}

/// Fold columns back into an image, summing overlaps. Zeroes dst first.
#[allow(clippy::too_many_arguments)]
pub fn col2im(
    dst: &mut [f32],
    src: &[f32],
    c: usize,
    h_in: usize,
    w_in: usize,
    kh: usize,
    kw: usize,
    stride: (usize, usize),
    pad: (usize, usize),
    dilation: (usize, usize),
) {
    let h_out = conv_out_len(h_in, kh, stride.0, pad.0, dilation.0);
    let w_out = conv_out_len(w_in, kw, stride.1, pad.1, dilation.1);
    let cols = h_out * w_out;
    for v in dst[..c * h_in * w_in].iter_mut() {
        *v = 0.0;
    }
    for ci in 0..c {
        for i in 0..kh {
            for j in 0..kw {
                let row = ((ci * kh + i) * kw + j) * cols;
                for oh in 0..h_out {
                    let ih = (oh * stride.0 + i * dilation.0) as isize - pad.0 as isize;
                    if ih < 0 || ih as usize >= h_in {
                        continue;
                    }
                    for ow in 0..w_out {
                        let iw = (ow * stride.1 + j * dilation.1) as isize - pad.1 as isize;
                        if iw < 0 || iw as usize >= w_in {
                            continue;
                        }
                        dst[(ci * h_in + ih as usize) * w_in + iw as usize] +=
                            src[row + oh * w_out + ow];
                    }
                }
            }
        }
    }
}

/// Pad the two trailing spatial axes with a constant value.
/// src `[n, c, h, w]` -> dst `[n, c, h + 2·ph, w + 2·pw]`.
#[allow(clippy::too_many_arguments)]
pub fn pad2d(
    dst: &mut [f32],
    src: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    ph: usize,
    pw: usize,
    value: f32,
) {
    let hp = h + 2 * ph;
    let wp = w + 2 * pw;
    for v in dst[..n * c * hp * wp].iter_mut() {
        *v = value;
    }
    for p in 0..n * c {
        let sbase = p * h * w;
        let dbase = p * hp * wp;
        for i in 0..h {
            let srow = sbase + i * w;
            let drow = dbase + (i + ph) * wp + pw;
            dst[drow..drow + w].copy_from_slice(&src[srow..srow + w]);
        }
    }
}

/// Crop the two trailing spatial axes: inverse of [`pad2d`].
#[allow(clippy::too_many_arguments)]
pub fn unpad2d(
    dst: &mut [f32],
    src: &[f32],
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    ph: usize,
    pw: usize,
) {
    let hp = h + 2 * ph;
    let wp = w + 2 * pw;
    for p in 0..n * c {
        let dbase = p * h * w;
        let sbase = p * hp * wp;
        for i in 0..h {
            let drow = dbase + i * w;
            let srow = sbase + (i + ph) * wp + pw;
            dst[drow..drow + w].copy_from_slice(&src[srow..srow + w]);
        }
    }
}
