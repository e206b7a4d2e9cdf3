//! Convolution and pooling methods over NCHW tensors. Operands are made
//! contiguous before dispatch; a rank-0 bias is applied as a scalar
//! post-pass, a rank-1 bias per output channel.

use super::{f32s, f32s_mut, Cells, Tensor, TensorError, TensorResult};
use crate::dtype::DataType;
use crate::kernels::{conv, pool};
use crate::shape::Shape;

impl Tensor {
    fn check_rank(&self, rank: usize, op: &'static str) -> TensorResult<()> {
        if self.rank() != rank {
            return Err(TensorError::Incompatible(format!(
                "{}: requires rank-{} input, got {}",
                op,
                rank,
                self.rank()
            )));
        }
        Ok(())
    }

    fn apply_bias(&self, bias: &Tensor, channels: usize, plane: usize) -> TensorResult<()> {
        bias.check_f32("bias")?;
        match bias.rank() {
            0 => {
                // Scalar bias: one constant over the whole output.
                let v = bias.at(&[])?;
                let r = self.contiguous_range("bias")?;
                let mut g = self.buf.write();
                for x in &mut f32s_mut(&mut g, "bias")?[r] {
                    *x += v;
                }
                Ok(())
            }
            1 if bias.numel() == channels => {
                let b = bias.to_vec()?;
                let r = self.contiguous_range("bias")?;
                let mut g = self.buf.write();
                let d = &mut f32s_mut(&mut g, "bias")?[r];
                for (p, chunk) in d.chunks_mut(plane).enumerate() {
                    let v = b[p % channels];
                    for x in chunk {
                        *x += v;
                    }
                }
                Ok(())
            }
            _ => Err(TensorError::ShapeMismatch {
                expected: Shape::new(vec![channels]),
                found: bias.shape().clone(),
            }),
        }
    }

    /// 1-D convolution: self `[n, c_in, l]` with kernels
    /// `[c_out, c_in, kl]` -> `[n, c_out, l_out]`.
    pub fn conv1d(
        &self,
        kernels: &Tensor,
        bias: Option<&Tensor>,
        stride: usize,
        pad: usize,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("conv1d")?;
        kernels.check_f32("conv1d")?;
        self.check_rank(3, "conv1d")?;
        kernels.check_rank(3, "conv1d")?;
        let (n, c_in, l_in) = {
            let d = self.shape.dims();
            (d[0], d[1], d[2])
        };
        let (c_out, kc, kl) = {
            let d = kernels.shape().dims();
            (d[0], d[1], d[2])
        };
        if kc != c_in || stride == 0 || l_in + 2 * pad < kl {
            return Err(TensorError::Incompatible(format!(
                "conv1d: kernels {:?} incompatible with input {:?} (stride {}, pad {})",
                kernels.shape(),
                self.shape,
                stride,
                pad
            )));
        }
        let src = self.to_contiguous()?;
        let w = kernels.to_contiguous()?;
        let l_out = conv::conv_out_len(l_in, kl, stride, pad, 1);
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c_out, l_out]))?;
        src.check_no_alias(&out, "conv1d")?;
        {
            let dr = out.contiguous_range("conv1d")?;
            let sr = src.contiguous_range("conv1d")?;
            let wr = w.contiguous_range("conv1d")?;
            let mut dg = out.buf.write();
            let sg = src.buf.read();
            let wg = w.buf.read();
            conv::conv1d(
                &mut f32s_mut(&mut dg, "conv1d")?[dr],
                &f32s(&sg, "conv1d")?[sr],
                &f32s(&wg, "conv1d")?[wr],
                n,
                c_in,
                l_in,
                c_out,
                kl,
                stride,
                pad,
            );
        }
        if let Some(b) = bias {
            out.apply_bias(b, c_out, l_out)?;
        }
        Ok(out)
    }

    /// 2-D convolution: self `[n, c_in, h, w]` with kernels
    /// `[c_out, c_in/groups, kh, kw]` -> `[n, c_out, h_out, w_out]`.
    #[allow(clippy::too_many_arguments)]
    pub fn conv2d(
        &self,
        kernels: &Tensor,
        bias: Option<&Tensor>,
        stride: (usize, usize),
        pad: (usize, usize),
        dilation: (usize, usize),
        groups: usize,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("conv2d")?;
        kernels.check_f32("conv2d")?;
        self.check_rank(4, "conv2d")?;
        kernels.check_rank(4, "conv2d")?;
        let (n, c_in, h_in, w_in) = {
            let d = self.shape.dims();
            (d[0], d[1], d[2], d[3])
        };
        let (c_out, kc, kh, kw) = {
            let d = kernels.shape().dims();
            (d[0], d[1], d[2], d[3])
        };
        let eff_h = (kh.saturating_sub(1)) * dilation.0 + 1;
        let eff_w = (kw.saturating_sub(1)) * dilation.1 + 1;
        if groups == 0
            || c_in % groups != 0
            || c_out % groups != 0
            || kc != c_in / groups
            || stride.0 == 0
            || stride.1 == 0
            || kh == 0
            || kw == 0
            || h_in + 2 * pad.0 < eff_h
            || w_in + 2 * pad.1 < eff_w
        {
            return Err(TensorError::Incompatible(format!(
                "conv2d: kernels {:?} incompatible with input {:?} (stride {:?}, pad {:?}, dilation {:?}, groups {})",
                kernels.shape(),
                self.shape,
                stride,
                pad,
                dilation,
                groups
            )));
        }
        let src = self.to_contiguous()?;
        let w = kernels.to_contiguous()?;
        let h_out = conv::conv_out_len(h_in, kh, stride.0, pad.0, dilation.0);
        let w_out = conv::conv_out_len(w_in, kw, stride.1, pad.1, dilation.1);
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c_out, h_out, w_out]))?;
        src.check_no_alias(&out, "conv2d")?;
        {
            let dr = out.contiguous_range("conv2d")?;
            let sr = src.contiguous_range("conv2d")?;
            let wr = w.contiguous_range("conv2d")?;
            let mut dg = out.buf.write();
            let sg = src.buf.read();
            let wg = w.buf.read();
            conv::conv2d(
                &mut f32s_mut(&mut dg, "conv2d")?[dr],
                &f32s(&sg, "conv2d")?[sr],
                &f32s(&wg, "conv2d")?[wr],
                n,
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
        if let Some(b) = bias {
            out.apply_bias(b, c_out, h_out * w_out)?;
        }
        Ok(out)
    }

    /// Transposed 2-D convolution: self `[n, c_src, h, w]` with kernels in
    /// forward layout `[c_src, c_dst/groups, kh, kw]`. Also the
    /// input-gradient of [`Tensor::conv2d`] when fed the output gradient
    /// and the forward kernels.
    #[allow(clippy::too_many_arguments)]
    pub fn conv2d_transposed(
        &self,
        kernels: &Tensor,
        stride: (usize, usize),
        pad: (usize, usize),
        dilation: (usize, usize),
        output_pad: (usize, usize),
        groups: usize,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("conv2d_transposed")?;
        kernels.check_f32("conv2d_transposed")?;
        self.check_rank(4, "conv2d_transposed")?;
        kernels.check_rank(4, "conv2d_transposed")?;
        let (n, c_src, h_src, w_src) = {
            let d = self.shape.dims();
            (d[0], d[1], d[2], d[3])
        };
        let (kc, cdg, kh, kw) = {
            let d = kernels.shape().dims();
            (d[0], d[1], d[2], d[3])
        };
        let c_dst = cdg * groups;
        if kc != c_src
            || groups == 0
            || c_src % groups != 0
            || h_src == 0
            || w_src == 0
            || output_pad.0 >= stride.0.max(1)
            || output_pad.1 >= stride.1.max(1)
        {
            return Err(TensorError::Incompatible(format!(
                "conv2d_transposed: kernels {:?} incompatible with input {:?}",
                kernels.shape(),
                self.shape
            )));
        }
        let src = self.to_contiguous()?;
        let w = kernels.to_contiguous()?;
        let eff_h = (kh - 1) * dilation.0 + 1;
        let eff_w = (kw - 1) * dilation.1 + 1;
        let h_dst = conv::conv_transposed_out_len(h_src, eff_h, stride.0, pad.0, output_pad.0);
        let w_dst = conv::conv_transposed_out_len(w_src, eff_w, stride.1, pad.1, output_pad.1);
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c_dst, h_dst, w_dst]))?;
        src.check_no_alias(&out, "conv2d_transposed")?;
        let dr = out.contiguous_range("conv2d_transposed")?;
        let sr = src.contiguous_range("conv2d_transposed")?;
        let wr = w.contiguous_range("conv2d_transposed")?;
        let mut dg = out.buf.write();
        let sg = src.buf.read();
        let wg = w.buf.read();
        conv::conv2d_transposed(
            &mut f32s_mut(&mut dg, "conv2d_transposed")?[dr],
            &f32s(&sg, "conv2d_transposed")?[sr],
            &f32s(&wg, "conv2d_transposed")?[wr],
            n,
            c_src,
            h_src,
            w_src,
            c_dst,
            kh,
            kw,
            stride,
            pad,
            dilation,
            output_pad,
            groups,
        );
        drop(dg);
        Ok(out)
    }

    /// Accumulate the kernel gradient of a 2-D convolution into `dw`
    /// (`[c_out, c_in/groups, kh, kw]`). Self is the forward input.
    #[allow(clippy::too_many_arguments)]
    pub fn conv2d_kernel_grad(
        &self,
        grad_out: &Tensor,
        dw: &Tensor,
        stride: (usize, usize),
        pad: (usize, usize),
        dilation: (usize, usize),
        groups: usize,
    ) -> TensorResult<()> {
        self.check_f32("conv2d_kernel_grad")?;
        grad_out.check_f32("conv2d_kernel_grad")?;
        self.check_rank(4, "conv2d_kernel_grad")?;
        grad_out.check_rank(4, "conv2d_kernel_grad")?;
        dw.check_rank(4, "conv2d_kernel_grad")?;
        let (n, c_in, h_in, w_in) = {
            let d = self.shape.dims();
            (d[0], d[1], d[2], d[3])
        };
        let (c_out, kc, kh, kw) = {
            let d = dw.shape().dims();
            (d[0], d[1], d[2], d[3])
        };
        let go = grad_out.shape().dims();
        if go[0] != n
            || go[1] != c_out
            || kc != c_in / groups
            || go[2] != conv::conv_out_len(h_in, kh, stride.0, pad.0, dilation.0)
            || go[3] != conv::conv_out_len(w_in, kw, stride.1, pad.1, dilation.1)
        {
            return Err(TensorError::Incompatible(
                "conv2d_kernel_grad: operand shapes do not agree".into(),
            ));
        }
        let src = self.to_contiguous()?;
        let g = grad_out.to_contiguous()?;
        let wr = dw.contiguous_range("conv2d_kernel_grad")?;
        let sr = src.contiguous_range("conv2d_kernel_grad")?;
        let gr = g.contiguous_range("conv2d_kernel_grad")?;
        let mut wg = dw.buf.write();
        let sg = src.buf.read();
        let gg = g.buf.read();
        conv::conv2d_kernel_grad(
            &mut f32s_mut(&mut wg, "conv2d_kernel_grad")?[wr],
            &f32s(&sg, "conv2d_kernel_grad")?[sr],
            &f32s(&gg, "conv2d_kernel_grad")?[gr],
            n,
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
        Ok(())
    }

    /// Input gradient of [`Tensor::conv1d`]: self is the output gradient.
    pub fn conv1d_backward_input(
        &self,
        kernels: &Tensor,
        input_shape: &Shape,
        stride: usize,
        pad: usize,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("conv1d_backward_input")?;
        self.check_rank(3, "conv1d_backward_input")?;
        kernels.check_rank(3, "conv1d_backward_input")?;
        let (n, c_in, l_in) = {
            let d = input_shape.dims();
            (d[0], d[1], d[2])
        };
        let (c_out, _, kl) = {
            let d = kernels.shape().dims();
            (d[0], d[1], d[2])
        };
        let g = self.to_contiguous()?;
        let w = kernels.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, input_shape)?;
        g.check_no_alias(&out, "conv1d_backward_input")?;
        let dr = out.contiguous_range("conv1d_backward_input")?;
        let gr = g.contiguous_range("conv1d_backward_input")?;
        let wr = w.contiguous_range("conv1d_backward_input")?;
        let mut dg = out.buf.write();
        let gg = g.buf.read();
        let wg = w.buf.read();
        conv::conv1d_input_grad(
            &mut f32s_mut(&mut dg, "conv1d_backward_input")?[dr],
            &f32s(&gg, "conv1d_backward_input")?[gr],
            &f32s(&wg, "conv1d_backward_input")?[wr],
            n,
            c_in,
            l_in,
            c_out,
            kl,
            stride,
            pad,
        );
        drop(dg);
        Ok(out)
    }

    /// Accumulate the kernel gradient of a 1-D convolution into `dw`.
    /// Self is the forward input.
    pub fn conv1d_kernel_grad(
        &self,
        grad_out: &Tensor,
        dw: &Tensor,
        stride: usize,
        pad: usize,
    ) -> TensorResult<()> {
        self.check_rank(3, "conv1d_kernel_grad")?;
        grad_out.check_rank(3, "conv1d_kernel_grad")?;
        dw.check_rank(3, "conv1d_kernel_grad")?;
        let (n, c_in, l_in) = {
            let d = self.shape.dims();
            (d[0], d[1], d[2])
        };
        let (c_out, _, kl) = {
            let d = dw.shape().dims();
            (d[0], d[1], d[2])
        };
        let src = self.to_contiguous()?;
        let g = grad_out.to_contiguous()?;
        let wr = dw.contiguous_range("conv1d_kernel_grad")?;
        let sr = src.contiguous_range("conv1d_kernel_grad")?;
        let gr = g.contiguous_range("conv1d_kernel_grad")?;
        let mut wg = dw.buf.write();
        let sg = src.buf.read();
        let gg = g.buf.read();
        conv::conv1d_kernel_grad(
            &mut f32s_mut(&mut wg, "conv1d_kernel_grad")?[wr],
            &f32s(&sg, "conv1d_kernel_grad")?[sr],
            &f32s(&gg, "conv1d_kernel_grad")?[gr],
            n,
            c_in,
            l_in,
            c_out,
            kl,
            stride,
            pad,
        );
        Ok(())
    }

    /// 3-D convolution: self `[n, c_in, d, h, w]` with kernels
    /// `[c_out, c_in, kd, kh, kw]`.
    pub fn conv3d(
        &self,
        kernels: &Tensor,
        bias: Option<&Tensor>,
        stride: (usize, usize, usize),
        pad: (usize, usize, usize),
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("conv3d")?;
        kernels.check_f32("conv3d")?;
        self.check_rank(5, "conv3d")?;
        kernels.check_rank(5, "conv3d")?;
        let (n, c_in, d_in, h_in, w_in) = {
            let d = self.shape.dims();
            (d[0], d[1], d[2], d[3], d[4])
        };
        let (c_out, kc, kd, kh, kw) = {
            let d = kernels.shape().dims();
            (d[0], d[1], d[2], d[3], d[4])
        };
        if kc != c_in
            || d_in + 2 * pad.0 < kd
            || h_in + 2 * pad.1 < kh
            || w_in + 2 * pad.2 < kw
        {
            return Err(TensorError::Incompatible(format!(
                "conv3d: kernels {:?} incompatible with input {:?}",
                kernels.shape(),
                self.shape
            )));
        }
        let src = self.to_contiguous()?;
        let w = kernels.to_contiguous()?;
        let d_out = conv::conv_out_len(d_in, kd, stride.0, pad.0, 1);
        let h_out = conv::conv_out_len(h_in, kh, stride.1, pad.1, 1);
        let w_out = conv::conv_out_len(w_in, kw, stride.2, pad.2, 1);
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c_out, d_out, h_out, w_out]))?;
        src.check_no_alias(&out, "conv3d")?;
        {
            let dr = out.contiguous_range("conv3d")?;
            let sr = src.contiguous_range("conv3d")?;
            let wr = w.contiguous_range("conv3d")?;
            let mut dg = out.buf.write();
            let sg = src.buf.read();
            let wg = w.buf.read();
            conv::conv3d(
                &mut f32s_mut(&mut dg, "conv3d")?[dr],
                &f32s(&sg, "conv3d")?[sr],
                &f32s(&wg, "conv3d")?[wr],
                n,
                c_in,
                d_in,
                h_in,
                w_in,
                c_out,
                kd,
                kh,
                kw,
                stride,
                pad,
            );
        }
        if let Some(b) = bias {
            out.apply_bias(b, c_out, d_out * h_out * w_out)?;
        }
        Ok(out)
    }

    fn pool_check(
        &self,
        kernel: (usize, usize),
        stride: (usize, usize),
        op: &'static str,
    ) -> TensorResult<(usize, usize, usize, usize, usize, usize)> {
        self.check_f32(op)?;
        self.check_rank(4, op)?;
        let d = self.shape.dims();
        let (n, c, h, w) = (d[0], d[1], d[2], d[3]);
        if kernel.0 == 0
            || kernel.1 == 0
            || stride.0 == 0
            || stride.1 == 0
            || h < kernel.0
            || w < kernel.1
        {
            return Err(TensorError::Incompatible(format!(
                "{}: window {:?}/stride {:?} incompatible with input {:?}",
                op, kernel, stride, self.shape
            )));
        }
        let h_out = pool::pool_out_len(h, kernel.0, stride.0);
        let w_out = pool::pool_out_len(w, kernel.1, stride.1);
        Ok((n, c, h, w, h_out, w_out))
    }

    /// Max-pool: self `[n, c, h, w]` -> `[n, c, h_out, w_out]`.
    pub fn maxpool2d(
        &self,
        kernel: (usize, usize),
        stride: (usize, usize),
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        let (n, c, h, w, h_out, w_out) = self.pool_check(kernel, stride, "maxpool2d")?;
        let src = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c, h_out, w_out]))?;
        src.check_no_alias(&out, "maxpool2d")?;
        let dr = out.contiguous_range("maxpool2d")?;
        let sr = src.contiguous_range("maxpool2d")?;
        let mut dg = out.buf.write();
        let sg = src.buf.read();
        pool::maxpool2d(
            &mut f32s_mut(&mut dg, "maxpool2d")?[dr],
            &f32s(&sg, "maxpool2d")?[sr],
            n,
            c,
            h,
            w,
            kernel.0,
            kernel.1,
            stride,
        );
        drop(dg);
        Ok(out)
    }

    /// Max-pool that also returns the I32 map of winning flat input
    /// indices, for routing gradients back.
    pub fn maxpool2d_with_indices(
        &self,
        kernel: (usize, usize),
        stride: (usize, usize),
        dst: Option<&Tensor>,
    ) -> TensorResult<(Tensor, Tensor)> {
        let (n, c, h, w, h_out, w_out) =
            self.pool_check(kernel, stride, "maxpool2d_with_indices")?;
        let src = self.to_contiguous()?;
        let out_shape = Shape::new(vec![n, c, h_out, w_out]);
        let out = Tensor::resolve_dst(dst, &out_shape)?;
        src.check_no_alias(&out, "maxpool2d_with_indices")?;
        let idx = Tensor::new(DataType::I32, out_shape);
        {
            let dr = out.contiguous_range("maxpool2d_with_indices")?;
            let sr = src.contiguous_range("maxpool2d_with_indices")?;
            let mut dg = out.buf.write();
            let mut ig = idx.buf.write();
            let ix = match &mut *ig {
                Cells::I32(v) => v,
                _ => unreachable!("index map allocated as i32"),
            };
            let sg = src.buf.read();
            pool::maxpool2d_with_indices(
                &mut f32s_mut(&mut dg, "maxpool2d_with_indices")?[dr],
                ix,
                &f32s(&sg, "maxpool2d_with_indices")?[sr],
                n,
                c,
                h,
                w,
                kernel.0,
                kernel.1,
                stride,
            );
        }
        Ok((out, idx))
    }

    /// Max-pool backward: self is the output gradient; `indices` the I32
    /// map captured during forward. Scatters into a zeroed input-shaped
    /// tensor, conserving gradient flux.
    pub fn maxpool2d_backward(
        &self,
        indices: &Tensor,
        input_shape: &Shape,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("maxpool2d_backward")?;
        if indices.dtype() != DataType::I32 {
            return Err(TensorError::UnsupportedDType {
                op: "maxpool2d_backward",
                dtype: indices.dtype(),
            });
        }
        self.check_same_shape(indices)?;
        let g = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, input_shape)?;
        g.check_no_alias(&out, "maxpool2d_backward")?;
        let dr = out.contiguous_range("maxpool2d_backward")?;
        let gr = g.contiguous_range("maxpool2d_backward")?;
        let mut dg = out.buf.write();
        let gg = g.buf.read();
        let ig = indices.buf.read();
        let ix = match &*ig {
            Cells::I32(v) => &v[indices.offset..indices.offset + indices.numel()],
            _ => unreachable!("dtype checked above"),
        };
        pool::maxpool2d_backward(
            &mut f32s_mut(&mut dg, "maxpool2d_backward")?[dr],
            &f32s(&gg, "maxpool2d_backward")?[gr],
            ix,
        );
        drop(dg);
        Ok(out)
    }

    /// Average-pool: self `[n, c, h, w]` -> `[n, c, h_out, w_out]`.
    pub fn avgpool2d(
        &self,
        kernel: (usize, usize),
        stride: (usize, usize),
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        let (n, c, h, w, h_out, w_out) = self.pool_check(kernel, stride, "avgpool2d")?;
        let src = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c, h_out, w_out]))?;
        src.check_no_alias(&out, "avgpool2d")?;
        let dr = out.contiguous_range("avgpool2d")?;
        let sr = src.contiguous_range("avgpool2d")?;
        let mut dg = out.buf.write();
        let sg = src.buf.read();
        pool::avgpool2d(
            &mut f32s_mut(&mut dg, "avgpool2d")?[dr],
            &f32s(&sg, "avgpool2d")?[sr],
            n,
            c,
            h,
            w,
            kernel.0,
            kernel.1,
            stride,
        );
        drop(dg);
        Ok(out)
    }

    /// Average-pool backward: self is the output gradient; each value
    /// spreads uniformly over its forward window.
    pub fn avgpool2d_backward(
        &self,
        input_shape: &Shape,
        kernel: (usize, usize),
        stride: (usize, usize),
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("avgpool2d_backward")?;
        self.check_rank(4, "avgpool2d_backward")?;
        let d = input_shape.dims();
        if d.len() != 4 {
            return Err(TensorError::Incompatible(
                "avgpool2d_backward: input shape must be rank 4".into(),
            ));
        }
        let (n, c, h, w) = (d[0], d[1], d[2], d[3]);
        let g = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, input_shape)?;
        g.check_no_alias(&out, "avgpool2d_backward")?;
        let dr = out.contiguous_range("avgpool2d_backward")?;
        let gr = g.contiguous_range("avgpool2d_backward")?;
        let mut dg = out.buf.write();
        let gg = g.buf.read();
        pool::avgpool2d_backward(
            &mut f32s_mut(&mut dg, "avgpool2d_backward")?[dr],
            &f32s(&gg, "avgpool2d_backward")?[gr],
            n,
            c,
            h,
            w,
            kernel.0,
            kernel.1,
            stride,
        );
        drop(dg);
        Ok(out)
    }

    /// Global average pool: `[n, c, h, w]` -> `[n, c]`.
    pub fn global_avgpool2d(&self, dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("global_avgpool2d")?;
        self.check_rank(4, "global_avgpool2d")?;
        let d = self.shape.dims();
        let (n, c, h, w) = (d[0], d[1], d[2], d[3]);
        let src = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c]))?;
        src.check_no_alias(&out, "global_avgpool2d")?;
        let dr = out.contiguous_range("global_avgpool2d")?;
        let sr = src.contiguous_range("global_avgpool2d")?;
        let mut dg = out.buf.write();
        let sg = src.buf.read();
        pool::global_avgpool2d(
            &mut f32s_mut(&mut dg, "global_avgpool2d")?[dr],
            &f32s(&sg, "global_avgpool2d")?[sr],
            n,
            c,
            h,
            w,
        );
        drop(dg);
        Ok(out)
    }

    /// Global average pool backward: self `[n, c]` spreads over the
    /// spatial positions of `input_shape`.
    pub fn global_avgpool2d_backward(
        &self,
        input_shape: &Shape,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("global_avgpool2d_backward")?;
        self.check_rank(2, "global_avgpool2d_backward")?;
        let d = input_shape.dims();
        if d.len() != 4 {
            return Err(TensorError::Incompatible(
                "global_avgpool2d_backward: input shape must be rank 4".into(),
            ));
        }
        let (n, c, h, w) = (d[0], d[1], d[2], d[3]);
        let g = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, input_shape)?;
        g.check_no_alias(&out, "global_avgpool2d_backward")?;
        let dr = out.contiguous_range("global_avgpool2d_backward")?;
        let gr = g.contiguous_range("global_avgpool2d_backward")?;
        let mut dg = out.buf.write();
        let gg = g.buf.read();
        pool::global_avgpool2d_backward(
            &mut f32s_mut(&mut dg, "global_avgpool2d_backward")?[dr],
            &f32s(&gg, "global_avgpool2d_backward")?[gr],
            n,
            c,
            h,
            w,
        );
        drop(dg);
        Ok(out)
    }

    /// Adaptive average pool to a target spatial size.
    pub fn adaptive_avgpool2d(
        &self,
        output: (usize, usize),
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("adaptive_avgpool2d")?;
        self.check_rank(4, "adaptive_avgpool2d")?;
        let d = self.shape.dims();
        let (n, c, h, w) = (d[0], d[1], d[2], d[3]);
        if output.0 == 0 || output.1 == 0 || output.0 > h || output.1 > w {
            return Err(TensorError::Incompatible(format!(
                "adaptive_avgpool2d: target {:?} incompatible with input {:?}",
                output, self.shape
            )));
        }
        let src = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c, output.0, output.1]))?;
        src.check_no_alias(&out, "adaptive_avgpool2d")?;
        let dr = out.contiguous_range("adaptive_avgpool2d")?;
        let sr = src.contiguous_range("adaptive_avgpool2d")?;
        let mut dg = out.buf.write();
        let sg = src.buf.read();
        pool::adaptive_avgpool2d(
            &mut f32s_mut(&mut dg, "adaptive_avgpool2d")?[dr],
            &f32s(&sg, "adaptive_avgpool2d")?[sr],
            n,
            c,
            h,
            w,
            output.0,
            output.1,
        );
        drop(dg);
        Ok(out)
    }

    /// Constant-pad the two trailing spatial axes.
    pub fn pad2d(
        &self,
        pad: (usize, usize),
        value: f32,
        dst: Option<&Tensor>,
    ) -> TensorResult<Tensor> {
        self.check_f32("pad2d")?;
        self.check_rank(4, "pad2d")?;
        let d = self.shape.dims();
        let (n, c, h, w) = (d[0], d[1], d[2], d[3]);
        let src = self.to_contiguous()?;
        let out = Tensor::resolve_dst(
            dst,
            &Shape::new(vec![n, c, h + 2 * pad.0, w + 2 * pad.1]),
        )?;
        src.check_no_alias(&out, "pad2d")?;
        let dr = out.contiguous_range("pad2d")?;
        let sr = src.contiguous_range("pad2d")?;
        let mut dg = out.buf.write();
        let sg = src.buf.read();
        conv::pad2d(
            &mut f32s_mut(&mut dg, "pad2d")?[dr],
            &f32s(&sg, "pad2d")?[sr],
            n,
            c,
            h,
            w,
            pad.0,
            pad.1,
            value,
        );
        drop(dg);
        Ok(out)
    }

    /// Crop the two trailing spatial axes: inverse of [`Tensor::pad2d`].
    pub fn unpad2d(&self, pad: (usize, usize), dst: Option<&Tensor>) -> TensorResult<Tensor> {
        self.check_f32("unpad2d")?;
        self.check_rank(4, "unpad2d")?;
        let d = self.shape.dims();
        let (n, c, hp, wp) = (d[0], d[1], d[2], d[3]);
        if hp < 2 * pad.0 + 1 || wp < 2 * pad.1 + 1 {
            return Err(TensorError::Incompatible(format!(
                "unpad2d: pad {:?} larger than input {:?}",
                pad, self.shape
            )));
        }
        let (h, w) = (hp - 2 * pad.0, wp - 2 * pad.1);
        let src = self.to_contiguous()?;
        let out = Tensor::resolve_dst(dst, &Shape::new(vec![n, c, h, w]))?;
        src.check_no_alias(&out, "unpad2d")?;
        let dr = out.contiguous_range("unpad2d")?;
        let sr = src.contiguous_range("unpad2d")?;
        let mut dg = out.buf.write();
        let sg = src.buf.read();
        conv::unpad2d(
            &mut f32s_mut(&mut dg, "unpad2d")?[dr],
            &f32s(&sg, "unpad2d")?[sr],
            n,
            c,
            h,
            w,
            pad.0,
            pad.1,
        );
        drop(dg);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(data: Vec<f32>, dims: Vec<usize>) -> Tensor {
        Tensor::from_vec(data, Shape::new(dims)).unwrap()
    }

    #[test]
    fn maxpool_scenario() {
        // 1x1x4x4 ramp 1..16, 2x2 window, stride 2.
        let x = t((1..=16).map(|v| v as f32).collect(), vec![1, 1, 4, 4]);
        let y = x.maxpool2d((2, 2), (2, 2), None).unwrap();
        assert_eq!(y.shape().dims(), &[1, 1, 2, 2]);
        assert_eq!(y.at(&[0, 0, 0, 0]).unwrap(), 6.0);
        assert_eq!(y.at(&[0, 0, 0, 1]).unwrap(), 8.0);
        assert_eq!(y.at(&[0, 0, 1, 0]).unwrap(), 14.0);
        assert_eq!(y.at(&[0, 0, 1, 1]).unwrap(), 16.0);
    }

    #[test]
    fn conv2d_scalar_bias_post_pass() {
        let x = t(vec![1.0, 2.0, 3.0, 4.0], vec![1, 1, 2, 2]);
        let k = t(vec![1.0], vec![1, 1, 1, 1]);
        let b = Tensor::scalar(10.0);
        let y = x
            .conv2d(&k, Some(&b), (1, 1), (0, 0), (1, 1), 1, None)
            .unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn conv2d_channel_bias() {
        let x = t(vec![1.0, 2.0, 3.0, 4.0], vec![1, 1, 2, 2]);
        let k = t(vec![1.0, 2.0], vec![2, 1, 1, 1]);
        let b = t(vec![10.0, 20.0], vec![2]);
        let y = x
            .conv2d(&k, Some(&b), (1, 1), (0, 0), (1, 1), 1, None)
            .unwrap();
        assert_eq!(
            y.to_vec().unwrap(),
            vec![11.0, 12.0, 13.0, 14.0, 22.0, 24.0, 26.0, 28.0]
        );
    }

    #[test]
    fn pad_unpad_round_trip() {
        let x = t((1..=4).map(|v| v as f32).collect(), vec![1, 1, 2, 2]);
        let p = x.pad2d((1, 1), 0.0, None).unwrap();
        assert_eq!(p.shape().dims(), &[1, 1, 4, 4]);
        let back = p.unpad2d((1, 1), None).unwrap();
        assert_eq!(back.to_vec().unwrap(), x.to_vec().unwrap());
    }
}
