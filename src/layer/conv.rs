//! Convolution layers. Kernels live in the `Kernels` parameter slot with
//! the `[c_out, c_in/groups, k..]` layout; the input gradient flows
//! through the transposed convolution of the output gradient with the
//! forward kernels, and the kernel gradient through the dedicated
//! kernel-gradient kernels.

use super::{Layer, LayerBase, LayerError, LayerResult, ParamIndex, Parameter};
use crate::init::xavier_uniform;
use crate::kernels::conv::conv_out_len;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// 1-D convolution over `[n, c_in, l]` inputs.
pub struct Conv1d {
    base: LayerBase,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    pad: usize,
    use_bias: bool,
}

impl Conv1d {
    pub fn new(
        name: impl Into<String>,
        out_channels: usize,
        kernel: usize,
        stride: usize,
    ) -> LayerResult<Conv1d> {
        if out_channels == 0 || kernel == 0 || stride == 0 {
            return Err(LayerError::InvalidConfig(
                "conv1d: channels, kernel, and stride must be positive".into(),
            ));
        }
        Ok(Conv1d {
            base: LayerBase::new(name),
            out_channels,
            kernel,
            stride,
            pad: 0,
            use_bias: true,
        })
    }

    pub fn with_padding(mut self, pad: usize) -> Conv1d {
        self.pad = pad;
        self
    }

    pub fn without_bias(mut self) -> Conv1d {
        self.use_bias = false;
        self
    }

    fn geometry(&self, input_shape: &Shape) -> LayerResult<(usize, usize, usize)> {
        let d = input_shape.dims();
        if d.len() != 3 {
            return Err(LayerError::InvalidConfig(format!(
                "conv1d: expects [n, c, l] input, got {}",
                input_shape
            )));
        }
        if d[2] + 2 * self.pad < self.kernel {
            return Err(LayerError::InvalidConfig(format!(
                "conv1d: kernel {} larger than padded input {}",
                self.kernel,
                d[2] + 2 * self.pad
            )));
        }
        Ok((d[0], d[1], d[2]))
    }
}

impl Layer for Conv1d {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        let (_, c_in, _) = self.geometry(input_shape)?;
        let kernels = xavier_uniform(&Shape::new(vec![self.out_channels, c_in, self.kernel]))?;
        self.base.insert_param(ParamIndex::Kernels, Parameter::new(kernels));
        if self.use_bias {
            let biases = Tensor::new(
                crate::dtype::DataType::F32,
                Shape::new(vec![self.out_channels]),
            );
            self.base.insert_param(ParamIndex::Biases, Parameter::new(biases));
        }
        let out_shape = self.output_shape(input_shape)?;
        self.base.mark_initialized(input_shape.clone(), out_shape);
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        let (n, _, l) = self.geometry(input_shape)?;
        Ok(Shape::new(vec![
            n,
            self.out_channels,
            conv_out_len(l, self.kernel, self.stride, self.pad, 1),
        ]))
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        let k = self.base.param_required(ParamIndex::Kernels)?.data().view();
        let bias = if self.use_bias {
            Some(self.base.param_required(ParamIndex::Biases)?.data().view())
        } else {
            None
        };
        input.conv1d(&k, bias.as_ref(), self.stride, self.pad, Some(&out))?;
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?.view();
        let k = self.base.param_required(ParamIndex::Kernels)?.data().view();
        let grad_in =
            grad_out.conv1d_backward_input(&k, x.shape(), self.stride, self.pad, None)?;
        if self.base.can_learn() {
            let kp = self.base.param_required_mut(ParamIndex::Kernels)?;
            if kp.requires_grad() {
                let kg = kp.ensure_grad().view();
                x.conv1d_kernel_grad(grad_out, &kg, self.stride, self.pad)?;
            }
            if self.use_bias {
                let bp = self.base.param_required_mut(ParamIndex::Biases)?;
                if bp.requires_grad() {
                    // Bias gradient: sum over every non-channel axis.
                    let summed = grad_out.sum(&[0, 2], None)?;
                    bp.ensure_grad().axpy_acc(1.0, &summed)?;
                }
            }
        }
        Ok(grad_in)
    }
}

/// 2-D convolution over `[n, c_in, h, w]` inputs with stride, padding,
/// dilation, and groups.
pub struct Conv2d {
    base: LayerBase,
    out_channels: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    pad: (usize, usize),
    dilation: (usize, usize),
    groups: usize,
    use_bias: bool,
}

impl Conv2d {
    pub fn new(
        name: impl Into<String>,
        out_channels: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
    ) -> LayerResult<Conv2d> {
        if out_channels == 0 || kernel.0 == 0 || kernel.1 == 0 || stride.0 == 0 || stride.1 == 0 {
            return Err(LayerError::InvalidConfig(
                "conv2d: channels, kernel, and stride must be positive".into(),
            ));
        }
        Ok(Conv2d {
            base: LayerBase::new(name),
            out_channels,
            kernel,
            stride,
            pad: (0, 0),
            dilation: (1, 1),
            groups: 1,
            use_bias: true,
        })
    }

    pub fn with_padding(mut self, pad: (usize, usize)) -> Conv2d {
        self.pad = pad;
        self
    }

    pub fn with_dilation(mut self, dilation: (usize, usize)) -> LayerResult<Conv2d> {
        if dilation.0 == 0 || dilation.1 == 0 {
            return Err(LayerError::InvalidConfig(
                "conv2d: dilation must be positive".into(),
            ));
        }
        self.dilation = dilation;
        Ok(self)
    }

    pub fn with_groups(mut self, groups: usize) -> LayerResult<Conv2d> {
        if groups == 0 || self.out_channels % groups != 0 {
            return Err(LayerError::InvalidConfig(format!(
                "conv2d: groups {} must divide out_channels {}",
                groups, self.out_channels
            )));
        }
        self.groups = groups;
        Ok(self)
    }

    pub fn without_bias(mut self) -> Conv2d {
        self.use_bias = false;
        self
    }

    fn geometry(&self, input_shape: &Shape) -> LayerResult<(usize, usize, usize, usize)> {
        let d = input_shape.dims();
        if d.len() != 4 {
            return Err(LayerError::InvalidConfig(format!(
                "conv2d: expects [n, c, h, w] input, got {}",
                input_shape
            )));
        }
        let eff_h = (self.kernel.0 - 1) * self.dilation.0 + 1;
        let eff_w = (self.kernel.1 - 1) * self.dilation.1 + 1;
        if d[1] % self.groups != 0 {
            return Err(LayerError::InvalidConfig(format!(
                "conv2d: groups {} must divide in_channels {}",
                self.groups, d[1]
            )));
        }
        if d[2] + 2 * self.pad.0 < eff_h || d[3] + 2 * self.pad.1 < eff_w {
            return Err(LayerError::InvalidConfig(format!(
                "conv2d: effective kernel {}x{} larger than padded input",
                eff_h, eff_w
            )));
        }
        Ok((d[0], d[1], d[2], d[3]))
    }

    /// Output padding that makes the transposed convolution of the output
    /// gradient land exactly on the input size.
    fn backward_output_pad(&self, in_len: usize, out_len: usize, axis: usize) -> usize {
        let (stride, pad, dil, k) = if axis == 0 {
            (self.stride.0, self.pad.0, self.dilation.0, self.kernel.0)
        } else {
            (self.stride.1, self.pad.1, self.dilation.1, self.kernel.1)
        };
        let eff = (k - 1) * dil + 1;
        in_len + 2 * pad - ((out_len - 1) * stride + eff)
    }
}

impl Layer for Conv2d {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        let (_, c_in, _, _) = self.geometry(input_shape)?;
        let kernels = xavier_uniform(&Shape::new(vec![
            self.out_channels,
            c_in / self.groups,
            self.kernel.0,
            self.kernel.1,
        ]))?;
        self.base.insert_param(ParamIndex::Kernels, Parameter::new(kernels));
        if self.use_bias {
            let biases = Tensor::new(
                crate::dtype::DataType::F32,
                Shape::new(vec![self.out_channels]),
            );
            self.base.insert_param(ParamIndex::Biases, Parameter::new(biases));
        }
        let out_shape = self.output_shape(input_shape)?;
        self.base.mark_initialized(input_shape.clone(), out_shape);
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        let (n, _, h, w) = self.geometry(input_shape)?;
        Ok(Shape::new(vec![
            n,
            self.out_channels,
            conv_out_len(h, self.kernel.0, self.stride.0, self.pad.0, self.dilation.0),
            conv_out_len(w, self.kernel.1, self.stride.1, self.pad.1, self.dilation.1),
        ]))
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        let k = self.base.param_required(ParamIndex::Kernels)?.data().view();
        let bias = if self.use_bias {
            Some(self.base.param_required(ParamIndex::Biases)?.data().view())
        } else {
            None
        };
        input.conv2d(
            &k,
            bias.as_ref(),
            self.stride,
            self.pad,
            self.dilation,
            self.groups,
            Some(&out),
        )?;
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?.view();
        let k = self.base.param_required(ParamIndex::Kernels)?.data().view();
        let xd = x.shape().dims();
        let gd = grad_out.shape().dims();
        let output_pad = (
            self.backward_output_pad(xd[2], gd[2], 0),
            self.backward_output_pad(xd[3], gd[3], 1),
        );
        let grad_in = grad_out.conv2d_transposed(
            &k,
            self.stride,
            self.pad,
            self.dilation,
            output_pad,
            self.groups,
            None,
        )?;
        if self.base.can_learn() {
            let kp = self.base.param_required_mut(ParamIndex::Kernels)?;
            if kp.requires_grad() {
                let kg = kp.ensure_grad().view();
                x.conv2d_kernel_grad(
                    grad_out,
                    &kg,
                    self.stride,
                    self.pad,
                    self.dilation,
                    self.groups,
                )?;
            }
            if self.use_bias {
                let bp = self.base.param_required_mut(ParamIndex::Biases)?;
                if bp.requires_grad() {
                    let summed = grad_out.sum(&[0, 2, 3], None)?;
                    bp.ensure_grad().axpy_acc(1.0, &summed)?;
                }
            }
        }
        Ok(grad_in)
    }
}
