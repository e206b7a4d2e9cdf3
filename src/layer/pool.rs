//! Pooling layers over `[n, c, h, w]` inputs. MaxPool2d records the
//! winning-cell index map during forward and scatters gradients through it
//! on backward; the average pools spread gradients uniformly.

use super::{Layer, LayerBase, LayerError, LayerResult};
use crate::kernels::pool::pool_out_len;
use crate::shape::Shape;
use crate::tensor::Tensor;

fn check_nchw(input_shape: &Shape, op: &str) -> LayerResult<(usize, usize, usize, usize)> {
    let d = input_shape.dims();
    if d.len() != 4 {
        return Err(LayerError::InvalidConfig(format!(
            "{}: expects [n, c, h, w] input, got {}",
            op, input_shape
        )));
    }
    Ok((d[0], d[1], d[2], d[3]))
}

/// Max-pool with an int32 index map for exact gradient routing.
pub struct MaxPool2d {
    base: LayerBase,
    kernel: (usize, usize),
    stride: (usize, usize),
    indices: Option<Tensor>,
}

impl MaxPool2d {
    pub fn new(
        name: impl Into<String>,
        kernel: (usize, usize),
        stride: (usize, usize),
    ) -> LayerResult<MaxPool2d> {
        if kernel.0 == 0 || kernel.1 == 0 || stride.0 == 0 || stride.1 == 0 {
            return Err(LayerError::InvalidConfig(
                "maxpool2d: kernel and stride must be positive".into(),
            ));
        }
        Ok(MaxPool2d {
            base: LayerBase::new(name),
            kernel,
            stride,
            indices: None,
        })
    }

    fn pooled_shape(&self, input_shape: &Shape, op: &str) -> LayerResult<Shape> {
        let (n, c, h, w) = check_nchw(input_shape, op)?;
        if h < self.kernel.0 || w < self.kernel.1 {
            return Err(LayerError::InvalidConfig(format!(
                "{}: window {:?} larger than input {}x{}",
                op, self.kernel, h, w
            )));
        }
        Ok(Shape::new(vec![
            n,
            c,
            pool_out_len(h, self.kernel.0, self.stride.0),
            pool_out_len(w, self.kernel.1, self.stride.1),
        ]))
    }
}

impl Layer for MaxPool2d {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        let out = self.pooled_shape(input_shape, "maxpool2d")?;
        self.base.mark_initialized(input_shape.clone(), out);
        self.indices = None;
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        self.pooled_shape(input_shape, "maxpool2d")
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        let (_, idx) = input.maxpool2d_with_indices(self.kernel, self.stride, Some(&out))?;
        self.indices = Some(idx);
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?;
        let idx = self
            .indices
            .as_ref()
            .ok_or(LayerError::NotInitialized("backward"))?;
        Ok(grad_out.maxpool2d_backward(idx, x.shape(), None)?)
    }
}

/// Average pool.
pub struct AvgPool2d {
    base: LayerBase,
    kernel: (usize, usize),
    stride: (usize, usize),
}

impl AvgPool2d {
    pub fn new(
        name: impl Into<String>,
        kernel: (usize, usize),
        stride: (usize, usize),
    ) -> LayerResult<AvgPool2d> {
        if kernel.0 == 0 || kernel.1 == 0 || stride.0 == 0 || stride.1 == 0 {
            return Err(LayerError::InvalidConfig(
                "avgpool2d: kernel and stride must be positive".into(),
            ));
        }
        Ok(AvgPool2d {
            base: LayerBase::new(name),
            kernel,
            stride,
        })
    }

    fn pooled_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        let (n, c, h, w) = check_nchw(input_shape, "avgpool2d")?;
        if h < self.kernel.0 || w < self.kernel.1 {
            return Err(LayerError::InvalidConfig(format!(
                "avgpool2d: window {:?} larger than input {}x{}",
                self.kernel, h, w
            )));
        }
        Ok(Shape::new(vec![
            n,
            c,
            pool_out_len(h, self.kernel.0, self.stride.0),
            pool_out_len(w, self.kernel.1, self.stride.1),
        ]))
    }
}

impl Layer for AvgPool2d {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        let out = self.pooled_shape(input_shape)?;
        self.base.mark_initialized(input_shape.clone(), out);
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        self.pooled_shape(input_shape)
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        input.avgpool2d(self.kernel, self.stride, Some(&out))?;
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?;
        Ok(grad_out.avgpool2d_backward(x.shape(), self.kernel, self.stride, None)?)
    }
}

/// Global average pool: `[n, c, h, w]` -> `[n, c]`.
pub struct GlobalAvgPool2d {
    base: LayerBase,
}

impl GlobalAvgPool2d {
    pub fn new(name: impl Into<String>) -> GlobalAvgPool2d {
        GlobalAvgPool2d {
            base: LayerBase::new(name),
        }
    }
}

impl Layer for GlobalAvgPool2d {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        let (n, c, _, _) = check_nchw(input_shape, "global_avgpool2d")?;
        self.base
            .mark_initialized(input_shape.clone(), Shape::new(vec![n, c]));
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        let (n, c, _, _) = check_nchw(input_shape, "global_avgpool2d")?;
        Ok(Shape::new(vec![n, c]))
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        input.global_avgpool2d(Some(&out))?;
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?;
        Ok(grad_out.global_avgpool2d_backward(x.shape(), None)?)
    }
}
