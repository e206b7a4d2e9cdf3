//! Dense (fully connected) layer: y = x·W + b with W `[in, out]`.
//! Accepts rank-1 `[in]` single samples and rank-2 `[n, in]` batches.

use super::{Layer, LayerBase, LayerError, LayerResult, ParamIndex, Parameter};
use crate::init::xavier_uniform;
use crate::shape::Shape;
use crate::tensor::Tensor;

pub struct Dense {
    base: LayerBase,
    out_features: usize,
    use_bias: bool,
}

impl Dense {
    /// New dense layer producing `out_features` outputs. The input width
    /// is taken from the shape handed to [`Layer::init`].
    pub fn new(name: impl Into<String>, out_features: usize) -> LayerResult<Dense> {
        if out_features == 0 {
            return Err(LayerError::InvalidConfig(
                "dense: out_features must be positive".into(),
            ));
        }
        Ok(Dense {
            base: LayerBase::new(name),
            out_features,
            use_bias: true,
        })
    }

    /// Drop the bias term.
    pub fn without_bias(mut self) -> Dense {
        self.use_bias = false;
        self
    }

    fn in_features(&self, input_shape: &Shape) -> LayerResult<usize> {
        let dims = input_shape.dims();
        match dims.len() {
            1 | 2 => {
                let last = *dims.last().unwrap();
                if last == 0 {
                    return Err(LayerError::InvalidConfig(
                        "dense: input width must be positive".into(),
                    ));
                }
                Ok(last)
            }
            r => Err(LayerError::InvalidConfig(format!(
                "dense: expects rank-1 or rank-2 input, got rank {}",
                r
            ))),
        }
    }
}

impl Layer for Dense {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        let in_features = self.in_features(input_shape)?;
        let weights = xavier_uniform(&Shape::new(vec![in_features, self.out_features]))?;
        self.base.insert_param(ParamIndex::Weights, Parameter::new(weights));
        if self.use_bias {
            let biases = Tensor::new(
                crate::dtype::DataType::F32,
                Shape::new(vec![self.out_features]),
            );
            self.base.insert_param(ParamIndex::Biases, Parameter::new(biases));
        }
        let out_shape = self.output_shape(input_shape)?;
        self.base.mark_initialized(input_shape.clone(), out_shape);
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        self.in_features(input_shape)?;
        let mut dims = input_shape.dims().to_vec();
        *dims.last_mut().unwrap() = self.out_features;
        Ok(Shape::new(dims))
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        let w = self.base.param_required(ParamIndex::Weights)?.data().view();
        if input.rank() == 1 {
            w.matvec_t(input, Some(&out))?;
            if self.use_bias {
                let b = self.base.param_required(ParamIndex::Biases)?.data();
                out.axpy_acc(1.0, b)?;
            }
        } else {
            input.matmul(&w, Some(&out))?;
            if self.use_bias {
                let b = self.base.param_required(ParamIndex::Biases)?.data().view();
                for r in 0..input.shape().dims()[0] {
                    out.subtensor(r)?.axpy_acc(1.0, &b)?;
                }
            }
        }
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?.view();
        let w = self.base.param_required(ParamIndex::Weights)?.data().view();
        let learn = self.base.can_learn();

        let grad_in = if grad_out.rank() == 1 {
            w.matvec(grad_out, None)?
        } else {
            grad_out.matmul_nt(&w, None)?
        };

        if learn {
            let wp = self.base.param_required_mut(ParamIndex::Weights)?;
            if wp.requires_grad() {
                let wg = wp.ensure_grad().view();
                if grad_out.rank() == 1 {
                    wg.acc_outer(1.0, &x, grad_out)?;
                } else {
                    wg.acc_matmul_tn(&x, grad_out)?;
                }
            }
            if self.use_bias {
                let bp = self.base.param_required_mut(ParamIndex::Biases)?;
                if bp.requires_grad() {
                    let bg = bp.ensure_grad().view();
                    if grad_out.rank() == 1 {
                        bg.axpy_acc(1.0, grad_out)?;
                    } else {
                        let summed = grad_out.sum(&[0], None)?;
                        bg.axpy_acc(1.0, &summed)?;
                    }
                }
            }
        }
        Ok(grad_in)
    }
}
