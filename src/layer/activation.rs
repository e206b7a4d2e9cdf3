//! Activation layers: ReLU, Sigmoid, Tanh, Softmax. No parameters; each
//! writes into its preallocated output and differentiates through the
//! matching gradient kernel (ReLU from the cached input, the others from
//! the cached output).

use super::{Layer, LayerBase, LayerResult};
use crate::shape::Shape;
use crate::tensor::Tensor;

macro_rules! unary_activation {
    ($name:ident, $fwd:ident, $doc:expr) => {
        #[doc = $doc]
        pub struct $name {
            base: LayerBase,
        }

        impl $name {
            pub fn new(name: impl Into<String>) -> $name {
                $name {
                    base: LayerBase::new(name),
                }
            }
        }

        impl Layer for $name {
            fn base(&self) -> &LayerBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut LayerBase {
                &mut self.base
            }

            fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
                self.base
                    .mark_initialized(input_shape.clone(), input_shape.clone());
                Ok(())
            }

            fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
                Ok(input_shape.clone())
            }

            fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
                let out = self.base.begin_forward(input)?;
                input.$fwd(Some(&out))?;
                Ok(out)
            }

            fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
                $name::grad(self, grad_out)
            }
        }
    };
}

unary_activation!(ReLU, relu, "ReLU: max(0, x).");
unary_activation!(Sigmoid, sigmoid, "Sigmoid: 1/(1+exp(-x)).");
unary_activation!(Tanh, tanh, "Tanh.");

impl ReLU {
    fn grad(&self, grad_out: &Tensor) -> LayerResult<Tensor> {
        // ReLU' needs the forward input.
        let x = self.base.input_required()?;
        Ok(x.relu_backward(grad_out, None)?)
    }
}

impl Sigmoid {
    fn grad(&self, grad_out: &Tensor) -> LayerResult<Tensor> {
        // sigma' = y(1-y): the forward output is enough.
        let y = self.base.output_required()?;
        Ok(y.sigmoid_backward(grad_out, None)?)
    }
}

impl Tanh {
    fn grad(&self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let y = self.base.output_required()?;
        Ok(y.tanh_backward(grad_out, None)?)
    }
}

/// Softmax along the last axis.
pub struct Softmax {
    base: LayerBase,
}

impl Softmax {
    pub fn new(name: impl Into<String>) -> Softmax {
        Softmax {
            base: LayerBase::new(name),
        }
    }

    fn axis(shape: &Shape) -> usize {
        shape.rank().saturating_sub(1)
    }
}

impl Layer for Softmax {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        self.base
            .mark_initialized(input_shape.clone(), input_shape.clone());
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        Ok(input_shape.clone())
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        input.softmax(Self::axis(input.shape()), Some(&out))?;
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let y = self.base.output_required()?;
        Ok(y.softmax_backward(grad_out, Self::axis(y.shape()), None)?)
    }
}
