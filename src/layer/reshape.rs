//! Shape-glue layers. Flatten collapses to rank-1; Reshape targets any
//! size-preserving shape. Backward re-expands the gradient to the
//! pre-forward shape.

use super::{Layer, LayerBase, LayerError, LayerResult};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Collapse the input to a rank-1 `[size]` tensor.
pub struct Flatten {
    base: LayerBase,
}

impl Flatten {
    pub fn new(name: impl Into<String>) -> Flatten {
        Flatten {
            base: LayerBase::new(name),
        }
    }
}

impl Layer for Flatten {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        let out = Shape::new(vec![input_shape.numel()]);
        self.base.mark_initialized(input_shape.clone(), out);
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        Ok(Shape::new(vec![input_shape.numel()]))
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        let flat = input
            .to_contiguous()?
            .reshape(out.shape().clone())?;
        out.copy_from(&flat)?;
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?;
        Ok(grad_out.to_contiguous()?.reshape(x.shape().clone())?)
    }
}

/// Reshape to a fixed target shape of the same element count.
pub struct Reshape {
    base: LayerBase,
    target: Shape,
}

impl Reshape {
    pub fn new(name: impl Into<String>, target: Shape) -> Reshape {
        Reshape {
            base: LayerBase::new(name),
            target,
        }
    }

    fn check(&self, input_shape: &Shape) -> LayerResult<()> {
        if input_shape.numel() != self.target.numel() {
            return Err(LayerError::InvalidConfig(format!(
                "reshape: input {} has {} elements, target {} has {}",
                input_shape,
                input_shape.numel(),
                self.target,
                self.target.numel()
            )));
        }
        Ok(())
    }
}

impl Layer for Reshape {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        self.check(input_shape)?;
        self.base
            .mark_initialized(input_shape.clone(), self.target.clone());
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        self.check(input_shape)?;
        Ok(self.target.clone())
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        let reshaped = input.to_contiguous()?.reshape(self.target.clone())?;
        out.copy_from(&reshaped)?;
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        let x = self.base.input_required()?;
        Ok(grad_out.to_contiguous()?.reshape(x.shape().clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;

    #[test]
    fn flatten_round_trip() {
        let mut f = Flatten::new("flat");
        let s = Shape::new(vec![1, 2, 2]);
        f.init(&s).unwrap();
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], s.clone()).unwrap();
        let y = f.forward(&x).unwrap();
        assert_eq!(y.shape().dims(), &[4]);
        let g = Tensor::from_vec(vec![5.0, 6.0, 7.0, 8.0], Shape::new(vec![4])).unwrap();
        let gi = f.backward(&g).unwrap();
        assert!(gi.shape().same_as(&s));
        assert_eq!(gi.to_vec().unwrap(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn reshape_preserves_data() {
        let mut r = Reshape::new("rs", Shape::new(vec![3, 2]));
        let s = Shape::new(vec![2, 3]);
        r.init(&s).unwrap();
        let x = Tensor::from_vec((1..=6).map(|v| v as f32).collect(), s).unwrap();
        let y = r.forward(&x).unwrap();
        assert_eq!(y.shape().dims(), &[3, 2]);
        assert_eq!(y.to_vec().unwrap(), x.to_vec().unwrap());
    }

    #[test]
    fn reshape_size_mismatch_rejected() {
        let mut r = Reshape::new("rs", Shape::new(vec![5]));
        assert!(r.init(&Shape::new(vec![2, 3])).is_err());
    }
}
