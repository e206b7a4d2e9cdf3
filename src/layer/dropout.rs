//! Dropout: in training mode samples a Bernoulli(1-p) mask and scales the
//! survivors by 1/(1-p); in eval mode it is the identity. Backward
//! multiplies the gradient by the stored mask.

use super::{Layer, LayerBase, LayerError, LayerResult};
use crate::runtime::with_rng;
use crate::shape::Shape;
use crate::tensor::Tensor;
use rand::Rng;

pub struct Dropout {
    base: LayerBase,
    p: f32,
    mask: Option<Tensor>,
}

impl Dropout {
    /// Drop probability `p` in [0, 1]. p = 1 zeroes every output in
    /// training mode (and therefore every gradient).
    pub fn new(name: impl Into<String>, p: f32) -> LayerResult<Dropout> {
        if !(0.0..=1.0).contains(&p) {
            return Err(LayerError::InvalidConfig(format!(
                "dropout: rate {} outside [0, 1]",
                p
            )));
        }
        Ok(Dropout {
            base: LayerBase::new(name),
            p,
            mask: None,
        })
    }

    fn sample_mask(&self) -> Tensor {
        let shape = self
            .base
            .expected_input()
            .expect("init allocated the mask shape")
            .clone();
        let n = shape.numel();
        let keep = 1.0 - self.p;
        let data: Vec<f32> = if keep <= 0.0 {
            vec![0.0; n]
        } else {
            let inv = 1.0 / keep;
            with_rng(|rng| {
                (0..n)
                    .map(|_| if rng.gen::<f32>() < keep { inv } else { 0.0 })
                    .collect()
            })
        };
        Tensor::from_vec(data, shape).expect("mask length matches shape")
    }
}

impl Layer for Dropout {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn init(&mut self, input_shape: &Shape) -> LayerResult<()> {
        self.base
            .mark_initialized(input_shape.clone(), input_shape.clone());
        self.mask = None;
        Ok(())
    }

    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape> {
        Ok(input_shape.clone())
    }

    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let out = self.base.begin_forward(input)?;
        if self.base.training() && self.p > 0.0 {
            let mask = self.sample_mask();
            input.mul(&mask, Some(&out))?;
            self.mask = Some(mask);
        } else {
            out.copy_from(input)?;
            self.mask = None;
        }
        Ok(out)
    }

    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor> {
        self.base.input_required()?;
        match &self.mask {
            Some(mask) => Ok(grad_out.mul(mask, None)?),
            // Identity pass (eval mode or p = 0).
            None => Ok(grad_out.view()),
        }
    }
}
