//! Loss functions: scalar loss plus a gradient tensor shaped like the
//! predictions. MSE for regression, cross-entropy for probabilities, and
//! categorical cross-entropy with an optional softmax-from-logits front.

use crate::shape::Shape;
use crate::tensor::{Tensor, TensorError, TensorResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LossError {
    #[error("shape mismatch: predictions {pred}, targets {target}")]
    ShapeMismatch { pred: Shape, target: Shape },
    #[error("empty input")]
    EmptyInput,
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type LossResult<T> = Result<T, LossError>;

/// Numerical floor added to probabilities before taking logs.
pub const CE_EPSILON: f32 = 1e-10;

/// Loss: consumes predictions and targets of the same shape.
pub trait Loss {
    fn name(&self) -> &'static str;

    /// Scalar loss value.
    fn compute(&self, pred: &Tensor, target: &Tensor) -> LossResult<f32>;

    /// Gradient of the loss with respect to the predictions.
    fn gradient(&self, pred: &Tensor, target: &Tensor) -> LossResult<Tensor>;
}

fn check_pair(pred: &Tensor, target: &Tensor) -> LossResult<()> {
    if pred.numel() == 0 || target.numel() == 0 {
        return Err(LossError::EmptyInput);
    }
    if !pred.shape().same_as(target.shape()) {
        return Err(LossError::ShapeMismatch {
            pred: pred.shape().clone(),
            target: target.shape().clone(),
        });
    }
    Ok(())
}

/// Mean squared error: mean((p - t)^2); gradient 2(p - t)/n.
pub struct Mse;

impl Mse {
    pub fn new() -> Mse {
        Mse
    }
}

impl Default for Mse {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for Mse {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn compute(&self, pred: &Tensor, target: &Tensor) -> LossResult<f32> {
        check_pair(pred, target)?;
        let diff = pred.sub(target, None)?;
        let sq = diff.mul(&diff, None)?;
        Ok(sq.mean_all()?)
    }

    fn gradient(&self, pred: &Tensor, target: &Tensor) -> LossResult<Tensor> {
        check_pair(pred, target)?;
        let diff = pred.sub(target, None)?;
        Ok(diff.scale(2.0 / pred.numel() as f32, None)?)
    }
}

/// Cross-entropy over probabilities: -sum(t * ln(p + eps)).
/// The gradient is -t/(p + eps), zeroed where p <= 0.
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> CrossEntropy {
        CrossEntropy
    }

    fn ce_loss(pred: &Tensor, target: &Tensor) -> TensorResult<f32> {
        let shifted = pred.add_scalar(CE_EPSILON, None)?;
        let logp = shifted.log(None)?;
        let weighted = target.mul(&logp, None)?;
        Ok(-weighted.sum_all()?)
    }

    fn ce_gradient(pred: &Tensor, target: &Tensor) -> TensorResult<Tensor> {
        let shifted = pred.add_scalar(CE_EPSILON, None)?;
        let ratio = target.div(&shifted, None)?;
        let grad = ratio.neg(None)?;
        // No gradient through non-positive probabilities.
        let valid = pred.gt_scalar(0.0, None)?;
        grad.mul(&valid, None)
    }
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for CrossEntropy {
    fn name(&self) -> &'static str {
        "cross_entropy"
    }

    fn compute(&self, pred: &Tensor, target: &Tensor) -> LossResult<f32> {
        check_pair(pred, target)?;
        Ok(Self::ce_loss(pred, target)?)
    }

    fn gradient(&self, pred: &Tensor, target: &Tensor) -> LossResult<Tensor> {
        check_pair(pred, target)?;
        Ok(Self::ce_gradient(pred, target)?)
    }
}

/// Categorical cross-entropy. With `from_logits` the predictions run
/// through softmax along the last axis first, and the gradient collapses
/// to `softmax(p) - t`.
pub struct CategoricalCrossEntropy {
    from_logits: bool,
}

impl CategoricalCrossEntropy {
    pub fn new(from_logits: bool) -> CategoricalCrossEntropy {
        CategoricalCrossEntropy { from_logits }
    }

    fn last_axis(pred: &Tensor) -> usize {
        pred.rank().saturating_sub(1)
    }
}

impl Loss for CategoricalCrossEntropy {
    fn name(&self) -> &'static str {
        "categorical_cross_entropy"
    }

    fn compute(&self, pred: &Tensor, target: &Tensor) -> LossResult<f32> {
        check_pair(pred, target)?;
        if self.from_logits {
            let probs = pred.softmax(Self::last_axis(pred), None)?;
            Ok(CrossEntropy::ce_loss(&probs, target)?)
        } else {
            Ok(CrossEntropy::ce_loss(pred, target)?)
        }
    }

    fn gradient(&self, pred: &Tensor, target: &Tensor) -> LossResult<Tensor> {
        check_pair(pred, target)?;
        if self.from_logits {
            let probs = pred.softmax(Self::last_axis(pred), None)?;
            Ok(probs.sub(target, None)?)
        } else {
            Ok(CrossEntropy::ce_gradient(pred, target)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t(data: Vec<f32>, dims: Vec<usize>) -> Tensor {
        Tensor::from_vec(data, Shape::new(dims)).unwrap()
    }

    #[test]
    fn mse_exact_match_is_zero() {
        let p = t(vec![1.0, 2.0, 3.0], vec![3]);
        let y = t(vec![1.0, 2.0, 3.0], vec![3]);
        let loss = Mse::new();
        assert_eq!(loss.compute(&p, &y).unwrap(), 0.0);
        assert_eq!(
            loss.gradient(&p, &y).unwrap().to_vec().unwrap(),
            vec![0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn mse_off_by_one() {
        let p = t(vec![1.0, 2.0, 3.0], vec![3]);
        let y = t(vec![2.0, 3.0, 4.0], vec![3]);
        let loss = Mse::new();
        assert_relative_eq!(loss.compute(&p, &y).unwrap(), 1.0, epsilon = 1e-5);
        for g in loss.gradient(&p, &y).unwrap().to_vec().unwrap() {
            assert_relative_eq!(g, -0.6667, epsilon = 1e-3);
        }
    }

    #[test]
    fn mse_shape_mismatch() {
        let p = t(vec![1.0, 2.0], vec![2]);
        let y = t(vec![1.0, 2.0, 3.0], vec![3]);
        assert!(matches!(
            Mse::new().compute(&p, &y),
            Err(LossError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn cross_entropy_perfect_prediction() {
        let p = t(vec![0.0, 1.0, 0.0], vec![3]);
        let y = t(vec![0.0, 1.0, 0.0], vec![3]);
        let loss = CrossEntropy::new();
        assert_relative_eq!(loss.compute(&p, &y).unwrap(), 0.0, epsilon = 1e-5);
        let g = loss.gradient(&p, &y).unwrap().to_vec().unwrap();
        // Gradient is zeroed where p <= 0.
        assert_eq!(g[0], 0.0);
        assert_eq!(g[2], 0.0);
        assert_relative_eq!(g[1], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn cce_logits_gradient_is_softmax_minus_target() {
        let p = t(vec![1.0, 2.0, 3.0], vec![3]);
        let y = t(vec![0.0, 0.0, 1.0], vec![3]);
        let loss = CategoricalCrossEntropy::new(true);
        let g = loss.gradient(&p, &y).unwrap().to_vec().unwrap();
        let sm = p.softmax(0, None).unwrap().to_vec().unwrap();
        for i in 0..3 {
            assert_relative_eq!(g[i], sm[i] - y.at(&[i]).unwrap(), epsilon = 1e-6);
        }
    }
}
