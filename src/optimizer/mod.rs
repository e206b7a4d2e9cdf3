//! Optimizers: single-parameter update driven by the model. State is keyed
//! by the parameter-data buffer id, so moving or replacing the parameter
//! struct never loses its moments. Updates run in place on the existing
//! data buffer; the hot path allocates only on a parameter's first visit.

use crate::layer::Parameter;
use crate::shape::Shape;
use crate::tensor::{BufferId, TensorError};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("data/grad shape mismatch: data {data}, grad {grad}")]
    ShapeMismatch { data: Shape, grad: Shape },
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Optimizer: updates one parameter from its accumulated gradient.
/// Parameters without a gradient, with `requires_grad` unset, or with an
/// empty data buffer are no-ops; a data/grad shape mismatch fails loudly.
pub trait Optimizer {
    fn update(&mut self, param: &mut Parameter) -> OptimizerResult<()>;
}

/// Decide whether a parameter participates in an update.
fn updatable(param: &Parameter) -> OptimizerResult<bool> {
    if !param.requires_grad() || param.data().numel() == 0 || param.data().is_empty() {
        return Ok(false);
    }
    let grad = match param.grad() {
        Some(g) => g,
        None => return Ok(false),
    };
    if !grad.shape().same_as(param.data().shape()) {
        return Err(OptimizerError::ShapeMismatch {
            data: param.data().shape().clone(),
            grad: grad.shape().clone(),
        });
    }
    Ok(true)
}

/// SGD: data <- data - lr * grad. Stateless single-tensor update.
pub struct SGD {
    pub lr: f32,
}

impl SGD {
    pub fn new(lr: f32) -> OptimizerResult<SGD> {
        if lr <= 0.0 || !lr.is_finite() {
            return Err(OptimizerError::InvalidConfig(format!(
                "sgd: learning rate {} must be positive",
                lr
            )));
        }
        Ok(SGD { lr })
    }
}

impl Optimizer for SGD {
    fn update(&mut self, param: &mut Parameter) -> OptimizerResult<()> {
        if !updatable(param)? {
            return Ok(());
        }
        let grad = param.grad().expect("updatable checked grad").view();
        param.data().axpy_acc(-self.lr, &grad)?;
        Ok(())
    }
}

/// Per-parameter Adam state: first and second moment plus the step count,
/// all living as long as the optimizer.
struct AdamState {
    m: Vec<f32>,
    v: Vec<f32>,
    step: u32,
}

/// Adam with bias-corrected moments. The state map is guarded by a mutex:
/// concurrent updates against one optimizer instance serialize there.
pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    state: Mutex<HashMap<BufferId, AdamState>>,
}

impl Adam {
    pub fn new(lr: f32) -> OptimizerResult<Adam> {
        if lr <= 0.0 || !lr.is_finite() {
            return Err(OptimizerError::InvalidConfig(format!(
                "adam: learning rate {} must be positive",
                lr
            )));
        }
        Ok(Adam {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            state: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> OptimizerResult<Adam> {
        if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
            return Err(OptimizerError::InvalidConfig(format!(
                "adam: betas ({}, {}) must lie in [0, 1)",
                beta1, beta2
            )));
        }
        self.beta1 = beta1;
        self.beta2 = beta2;
        Ok(self)
    }

    pub fn with_eps(mut self, eps: f32) -> OptimizerResult<Adam> {
        if eps <= 0.0 {
            return Err(OptimizerError::InvalidConfig(format!(
                "adam: epsilon {} must be positive",
                eps
            )));
        }
        self.eps = eps;
        Ok(self)
    }

    /// Step counter for a parameter's buffer, 0 before its first update.
    pub fn step_count(&self, id: BufferId) -> u32 {
        let guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.get(&id).map(|s| s.step).unwrap_or(0)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param: &mut Parameter) -> OptimizerResult<()> {
        if !updatable(param)? {
            return Ok(());
        }
        let n = param.data().numel();
        let id = param.data().id();
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let st = guard.entry(id).or_insert_with(|| AdamState {
            m: vec![0.0; n],
            v: vec![0.0; n],
            step: 0,
        });
        st.step += 1;
        let bc1 = 1.0 / (1.0 - self.beta1.powi(st.step as i32));
        let bc2 = 1.0 / (1.0 - self.beta2.powi(st.step as i32));
        let grad = param.grad().expect("updatable checked grad").view();
        let (lr, beta1, beta2, eps) = (self.lr, self.beta1, self.beta2, self.eps);
        let (m, v) = (&mut st.m, &mut st.v);
        param.data().with_data_pair_mut(&grad, "adam", |data, g| {
            for j in 0..n {
                let gj = g[j];
                m[j] = beta1 * m[j] + (1.0 - beta1) * gj;
                v[j] = beta2 * v[j] + (1.0 - beta2) * gj * gj;
                let m_hat = m[j] * bc1;
                let v_hat = v[j] * bc2;
                data[j] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        })?;
        Ok(())
    }
}
