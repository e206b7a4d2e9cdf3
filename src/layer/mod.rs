//! Layer protocol: polymorphic computational units with a parameter table,
//! cached forward input/output, and a backward pass producing the gradient
//! with respect to the input. `can_learn` gates parameter-gradient
//! accumulation but never gradient propagation.

pub mod activation;
pub mod conv;
pub mod dense;
pub mod dropout;
pub mod pool;
pub mod reshape;

pub use activation::{ReLU, Sigmoid, Softmax, Tanh};
pub use conv::{Conv1d, Conv2d};
pub use dense::Dense;
pub use dropout::Dropout;
pub use pool::{AvgPool2d, GlobalAvgPool2d, MaxPool2d};
pub use reshape::{Flatten, Reshape};

use crate::dtype::DataType;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorError};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayerError {
    #[error("layer not initialized: call init before {0}")]
    NotInitialized(&'static str),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("uninitialized parameter {0}")]
    UninitializedParameter(ParamIndex),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type LayerResult<T> = Result<T, LayerError>;

/// Slot a parameter occupies inside a layer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ParamIndex {
    Weights,
    Biases,
    Kernels,
    RunningMean,
    RunningVar,
    Extra(u8),
}

impl fmt::Display for ParamIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamIndex::Weights => write!(f, "weights"),
            ParamIndex::Biases => write!(f, "biases"),
            ParamIndex::Kernels => write!(f, "kernels"),
            ParamIndex::RunningMean => write!(f, "running_mean"),
            ParamIndex::RunningVar => write!(f, "running_var"),
            ParamIndex::Extra(n) => write!(f, "extra{}", n),
        }
    }
}

/// Trainable parameter: current values, accumulated gradient (allocated
/// lazily), and the optimizer gate.
#[derive(Clone)]
pub struct Parameter {
    data: Tensor,
    grad: Option<Tensor>,
    requires_grad: bool,
}

impl Parameter {
    pub fn new(data: Tensor) -> Self {
        Parameter {
            data,
            grad: None,
            requires_grad: true,
        }
    }

    pub fn data(&self) -> &Tensor {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Tensor {
        &mut self.data
    }

    /// Gradient, if one has been allocated.
    pub fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    /// Gradient tensor, allocated zeroed (same shape as data) on first use.
    pub fn ensure_grad(&mut self) -> &Tensor {
        if self.grad.is_none() {
            self.grad = Some(Tensor::new(DataType::F32, self.data.shape().clone()));
        }
        self.grad.as_ref().unwrap()
    }

    /// Zero the gradient, allocating it lazily. Idempotent.
    pub fn zero_grad(&mut self) -> LayerResult<()> {
        self.ensure_grad().zero_fill()?;
        Ok(())
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, v: bool) {
        self.requires_grad = v;
    }
}

/// Shared layer state: name, learn gate, parameter table, the cached
/// forward input view, the output tensor preallocated at init, and the
/// input shape the layer was initialized for.
pub struct LayerBase {
    name: String,
    can_learn: bool,
    training: bool,
    params: BTreeMap<ParamIndex, Parameter>,
    expected_input: Option<Shape>,
    input: Option<Tensor>,
    output: Option<Tensor>,
}

impl LayerBase {
    pub fn new(name: impl Into<String>) -> Self {
        LayerBase {
            name: name.into(),
            can_learn: true,
            training: true,
            params: BTreeMap::new(),
            expected_input: None,
            input: None,
            output: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn can_learn(&self) -> bool {
        self.can_learn
    }

    pub fn set_can_learn(&mut self, v: bool) {
        self.can_learn = v;
    }

    pub fn training(&self) -> bool {
        self.training
    }

    pub fn set_training(&mut self, v: bool) {
        self.training = v;
    }

    pub fn param(&self, idx: ParamIndex) -> Option<&Parameter> {
        self.params.get(&idx)
    }

    pub fn param_mut(&mut self, idx: ParamIndex) -> Option<&mut Parameter> {
        self.params.get_mut(&idx)
    }

    /// Parameter in a slot that init must have filled.
    pub fn param_required(&self, idx: ParamIndex) -> LayerResult<&Parameter> {
        self.params
            .get(&idx)
            .ok_or(LayerError::UninitializedParameter(idx))
    }

    pub fn param_required_mut(&mut self, idx: ParamIndex) -> LayerResult<&mut Parameter> {
        self.params
            .get_mut(&idx)
            .ok_or(LayerError::UninitializedParameter(idx))
    }

    pub fn insert_param(&mut self, idx: ParamIndex, p: Parameter) {
        self.params.insert(idx, p);
    }

    pub fn parameters(&self) -> Vec<(ParamIndex, &Parameter)> {
        self.params.iter().map(|(&i, p)| (i, p)).collect()
    }

    pub fn parameters_mut(&mut self) -> Vec<(ParamIndex, &mut Parameter)> {
        self.params.iter_mut().map(|(&i, p)| (i, p)).collect()
    }

    /// Zero every parameter gradient, allocating lazily. Calling twice is
    /// the same as calling once.
    pub fn zero_grad(&mut self) -> LayerResult<()> {
        for p in self.params.values_mut() {
            p.zero_grad()?;
        }
        Ok(())
    }

    /// Record the shape init ran for and preallocate the output tensor.
    pub fn mark_initialized(&mut self, input_shape: Shape, output_shape: Shape) {
        self.expected_input = Some(input_shape);
        self.output = Some(Tensor::new(DataType::F32, output_shape));
        self.input = None;
    }

    pub fn expected_input(&self) -> Option<&Shape> {
        self.expected_input.as_ref()
    }

    /// Verify init ran and the forward input matches its shape; cache the
    /// input view and return a view of the preallocated output.
    pub fn begin_forward(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let expected = self
            .expected_input
            .as_ref()
            .ok_or(LayerError::NotInitialized("forward"))?;
        if !input.shape().same_as(expected) {
            return Err(LayerError::Tensor(TensorError::ShapeMismatch {
                expected: expected.clone(),
                found: input.shape().clone(),
            }));
        }
        self.input = Some(input.view());
        Ok(self
            .output
            .as_ref()
            .expect("output allocated with expected_input")
            .view())
    }

    pub fn input(&self) -> Option<&Tensor> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&Tensor> {
        self.output.as_ref()
    }

    /// Cached forward input, required by backward.
    pub fn input_required(&self) -> LayerResult<&Tensor> {
        self.input.as_ref().ok_or(LayerError::NotInitialized("backward"))
    }

    pub fn output_required(&self) -> LayerResult<&Tensor> {
        self.output.as_ref().ok_or(LayerError::NotInitialized("backward"))
    }
}

/// The capability set every layer satisfies. Defaults delegate to the
/// embedded [`LayerBase`]; concrete layers implement init, shape
/// propagation, forward, and backward.
pub trait Layer {
    fn base(&self) -> &LayerBase;
    fn base_mut(&mut self) -> &mut LayerBase;

    /// Unique name within a model.
    fn name(&self) -> &str {
        self.base().name()
    }

    fn can_learn(&self) -> bool {
        self.base().can_learn()
    }

    fn set_can_learn(&mut self, v: bool) {
        self.base_mut().set_can_learn(v);
    }

    /// Training/eval switch; only stochastic layers react.
    fn set_training(&mut self, v: bool) {
        self.base_mut().set_training(v);
    }

    /// Last forward input (a view).
    fn input(&self) -> Option<&Tensor> {
        self.base().input()
    }

    /// Preallocated output written by forward (a view).
    fn output(&self) -> Option<&Tensor> {
        self.base().output()
    }

    fn parameters(&self) -> Vec<(ParamIndex, &Parameter)> {
        self.base().parameters()
    }

    fn parameters_mut(&mut self) -> Vec<(ParamIndex, &mut Parameter)> {
        self.base_mut().parameters_mut()
    }

    /// Replace a parameter by value. The replacement must match the
    /// existing parameter's data shape.
    fn set_param(&mut self, idx: ParamIndex, p: Parameter) -> LayerResult<()> {
        let existing = self.base().param_required(idx)?;
        if !existing.data().shape().same_as(p.data().shape()) {
            return Err(LayerError::Tensor(TensorError::ShapeMismatch {
                expected: existing.data().shape().clone(),
                found: p.data().shape().clone(),
            }));
        }
        self.base_mut().insert_param(idx, p);
        Ok(())
    }

    /// Zero every parameter gradient.
    fn zero_grad(&mut self) -> LayerResult<()> {
        self.base_mut().zero_grad()
    }

    /// Allocate parameters and the output buffer for the given input shape.
    fn init(&mut self, input_shape: &Shape) -> LayerResult<()>;

    /// Output shape for a given input shape, without running forward.
    fn output_shape(&self, input_shape: &Shape) -> LayerResult<Shape>;

    /// Compute the output for `input`, caching the input view and writing
    /// into the preallocated output tensor. Returns a view of the output.
    fn forward(&mut self, input: &Tensor) -> LayerResult<Tensor>;

    /// Gradient of the loss with respect to this layer's input, given the
    /// gradient with respect to its output. Accumulates parameter
    /// gradients when the layer can learn.
    fn backward(&mut self, grad_out: &Tensor) -> LayerResult<Tensor>;
}
