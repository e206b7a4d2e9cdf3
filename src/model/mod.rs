//! Sequential model: an ordered composition of layers with one input and
//! one output shape. Init propagates shapes layer by layer; forward feeds
//! each layer's preallocated output to the next without cloning; backward
//! walks in reverse; update drives the optimizer across every parameter.

use crate::layer::{Layer, LayerError, Parameter};
use crate::optimizer::Optimizer;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorError};
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model not built: call build before {0}")]
    NotBuilt(&'static str),
    #[error("model not initialized: call init before {0}")]
    NotInitialized(&'static str),
    #[error("model has no layers")]
    NoLayers,
    #[error("duplicate layer name '{0}'")]
    DuplicateLayer(String),
    #[error("layer '{name}' (index {index}): {source}")]
    Layer {
        name: String,
        index: usize,
        source: LayerError,
    },
    #[error("optimizer error on '{name}:{param}': {message}")]
    Optimizer {
        name: String,
        param: String,
        message: String,
    },
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    index: HashMap<String, usize>,
    built: bool,
    input_shape: Option<Shape>,
    last_input: Option<Tensor>,
    last_output: Option<Tensor>,
}

impl Sequential {
    pub fn new() -> Sequential {
        Sequential::default()
    }

    fn wrap(&self, i: usize, e: LayerError) -> ModelError {
        ModelError::Layer {
            name: self.layers[i].name().to_string(),
            index: i,
            source: e,
        }
    }

    /// Append a layer. Names must be unique; adding after build fails.
    pub fn add_layer<L: Layer + 'static>(&mut self, layer: L) -> ModelResult<()> {
        if self.built {
            return Err(ModelError::NotBuilt("add_layer (model already built)"));
        }
        let name = layer.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ModelError::DuplicateLayer(name));
        }
        self.index.insert(name, self.layers.len());
        self.layers.push(Box::new(layer));
        Ok(())
    }

    /// Freeze the layer order.
    pub fn build(&mut self) -> ModelResult<()> {
        if self.layers.is_empty() {
            return Err(ModelError::NoLayers);
        }
        self.built = true;
        Ok(())
    }

    /// Initialize every layer, propagating the output shape of each as the
    /// input shape of the next.
    pub fn init(&mut self, input_shape: &Shape) -> ModelResult<()> {
        if !self.built {
            return Err(ModelError::NotBuilt("init"));
        }
        let mut current = input_shape.clone();
        for i in 0..self.layers.len() {
            self.layers[i]
                .init(&current)
                .map_err(|e| self.wrap(i, e))?;
            let next = self.layers[i]
                .output_shape(&current)
                .map_err(|e| self.wrap(i, e))?;
            debug!(
                "init layer {} '{}': {} -> {}",
                i,
                self.layers[i].name(),
                current,
                next
            );
            current = next;
        }
        self.input_shape = Some(input_shape.clone());
        self.last_input = None;
        self.last_output = None;
        Ok(())
    }

    /// Expected input shape recorded by init.
    pub fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    /// Output shape of the whole stack for the initialized input shape.
    pub fn output_shape(&self) -> ModelResult<Shape> {
        let mut current = self
            .input_shape
            .clone()
            .ok_or(ModelError::NotInitialized("output_shape"))?;
        for (i, layer) in self.layers.iter().enumerate() {
            current = layer
                .output_shape(&current)
                .map_err(|e| self.wrap(i, e))?;
        }
        Ok(current)
    }

    /// Forward through every layer in order. The output is a view of the
    /// last layer's preallocated output tensor.
    pub fn forward(&mut self, input: &Tensor) -> ModelResult<Tensor> {
        let expected = self
            .input_shape
            .as_ref()
            .ok_or(ModelError::NotInitialized("forward"))?;
        if !input.shape().same_as(expected) {
            return Err(ModelError::Tensor(TensorError::ShapeMismatch {
                expected: expected.clone(),
                found: input.shape().clone(),
            }));
        }
        self.last_input = Some(input.view());
        let mut current = input.view();
        for i in 0..self.layers.len() {
            current = self.layers[i]
                .forward(&current)
                .map_err(|e| self.wrap(i, e))?;
        }
        self.last_output = Some(current.view());
        Ok(current)
    }

    /// Backward through every layer in reverse order. Returns the gradient
    /// with respect to the model input.
    pub fn backward(&mut self, grad_out: &Tensor) -> ModelResult<Tensor> {
        if self.last_output.is_none() {
            return Err(ModelError::NotInitialized("backward"));
        }
        let mut grad = grad_out.view();
        for i in (0..self.layers.len()).rev() {
            grad = self.layers[i]
                .backward(&grad)
                .map_err(|e| self.wrap(i, e))?;
        }
        Ok(grad)
    }

    /// All parameters, keyed `"layer_index:param_index"`.
    pub fn parameters(&self) -> Vec<(String, &Parameter)> {
        let mut out = Vec::new();
        for (i, layer) in self.layers.iter().enumerate() {
            for (idx, p) in layer.parameters() {
                out.push((format!("{}:{}", i, idx), p));
            }
        }
        out
    }

    /// Zero every parameter gradient in every layer.
    pub fn zero_grad(&mut self) -> ModelResult<()> {
        for i in 0..self.layers.len() {
            self.layers[i].zero_grad().map_err(|e| self.wrap(i, e))?;
        }
        Ok(())
    }

    /// Run one optimizer update over every `(layer, param)` pair.
    pub fn update(&mut self, optimizer: &mut dyn Optimizer) -> ModelResult<()> {
        for i in 0..self.layers.len() {
            let name = self.layers[i].name().to_string();
            for (idx, p) in self.layers[i].parameters_mut() {
                optimizer.update(p).map_err(|e| ModelError::Optimizer {
                    name: name.clone(),
                    param: idx.to_string(),
                    message: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Flip training/eval mode on every layer.
    pub fn set_training(&mut self, training: bool) {
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, name: &str) -> Option<&dyn Layer> {
        self.index.get(name).map(|&i| self.layers[i].as_ref())
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut dyn Layer> {
        match self.index.get(name) {
            Some(&i) => Some(self.layers[i].as_mut()),
            None => None,
        }
    }

    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    /// Last forward input (a view).
    pub fn input(&self) -> Option<&Tensor> {
        self.last_input.as_ref()
    }

    /// Last forward output (a view).
    pub fn output(&self) -> Option<&Tensor> {
        self.last_output.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Dense, ReLU};

    fn model() -> Sequential {
        let mut m = Sequential::new();
        m.add_layer(Dense::new("fc1", 4).unwrap()).unwrap();
        m.add_layer(ReLU::new("act1")).unwrap();
        m.add_layer(Dense::new("fc2", 2).unwrap()).unwrap();
        m.build().unwrap();
        m
    }

    #[test]
    fn duplicate_names_fail_at_add() {
        let mut m = Sequential::new();
        m.add_layer(Dense::new("fc", 4).unwrap()).unwrap();
        assert!(matches!(
            m.add_layer(Dense::new("fc", 2).unwrap()),
            Err(ModelError::DuplicateLayer(_))
        ));
    }

    #[test]
    fn forward_requires_init() {
        let mut m = model();
        let x = Tensor::from_vec(vec![1.0, 2.0], Shape::new(vec![2])).unwrap();
        assert!(matches!(
            m.forward(&x),
            Err(ModelError::NotInitialized(_))
        ));
    }

    #[test]
    fn shape_propagation_and_forward() {
        let mut m = model();
        m.init(&Shape::new(vec![3])).unwrap();
        assert_eq!(m.output_shape().unwrap().dims(), &[2]);
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], Shape::new(vec![3])).unwrap();
        let y = m.forward(&x).unwrap();
        assert_eq!(y.shape().dims(), &[2]);
        assert!(m.input().is_some());
        assert!(m.output().is_some());
    }

    #[test]
    fn wrong_input_shape_rejected() {
        let mut m = model();
        m.init(&Shape::new(vec![3])).unwrap();
        let x = Tensor::from_vec(vec![1.0, 2.0], Shape::new(vec![2])).unwrap();
        assert!(m.forward(&x).is_err());
    }

    #[test]
    fn parameters_are_keyed_by_layer_and_slot() {
        let mut m = model();
        m.init(&Shape::new(vec![3])).unwrap();
        let keys: Vec<String> = m.parameters().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["0:weights", "0:biases", "2:weights", "2:biases"]);
    }
}
