//! Training orchestration. One step is forward -> loss -> loss gradient ->
//! zero-grad -> backward -> update: zeroing precedes backward so gradient
//! accumulation within a step starts from zero, and update follows
//! backward. Errors carry the phase that produced them.

use crate::data::{DataLoader, Dataset};
use crate::loss::Loss;
use crate::model::Sequential;
use crate::optimizer::Optimizer;
use crate::tensor::Tensor;
use log::{debug, trace};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("{phase}: {message}")]
    Phase {
        phase: &'static str,
        message: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type TrainResult<T> = Result<T, TrainError>;

fn phase<T, E: std::fmt::Display>(name: &'static str, r: Result<T, E>) -> TrainResult<T> {
    r.map_err(|e| TrainError::Phase {
        phase: name,
        message: e.to_string(),
    })
}

/// One training step on a single (input, target) pair. Returns the loss.
pub fn train_step(
    model: &mut Sequential,
    optimizer: &mut dyn Optimizer,
    loss: &dyn Loss,
    input: &Tensor,
    target: &Tensor,
) -> TrainResult<f32> {
    if input.is_empty() || input.numel() == 0 {
        return Err(TrainError::InvalidInput("empty input tensor".into()));
    }
    if target.is_empty() || target.numel() == 0 {
        return Err(TrainError::InvalidInput("empty target tensor".into()));
    }
    let output = phase("forward", model.forward(input))?;
    let loss_value = phase("loss", loss.compute(&output, target))?;
    let grad = phase("loss", loss.gradient(&output, target))?;
    phase("backward", model.zero_grad())?;
    phase("backward", model.backward(&grad))?;
    phase("update", model.update(optimizer))?;
    trace!("train_step: loss {}", loss_value);
    Ok(loss_value)
}

/// Trainer: owns model, optimizer, and loss; runs steps, accumulated
/// batches, and epochs.
pub struct Trainer<O, L> {
    pub model: Sequential,
    pub optimizer: O,
    pub loss: L,
}

impl<O: Optimizer, L: Loss> Trainer<O, L> {
    pub fn new(model: Sequential, optimizer: O, loss: L) -> Self {
        Trainer {
            model,
            optimizer,
            loss,
        }
    }

    /// One single-sample step.
    pub fn step(&mut self, input: &Tensor, target: &Tensor) -> TrainResult<f32> {
        train_step(&mut self.model, &mut self.optimizer, &self.loss, input, target)
    }

    /// One accumulated step over several samples: gradients are zeroed
    /// once, every sample's backward accumulates into them, and the
    /// optimizer runs once. Returns the mean loss.
    pub fn train_batch(&mut self, samples: &[(Tensor, Tensor)]) -> TrainResult<f32> {
        if samples.is_empty() {
            return Err(TrainError::InvalidInput("empty batch".into()));
        }
        phase("backward", self.model.zero_grad())?;
        let mut total = 0.0f32;
        for (input, target) in samples {
            let output = phase("forward", self.model.forward(input))?;
            total += phase("loss", self.loss.compute(&output, target))?;
            let grad = phase("loss", self.loss.gradient(&output, target))?;
            phase("backward", self.model.backward(&grad))?;
        }
        phase("update", self.model.update(&mut self.optimizer))?;
        Ok(total / samples.len() as f32)
    }

    /// One pass over a data loader, one accumulated step per batch.
    /// Returns (mean batch loss, batch count).
    pub fn run_epoch<D: Dataset>(
        &mut self,
        loader: &mut DataLoader<D>,
    ) -> TrainResult<(f32, usize)> {
        let mut total = 0.0f32;
        let mut batches = 0usize;
        while let Some(batch) = loader.next_batch() {
            total += self.train_batch(&batch)?;
            batches += 1;
        }
        let avg = if batches > 0 {
            total / batches as f32
        } else {
            0.0
        };
        debug!("epoch done: {} batches, avg loss {}", batches, avg);
        Ok((avg, batches))
    }
}
