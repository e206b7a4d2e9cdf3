//! Model persistence: serializable parameter states keyed by
//! `"layer_index:param_index"`, with JSON file helpers. Only parameter
//! data travels; gradients and optimizer state stay behind.

use crate::dtype::DataType;
use crate::model::Sequential;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Serializable snapshot of one parameter.
#[derive(Serialize, Deserialize)]
pub struct ParameterState {
    pub key: String,
    pub dtype: DataType,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Save a state dict to a JSON file.
pub fn save_state_dict(
    path: impl AsRef<Path>,
    states: &[ParameterState],
) -> Result<(), std::io::Error> {
    let f = File::create(path)?;
    let w = BufWriter::new(f);
    serde_json::to_writer(w, states)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Load a state dict from a JSON file.
pub fn load_state_dict(path: impl AsRef<Path>) -> Result<Vec<ParameterState>, std::io::Error> {
    let f = File::open(path)?;
    let r = BufReader::new(f);
    serde_json::from_reader(r).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Sequential {
    /// Snapshot every parameter's data.
    pub fn state_dict(&self) -> Result<Vec<ParameterState>, TensorError> {
        let mut out = Vec::new();
        for (key, p) in self.parameters() {
            out.push(ParameterState {
                key,
                dtype: p.data().dtype(),
                shape: p.data().shape().dims().to_vec(),
                data: p.data().to_vec()?,
            });
        }
        Ok(out)
    }

    /// Restore parameter data from a snapshot. Entries are matched by key;
    /// shapes must agree. Unknown keys are ignored, so partial state dicts
    /// restore what they carry.
    pub fn apply_state_dict(&self, states: &[ParameterState]) -> Result<(), TensorError> {
        for (key, p) in self.parameters() {
            if let Some(state) = states.iter().find(|s| s.key == key) {
                let restored =
                    Tensor::from_vec(state.data.clone(), Shape::new(state.shape.clone()))?;
                p.data().copy_from(&restored)?;
            }
        }
        Ok(())
    }
}
