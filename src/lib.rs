//! nncore: embedded neural network core.
//!
//! Layers of the crate, leaves first: kernels (pure primitives over flat
//! FP32 buffers) -> tensor (strided handles over reference-counted
//! buffers) -> layer (forward/backward units with cached buffers) ->
//! model (sequential composition) -> loss/optimizer/train.
//!
//! Determinism: use [set_seed] before init/training for reproducible runs.

pub mod data;
pub mod dtype;
pub mod init;
pub mod kernels;
pub mod layer;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod runtime;
pub mod shape;
pub mod state_io;
pub mod tensor;
pub mod train;

pub use data::{DataLoader, Dataset, InMemoryDataset};
pub use dtype::DataType;
pub use init::{he_uniform, xavier_uniform};
pub use layer::{
    AvgPool2d, Conv1d, Conv2d, Dense, Dropout, Flatten, GlobalAvgPool2d, Layer, LayerError,
    LayerResult, MaxPool2d, ParamIndex, Parameter, ReLU, Reshape, Sigmoid, Softmax, Tanh,
};
pub use loss::{CategoricalCrossEntropy, CrossEntropy, Loss, LossError, LossResult, Mse};
pub use model::{ModelError, ModelResult, Sequential};
pub use optimizer::{Adam, Optimizer, OptimizerError, OptimizerResult, SGD};
pub use runtime::{set_seed, with_rng};
pub use shape::{Shape, ShapeError};
pub use state_io::{load_state_dict, save_state_dict, ParameterState};
pub use tensor::{BufferId, Tensor, TensorError, TensorResult};
pub use train::{train_step, TrainError, TrainResult, Trainer};
