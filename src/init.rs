//! Weight initialization: Xavier and He uniform. Pure functions over
//! shapes; deterministic for a fixed seed. Fan-in/fan-out are the two
//! leading axes for dense weights and the flattened receptive fields for
//! convolution kernels.

use crate::runtime::with_rng;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorResult};
use rand::Rng;

fn fans(shape: &Shape) -> (usize, usize) {
    let dims = shape.dims();
    match dims.len() {
        0 => (1, 1),
        1 => (dims[0], dims[0]),
        2 => (dims[0], dims[1]),
        // Conv kernels [c_out, c_in, k..]: receptive field scales both fans.
        _ => {
            let rf: usize = dims[2..].iter().product();
            (dims[1] * rf, dims[0] * rf)
        }
    }
}

fn uniform(shape: &Shape, scale: f32) -> TensorResult<Tensor> {
    let n = shape.numel();
    let data: Vec<f32> = with_rng(|rng| (0..n).map(|_| rng.gen_range(-scale..=scale)).collect());
    Tensor::from_vec(data, shape.clone())
}

/// Xavier (Glorot) uniform: scale = sqrt(6 / (fan_in + fan_out)).
pub fn xavier_uniform(shape: &Shape) -> TensorResult<Tensor> {
    let (fan_in, fan_out) = fans(shape);
    let scale = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
    uniform(shape, scale)
}

/// He (Kaiming) uniform: scale = sqrt(6 / fan_in). For ReLU stacks.
pub fn he_uniform(shape: &Shape) -> TensorResult<Tensor> {
    let (fan_in, _) = fans(shape);
    let scale = (6.0f32 / fan_in as f32).sqrt();
    uniform(shape, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::set_seed;

    #[test]
    fn same_seed_same_weights() {
        set_seed(9);
        let a = xavier_uniform(&Shape::new(vec![4, 3])).unwrap();
        set_seed(9);
        let b = xavier_uniform(&Shape::new(vec![4, 3])).unwrap();
        assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
    }

    #[test]
    fn values_stay_in_scale() {
        set_seed(1);
        let t = he_uniform(&Shape::new(vec![6])).unwrap();
        let scale = 1.0f32; // sqrt(6/6)
        for v in t.to_vec().unwrap() {
            assert!(v.abs() <= scale);
        }
    }
}
