//! Numerical gradient checks: compare each layer's accumulated parameter
//! gradients and input gradients against central finite differences
//! through a full model + loss pipeline.

use nncore::{
    set_seed, Conv1d, Conv2d, Dense, Loss, Mse, ReLU, Sequential, Shape, Sigmoid, Tanh, Tensor,
};

const EPS: f32 = 1e-2;
const TOL: f32 = 1e-2;

fn loss_value(model: &mut Sequential, loss: &dyn Loss, x: &Tensor, y: &Tensor) -> f32 {
    let out = model.forward(x).unwrap();
    loss.compute(&out, y).unwrap()
}

/// Overwrite one parameter's data. Goes through the shared buffer, so the
/// model needs only a shared borrow.
fn set_param(model: &Sequential, key: &str, data: Vec<f32>, shape: &Shape) {
    let params = model.parameters();
    let (_, p) = params.iter().find(|(k, _)| k == key).unwrap();
    p.data()
        .copy_from(&Tensor::from_vec(data, shape.clone()).unwrap())
        .unwrap();
}

/// Analytic backward pass, then perturb every parameter element and
/// compare the loss slope against the accumulated gradient.
fn check_model_gradients(model: &mut Sequential, x: &Tensor, y: &Tensor) {
    let loss = Mse::new();
    model.zero_grad().unwrap();
    let out = model.forward(x).unwrap();
    let g = loss.gradient(&out, y).unwrap();
    model.backward(&g).unwrap();

    // Snapshot analytic gradients keyed like the parameter enumeration.
    let analytic: Vec<(String, Vec<f32>)> = model
        .parameters()
        .into_iter()
        .map(|(k, p)| (k, p.grad().expect("backward populated grads").to_vec().unwrap()))
        .collect();

    for (key, grads) in analytic {
        let (data, shape) = {
            let params = model.parameters();
            let (_, p) = params.iter().find(|(k, _)| *k == key).unwrap();
            (p.data().to_vec().unwrap(), p.data().shape().clone())
        };
        for j in 0..data.len() {
            let mut up = data.clone();
            up[j] += EPS;
            set_param(model, &key, up, &shape);
            let plus = loss_value(model, &loss, x, y);
            let mut down = data.clone();
            down[j] -= EPS;
            set_param(model, &key, down, &shape);
            let minus = loss_value(model, &loss, x, y);
            set_param(model, &key, data.clone(), &shape);
            let fd = (plus - minus) / (2.0 * EPS);
            assert!(
                (fd - grads[j]).abs() <= TOL * (1.0 + fd.abs()),
                "{}[{}]: analytic {} vs numeric {}",
                key,
                j,
                grads[j],
                fd
            );
        }
    }
}

#[test]
fn dense_single_sample_gradients() {
    set_seed(11);
    let mut m = Sequential::new();
    m.add_layer(Dense::new("fc", 3).unwrap()).unwrap();
    m.build().unwrap();
    m.init(&Shape::new(vec![4])).unwrap();
    let x = Tensor::from_vec(vec![0.5, -1.0, 2.0, 0.1], Shape::new(vec![4])).unwrap();
    let y = Tensor::from_vec(vec![1.0, 0.0, -1.0], Shape::new(vec![3])).unwrap();
    check_model_gradients(&mut m, &x, &y);
}

#[test]
fn dense_batch_gradients() {
    set_seed(12);
    let mut m = Sequential::new();
    m.add_layer(Dense::new("fc", 2).unwrap()).unwrap();
    m.build().unwrap();
    m.init(&Shape::new(vec![3, 2])).unwrap();
    let x = Tensor::from_vec(
        vec![0.5, -1.0, 2.0, 0.1, -0.3, 0.7],
        Shape::new(vec![3, 2]),
    )
    .unwrap();
    let y = Tensor::from_vec(vec![1.0, 0.0, 0.5, -0.5, 0.2, 0.9], Shape::new(vec![3, 2]))
        .unwrap();
    check_model_gradients(&mut m, &x, &y);
}

#[test]
fn mlp_with_activations_gradients() {
    set_seed(13);
    let mut m = Sequential::new();
    m.add_layer(Dense::new("fc1", 5).unwrap()).unwrap();
    m.add_layer(Tanh::new("tanh")).unwrap();
    m.add_layer(Dense::new("fc2", 2).unwrap()).unwrap();
    m.add_layer(Sigmoid::new("sig")).unwrap();
    m.build().unwrap();
    m.init(&Shape::new(vec![3])).unwrap();
    let x = Tensor::from_vec(vec![0.4, -0.6, 1.1], Shape::new(vec![3])).unwrap();
    let y = Tensor::from_vec(vec![0.3, 0.8], Shape::new(vec![2])).unwrap();
    check_model_gradients(&mut m, &x, &y);
}

#[test]
fn conv2d_gradients() {
    set_seed(14);
    let mut m = Sequential::new();
    m.add_layer(Conv2d::new("conv", 2, (2, 2), (1, 1)).unwrap())
        .unwrap();
    m.build().unwrap();
    m.init(&Shape::new(vec![1, 1, 3, 3])).unwrap();
    let x = Tensor::from_vec(
        vec![0.1, -0.2, 0.3, 0.4, -0.5, 0.6, 0.7, -0.8, 0.9],
        Shape::new(vec![1, 1, 3, 3]),
    )
    .unwrap();
    let y = Tensor::from_vec(vec![0.5; 8], Shape::new(vec![1, 2, 2, 2])).unwrap();
    check_model_gradients(&mut m, &x, &y);
}

#[test]
fn conv1d_gradients() {
    set_seed(15);
    let mut m = Sequential::new();
    m.add_layer(Conv1d::new("conv", 2, 3, 1).unwrap()).unwrap();
    m.build().unwrap();
    m.init(&Shape::new(vec![1, 1, 5])).unwrap();
    let x = Tensor::from_vec(
        vec![0.2, -0.4, 0.6, -0.8, 1.0],
        Shape::new(vec![1, 1, 5]),
    )
    .unwrap();
    let y = Tensor::from_vec(vec![0.1; 6], Shape::new(vec![1, 2, 3])).unwrap();
    check_model_gradients(&mut m, &x, &y);
}

#[test]
fn relu_passes_gradient_check_away_from_kink() {
    // ReLU is piecewise linear; pin the weights so every preactivation
    // stays well clear of zero under the finite-difference perturbation.
    set_seed(16);
    let mut m = Sequential::new();
    m.add_layer(Dense::new("fc", 4).unwrap()).unwrap();
    m.add_layer(ReLU::new("relu")).unwrap();
    m.build().unwrap();
    m.init(&Shape::new(vec![3])).unwrap();
    set_param(
        &m,
        "0:weights",
        vec![
            0.5, -0.2, 0.3, 0.1, 0.2, 0.4, -0.3, 0.5, -0.1, 0.3, 0.2, -0.4,
        ],
        &Shape::new(vec![3, 4]),
    );
    set_param(&m, "0:biases", vec![0.3; 4], &Shape::new(vec![4]));
    let x = Tensor::from_vec(vec![0.9, -0.7, 1.3], Shape::new(vec![3])).unwrap();
    let y = Tensor::from_vec(vec![0.2, 0.4, 0.6, 0.8], Shape::new(vec![4])).unwrap();
    check_model_gradients(&mut m, &x, &y);
}
