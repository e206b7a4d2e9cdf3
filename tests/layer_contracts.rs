//! Cross-layer contracts: output_shape agrees with forward for every layer
//! in the zoo, pooling conserves gradient flux, frozen models never move
//! their parameters, and a conv stack composes end to end.

use nncore::{
    set_seed, train_step, AvgPool2d, Conv2d, Dense, Dropout, Flatten, GlobalAvgPool2d, Layer,
    MaxPool2d, Mse, ReLU, Reshape, Sequential, Shape, Sigmoid, Softmax, Tanh, Tensor, SGD,
};

fn ramp(shape: &Shape) -> Tensor {
    let n = shape.numel();
    Tensor::from_vec(
        (0..n).map(|v| v as f32 * 0.13 - 1.0).collect(),
        shape.clone(),
    )
    .unwrap()
}

/// Every layer's declared output shape must equal the shape forward
/// actually produces.
fn assert_shape_law<L: Layer + 'static>(mut layer: L, input_shape: Shape) {
    layer.init(&input_shape).unwrap();
    let declared = layer.output_shape(&input_shape).unwrap();
    let out = layer.forward(&ramp(&input_shape)).unwrap();
    assert!(
        declared.same_as(out.shape()),
        "{}: declared {} forward {}",
        layer.name(),
        declared,
        out.shape()
    );
}

#[test]
fn output_shape_matches_forward_for_every_layer() {
    set_seed(3);
    assert_shape_law(Dense::new("dense", 4).unwrap(), Shape::new(vec![3]));
    assert_shape_law(Dense::new("dense_b", 4).unwrap(), Shape::new(vec![2, 3]));
    assert_shape_law(
        Conv2d::new("conv", 3, (3, 3), (1, 1)).unwrap().with_padding((1, 1)),
        Shape::new(vec![1, 2, 5, 5]),
    );
    assert_shape_law(
        MaxPool2d::new("maxpool", (2, 2), (2, 2)).unwrap(),
        Shape::new(vec![1, 2, 4, 4]),
    );
    assert_shape_law(
        AvgPool2d::new("avgpool", (2, 2), (2, 2)).unwrap(),
        Shape::new(vec![1, 2, 4, 4]),
    );
    assert_shape_law(GlobalAvgPool2d::new("gap"), Shape::new(vec![1, 3, 4, 4]));
    assert_shape_law(Flatten::new("flatten"), Shape::new(vec![1, 2, 3, 4]));
    assert_shape_law(
        Reshape::new("reshape", Shape::new(vec![6, 4])),
        Shape::new(vec![1, 2, 3, 4]),
    );
    assert_shape_law(ReLU::new("relu"), Shape::new(vec![7]));
    assert_shape_law(Sigmoid::new("sigmoid"), Shape::new(vec![7]));
    assert_shape_law(Tanh::new("tanh"), Shape::new(vec![7]));
    assert_shape_law(Softmax::new("softmax"), Shape::new(vec![2, 5]));
    assert_shape_law(Dropout::new("dropout", 0.4).unwrap(), Shape::new(vec![9]));
}

#[test]
fn maxpool_backward_conserves_gradient_flux() {
    let mut pool = MaxPool2d::new("mp", (2, 2), (2, 2)).unwrap();
    let s = Shape::new(vec![2, 3, 6, 6]);
    pool.init(&s).unwrap();
    let x = ramp(&s);
    let y = pool.forward(&x).unwrap();
    let g = ramp(y.shape());
    let gi = pool.backward(&g).unwrap();
    let fwd_flux = g.sum_all().unwrap();
    let back_flux = gi.sum_all().unwrap();
    assert!(
        (fwd_flux - back_flux).abs() < 1e-3,
        "flux {} vs {}",
        fwd_flux,
        back_flux
    );
}

#[test]
fn frozen_model_parameters_never_move() {
    set_seed(4);
    let mut model = Sequential::new();
    model.add_layer(Dense::new("fc1", 4).unwrap()).unwrap();
    model.add_layer(ReLU::new("act")).unwrap();
    model.add_layer(Dense::new("fc2", 2).unwrap()).unwrap();
    model.build().unwrap();
    model.init(&Shape::new(vec![3])).unwrap();
    for layer in model.layers_mut() {
        layer.set_can_learn(false);
    }
    let before: Vec<(String, Vec<f32>)> = model
        .parameters()
        .into_iter()
        .map(|(k, p)| (k, p.data().to_vec().unwrap()))
        .collect();

    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], Shape::new(vec![3])).unwrap();
    let y = Tensor::from_vec(vec![0.5, -0.5], Shape::new(vec![2])).unwrap();
    let mut opt = SGD::new(0.5).unwrap();
    for _ in 0..3 {
        train_step(&mut model, &mut opt, &Mse::new(), &x, &y).unwrap();
    }

    let after: Vec<(String, Vec<f32>)> = model
        .parameters()
        .into_iter()
        .map(|(k, p)| (k, p.data().to_vec().unwrap()))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn conv_stack_composes_and_trains() {
    set_seed(5);
    let mut model = Sequential::new();
    model
        .add_layer(Conv2d::new("conv1", 4, (3, 3), (1, 1)).unwrap())
        .unwrap();
    model.add_layer(ReLU::new("act1")).unwrap();
    model
        .add_layer(MaxPool2d::new("pool", (2, 2), (2, 2)).unwrap())
        .unwrap();
    model.add_layer(Flatten::new("flat")).unwrap();
    model.add_layer(Dense::new("fc", 2).unwrap()).unwrap();
    model.add_layer(Softmax::new("probs")).unwrap();
    model.build().unwrap();
    model.init(&Shape::new(vec![1, 1, 6, 6])).unwrap();
    assert_eq!(model.output_shape().unwrap().dims(), &[2]);

    let x = ramp(&Shape::new(vec![1, 1, 6, 6]));
    let y = Tensor::from_vec(vec![1.0, 0.0], Shape::new(vec![2])).unwrap();
    let mut opt = SGD::new(0.1).unwrap();
    let first = train_step(&mut model, &mut opt, &Mse::new(), &x, &y).unwrap();
    let mut last = first;
    for _ in 0..30 {
        last = train_step(&mut model, &mut opt, &Mse::new(), &x, &y).unwrap();
    }
    assert!(last < first, "loss should decrease: {} -> {}", first, last);
}

#[test]
fn dense_scenario_single_sample() {
    // Scenario: x = {1,2,3}, W rows {1..4; 5..8; 9..12}, b = 1 everywhere.
    let mut model = Sequential::new();
    model.add_layer(Dense::new("fc", 4).unwrap()).unwrap();
    model.build().unwrap();
    model.init(&Shape::new(vec![3])).unwrap();
    let fc = model.layer("fc").unwrap();
    let params = fc.parameters();
    let (_, wp) = params
        .iter()
        .find(|(i, _)| *i == nncore::ParamIndex::Weights)
        .unwrap();
    wp.data()
        .copy_from(
            &Tensor::from_vec(
                (1..=12).map(|v| v as f32).collect(),
                Shape::new(vec![3, 4]),
            )
            .unwrap(),
        )
        .unwrap();
    let (_, bp) = params
        .iter()
        .find(|(i, _)| *i == nncore::ParamIndex::Biases)
        .unwrap();
    bp.data().fill(1.0).unwrap();
    drop(params);

    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], Shape::new(vec![3])).unwrap();
    let y = model.forward(&x).unwrap();
    assert_eq!(y.at(&[0]).unwrap(), 39.0);
}

#[test]
fn conv_full_window_yields_1x1() {
    // Kernel and stride equal to the spatial size: one output per channel.
    let mut conv = Conv2d::new("conv", 3, (4, 4), (4, 4)).unwrap();
    let s = Shape::new(vec![1, 2, 4, 4]);
    conv.init(&s).unwrap();
    let out = conv.output_shape(&s).unwrap();
    assert_eq!(out.dims(), &[1, 3, 1, 1]);
}
