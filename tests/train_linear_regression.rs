//! End-to-end training: linear regression y = 2*x1 + 3*x2 + bias + noise.
//! Verifies the full pipeline: data -> model -> loss -> backward -> update.

use nncore::{
    set_seed, with_rng, DataLoader, Dense, InMemoryDataset, Layer, Mse, ParamIndex, Sequential,
    Shape, Tensor, Trainer, SGD,
};
use rand::Rng;

const TRUE_W: [f32; 2] = [2.0, 3.0];
const TRUE_B: f32 = 1.0;
const N_SAMPLES: usize = 100;
const EPOCHS: usize = 150;
const LR: f32 = 0.02;

fn make_dataset() -> InMemoryDataset {
    set_seed(42);
    let mut samples = Vec::with_capacity(N_SAMPLES);
    for _ in 0..N_SAMPLES {
        let (x1, x2, noise) = with_rng(|rng| {
            let x1 = rng.gen_range(-1.0f32..=1.0);
            let x2 = rng.gen_range(-1.0f32..=1.0);
            let noise = rng.gen_range(-0.1f32..=0.1);
            (x1, x2, noise)
        });
        let y = TRUE_W[0] * x1 + TRUE_W[1] * x2 + TRUE_B + noise;
        let input = Tensor::from_vec(vec![x1, x2], Shape::new(vec![2])).unwrap();
        let target = Tensor::from_vec(vec![y], Shape::new(vec![1])).unwrap();
        samples.push((input, target));
    }
    InMemoryDataset::new(samples)
}

fn make_trainer() -> Trainer<SGD, Mse> {
    let mut model = Sequential::new();
    model.add_layer(Dense::new("fc", 1).unwrap()).unwrap();
    model.build().unwrap();
    model.init(&Shape::new(vec![2])).unwrap();
    Trainer::new(model, SGD::new(LR).unwrap(), Mse::new())
}

#[test]
fn test_linear_regression_loss_decreases() {
    set_seed(123);
    let mut loader = DataLoader::new(make_dataset(), 8);
    let mut trainer = make_trainer();

    let mut initial_loss = None::<f32>;
    let mut final_loss = None::<f32>;
    for _ in 0..EPOCHS {
        loader.reset();
        let (avg_loss, _) = trainer.run_epoch(&mut loader).unwrap();
        if initial_loss.is_none() {
            initial_loss = Some(avg_loss);
        }
        final_loss = Some(avg_loss);
    }

    let init = initial_loss.unwrap();
    let fin = final_loss.unwrap();
    assert!(fin < init, "loss should decrease: initial {} final {}", init, fin);
    assert!(fin < 0.05, "final loss {} should approach the noise floor", fin);
}

#[test]
fn test_linear_regression_learns_weights() {
    set_seed(456);
    let mut loader = DataLoader::new(make_dataset(), 16);
    let mut trainer = make_trainer();

    for _ in 0..EPOCHS {
        loader.reset();
        trainer.run_epoch(&mut loader).unwrap();
    }

    let fc = trainer.model.layer("fc").unwrap();
    let w = fc
        .parameters()
        .into_iter()
        .find(|(i, _)| *i == ParamIndex::Weights)
        .unwrap()
        .1
        .data()
        .to_vec()
        .unwrap();
    let b = fc
        .parameters()
        .into_iter()
        .find(|(i, _)| *i == ParamIndex::Biases)
        .unwrap()
        .1
        .data()
        .to_vec()
        .unwrap();
    assert_eq!(w.len(), 2);
    assert!((w[0] - TRUE_W[0]).abs() < 0.5, "weight[0] {} ~ {}", w[0], TRUE_W[0]);
    assert!((w[1] - TRUE_W[1]).abs() < 0.5, "weight[1] {} ~ {}", w[1], TRUE_W[1]);
    assert!((b[0] - TRUE_B).abs() < 0.5, "bias {} ~ {}", b[0], TRUE_B);
}
