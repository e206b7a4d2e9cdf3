//! XOR end-to-end: Dense(2->4) + ReLU + Dense(4->1) + Sigmoid trained with
//! Adam. XOR is not linearly separable, so passing requires the full
//! backward chain through both dense layers to work.

use nncore::{set_seed, Adam, Dense, Mse, ReLU, Sequential, Shape, Sigmoid, Tensor, Trainer};

const MAX_STEPS: usize = 5000;
const SEEDS: [u64; 3] = [7, 21, 1234];

fn xor_samples() -> Vec<(Tensor, Tensor)> {
    [
        ([0.0f32, 0.0], 0.0f32),
        ([0.0, 1.0], 1.0),
        ([1.0, 0.0], 1.0),
        ([1.0, 1.0], 0.0),
    ]
    .iter()
    .map(|(x, y)| {
        (
            Tensor::from_vec(x.to_vec(), Shape::new(vec![2])).unwrap(),
            Tensor::from_vec(vec![*y], Shape::new(vec![1])).unwrap(),
        )
    })
    .collect()
}

fn build_trainer() -> Trainer<Adam, Mse> {
    let mut model = Sequential::new();
    model.add_layer(Dense::new("fc1", 4).unwrap()).unwrap();
    model.add_layer(ReLU::new("act1")).unwrap();
    model.add_layer(Dense::new("fc2", 1).unwrap()).unwrap();
    model.add_layer(Sigmoid::new("out")).unwrap();
    model.build().unwrap();
    model.init(&Shape::new(vec![2])).unwrap();
    let adam = Adam::new(0.05)
        .unwrap()
        .with_betas(0.9, 0.999)
        .unwrap()
        .with_eps(1e-8)
        .unwrap();
    Trainer::new(model, adam, Mse::new())
}

fn accuracy(trainer: &mut Trainer<Adam, Mse>, samples: &[(Tensor, Tensor)]) -> usize {
    samples
        .iter()
        .filter(|(x, y)| {
            let out = trainer.model.forward(x).unwrap();
            (out.at(&[0]).unwrap() - y.at(&[0]).unwrap()).abs() <= 0.2
        })
        .count()
}

fn train_one_trial(seed: u64) -> bool {
    set_seed(seed);
    let samples = xor_samples();
    let mut trainer = build_trainer();
    for step in 0..MAX_STEPS {
        trainer.train_batch(&samples).unwrap();
        if step % 100 == 99 && accuracy(&mut trainer, &samples) == 4 {
            return true;
        }
    }
    accuracy(&mut trainer, &samples) == 4
}

#[test]
fn test_xor_converges_within_budget() {
    // Best of three trials with distinct seeds.
    let solved = SEEDS.iter().any(|&s| train_one_trial(s));
    assert!(solved, "no trial reached full XOR accuracy in {} steps", MAX_STEPS);
}

#[test]
fn test_xor_loss_decreases_early() {
    set_seed(77);
    let samples = xor_samples();
    let mut trainer = build_trainer();
    let first = trainer.train_batch(&samples).unwrap();
    let mut last = first;
    for _ in 0..200 {
        last = trainer.train_batch(&samples).unwrap();
    }
    assert!(last < first, "loss should decrease: {} -> {}", first, last);
}
