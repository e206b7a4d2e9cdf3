//! End-to-end classification: two-layer perceptron + categorical
//! cross-entropy from logits on synthetic two-class 2D data.

use nncore::{
    set_seed, with_rng, CategoricalCrossEntropy, DataLoader, Dense, InMemoryDataset, ReLU,
    Sequential, Shape, Tensor, Trainer, SGD,
};
use rand::Rng;

const N_SAMPLES: usize = 200;
const EPOCHS: usize = 80;
const LR: f32 = 0.05;
const BATCH_SIZE: usize = 16;

/// 2D points with binary labels: class 0 near (-1,-1), class 1 near (1,1).
fn make_dataset() -> InMemoryDataset {
    set_seed(42);
    let mut samples = Vec::with_capacity(N_SAMPLES);
    for _ in 0..N_SAMPLES {
        let (x1, x2, label) = with_rng(|rng| {
            let c = rng.gen_range(0..2);
            let lo = if c == 0 { -1.5f32 } else { 0.3 };
            let hi = if c == 0 { -0.3f32 } else { 1.5 };
            (rng.gen_range(lo..hi), rng.gen_range(lo..hi), c)
        });
        let input = Tensor::from_vec(vec![x1, x2], Shape::new(vec![2])).unwrap();
        let target = Tensor::from_vec(
            if label == 0 {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            },
            Shape::new(vec![2]),
        )
        .unwrap();
        samples.push((input, target));
    }
    InMemoryDataset::new(samples)
}

#[test]
fn test_mlp_classification_ce() {
    set_seed(123);
    let mut loader = DataLoader::new(make_dataset(), BATCH_SIZE);

    let mut model = Sequential::new();
    model.add_layer(Dense::new("fc1", 8).unwrap()).unwrap();
    model.add_layer(ReLU::new("act")).unwrap();
    model.add_layer(Dense::new("fc2", 2).unwrap()).unwrap();
    model.build().unwrap();
    model.init(&Shape::new(vec![2])).unwrap();

    let mut trainer = Trainer::new(
        model,
        SGD::new(LR).unwrap(),
        CategoricalCrossEntropy::new(true),
    );

    let mut initial_loss = None::<f32>;
    let mut final_loss = None::<f32>;
    for _ in 0..EPOCHS {
        loader.reset();
        let (avg, _) = trainer.run_epoch(&mut loader).unwrap();
        if initial_loss.is_none() {
            initial_loss = Some(avg);
        }
        final_loss = Some(avg);
    }

    let init = initial_loss.unwrap();
    let fin = final_loss.unwrap();
    assert!(fin < init, "CE loss should decrease: {} -> {}", init, fin);

    // The classes are far apart: the trained net should separate them.
    let ds = make_dataset();
    let mut correct = 0usize;
    let mut loader = DataLoader::new(ds, 1);
    while let Some(batch) = loader.next_batch() {
        for (x, y) in batch {
            let out = trainer.model.forward(&x).unwrap();
            let pred = out.argmax_axis(0).unwrap().to_vec_i32().unwrap()[0];
            let truth = y.argmax_axis(0).unwrap().to_vec_i32().unwrap()[0];
            if pred == truth {
                correct += 1;
            }
        }
    }
    assert!(
        correct as f32 >= 0.9 * N_SAMPLES as f32,
        "accuracy {}/{} too low",
        correct,
        N_SAMPLES
    );
}
