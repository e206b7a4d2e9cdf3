//! State-dict round trip: init a model, save to JSON, load into a fresh
//! model, assert identical forward outputs.

use nncore::{
    load_state_dict, save_state_dict, set_seed, Dense, ReLU, Sequential, Shape, Tensor,
};

fn build_model(seed: u64) -> Sequential {
    set_seed(seed);
    let mut m = Sequential::new();
    m.add_layer(Dense::new("fc1", 4).unwrap()).unwrap();
    m.add_layer(ReLU::new("act")).unwrap();
    m.add_layer(Dense::new("fc2", 2).unwrap()).unwrap();
    m.build().unwrap();
    m.init(&Shape::new(vec![3])).unwrap();
    m
}

#[test]
fn test_state_dict_save_load_round_trip() {
    let mut model = build_model(99);
    let x = Tensor::from_vec(vec![1.0, -0.5, 2.0], Shape::new(vec![3])).unwrap();
    let before = model.forward(&x).unwrap().to_vec().unwrap();

    let states = model.state_dict().unwrap();
    let path = std::env::temp_dir().join("nncore_state_dict_test.json");
    save_state_dict(&path, &states).unwrap();

    // Different seed: the fresh model starts from different weights.
    let mut model2 = build_model(1);
    let diverged = model2.forward(&x).unwrap().to_vec().unwrap();
    assert_ne!(before, diverged);

    let loaded = load_state_dict(&path).unwrap();
    model2.apply_state_dict(&loaded).unwrap();
    let after = model2.forward(&x).unwrap().to_vec().unwrap();

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-6, "forward mismatch: {} vs {}", a, b);
    }

    let _: Result<(), _> = std::fs::remove_file(&path);
}
